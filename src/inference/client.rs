//! SambaNova chat-completions client.
//!
//! Validates messages against the target model, resolves image references,
//! builds the request body and hands it to the [`RequestExecutor`]. Results
//! come back whole ([`SambanovaClient::chat`]) or as a lazy stream
//! ([`SambanovaClient::stream_chat`], [`SambanovaClient::stream_completion`]).

use std::sync::Arc;

use futures::Stream;

use super::config::{ChatOptions, ClientConfig, DEFAULT_TEMPERATURE, DEFAULT_TOP_P};
use super::errors::ClientError;
use super::executor::{ExecuteOutcome, RequestExecutor, RetryPolicy};
use super::images::{embed_images, DataUriImageResolver, ImageResolver};
use super::streaming::{parse_sse_stream, text_deltas};
use super::transport::{HttpTransport, ReqwestTransport};
use super::types::{
    ChatCompletion, ChatCompletionChunk, ChatCompletionRequest, ChatMessage, StreamOptions,
};
use super::validation::validate_messages;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Path appended to the base URL for chat completions.
pub const CHAT_COMPLETIONS_ENDPOINT: &str = "/chat/completions";

// ─── SambanovaClient ─────────────────────────────────────────────────────────

/// Client for the chat-completions API.
///
/// Cheap to clone; clones share configuration, transport and image
/// resolver. Nothing is mutated after construction, so concurrent calls
/// never interfere.
#[derive(Clone)]
pub struct SambanovaClient {
    config: Arc<ClientConfig>,
    executor: RequestExecutor,
    images: Arc<dyn ImageResolver>,
}

impl SambanovaClient {
    /// Create a client with the default `reqwest` transport.
    ///
    /// Does NOT check connectivity; that happens on the first request.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let transport =
            ReqwestTransport::new(config.connect_timeout).map_err(|e| ClientError::Transport {
                endpoint: config.base_url.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create a client with defaults and the given credential.
    pub fn from_api_key(api_key: impl Into<String>) -> Result<Self, ClientError> {
        Self::new(ClientConfig::new(api_key))
    }

    /// Create a client over a caller-supplied transport.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let executor = RequestExecutor::new(transport, &config.base_url, &config.api_key);
        Self {
            config: Arc::new(config),
            executor,
            images: Arc::new(DataUriImageResolver::default()),
        }
    }

    /// Replace the image resolver.
    pub fn with_image_resolver(mut self, resolver: Arc<dyn ImageResolver>) -> Self {
        self.images = resolver;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Base URL with any trailing `/` removed.
    pub fn base_url(&self) -> &str {
        self.executor.base_url()
    }

    pub fn default_model(&self) -> &str {
        &self.config.default_model
    }

    // ─── Chat Completion (non-streaming) ─────────────────────────────────

    /// Send a chat completion request and return the whole response.
    ///
    /// The payload always carries `stream: false`. `options.stream` set to
    /// `true` is rejected as a `ProtocolViolation` before any I/O; use
    /// [`stream_chat`](Self::stream_chat) instead.
    pub async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        options: ChatOptions,
    ) -> Result<ChatCompletion, ClientError> {
        if options.stream == Some(true) {
            return Err(ClientError::ProtocolViolation {
                reason: "chat() cannot stream; use stream_chat() or stream_completion()".into(),
            });
        }
        let body = self.prepare(messages, &options, false).await?;

        match self
            .executor
            .execute(CHAT_COMPLETIONS_ENDPOINT, &body, self.retry_policy(&options), false)
            .await?
        {
            ExecuteOutcome::Json(value) => {
                serde_json::from_value(value).map_err(|e| ClientError::InvalidResponse {
                    reason: format!("unexpected completion shape: {e}"),
                })
            }
            ExecuteOutcome::Stream(_) => Err(ClientError::ProtocolViolation {
                reason: "received a stream from a non-streaming chat call".into(),
            }),
        }
    }

    // ─── Chat Completion (streaming) ─────────────────────────────────────

    /// Send a streaming request and yield every decoded chunk.
    ///
    /// Errors before the first byte (validation, API, exhausted retries)
    /// come back from this call. The stream itself yields at most one
    /// error, a mid-stream read failure, and then ends.
    pub async fn stream_completion(
        &self,
        messages: Vec<ChatMessage>,
        options: ChatOptions,
    ) -> Result<impl Stream<Item = Result<ChatCompletionChunk, ClientError>> + Send, ClientError>
    {
        let body = self.prepare(messages, &options, true).await?;

        match self
            .executor
            .execute(CHAT_COMPLETIONS_ENDPOINT, &body, self.retry_policy(&options), true)
            .await?
        {
            ExecuteOutcome::Stream(bytes) => Ok(parse_sse_stream::<ChatCompletionChunk>(bytes)),
            ExecuteOutcome::Json(_) => Err(ClientError::ProtocolViolation {
                reason: "expected a readable stream, got a JSON body".into(),
            }),
        }
    }

    /// Send a streaming request and yield only the text fragments.
    pub async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        options: ChatOptions,
    ) -> Result<impl Stream<Item = Result<String, ClientError>> + Send, ClientError> {
        let chunks = self.stream_completion(messages, options).await?;
        Ok(text_deltas(chunks))
    }

    // ─── Request preparation ─────────────────────────────────────────────

    /// Validate, embed images, and build the request body.
    ///
    /// Validation only looks at the content shape, so it runs first and a
    /// rejected request never fetches an image.
    async fn prepare(
        &self,
        mut messages: Vec<ChatMessage>,
        options: &ChatOptions,
        stream: bool,
    ) -> Result<ChatCompletionRequest, ClientError> {
        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.config.default_model.clone());

        validate_messages(&messages, &model)?;
        embed_images(&mut messages, self.images.as_ref()).await?;

        let body = ChatCompletionRequest {
            model,
            messages,
            temperature: options.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            top_p: options.top_p.unwrap_or(DEFAULT_TOP_P),
            max_tokens: options.max_tokens,
            stream,
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
        };

        // Log the request metadata, not the body (images can be huge).
        tracing::info!(
            base_url = %self.base_url(),
            model = %body.model,
            message_count = body.messages.len(),
            max_tokens = body.max_tokens,
            stream = body.stream,
            "chat completion request"
        );

        Ok(body)
    }

    fn retry_policy(&self, options: &ChatOptions) -> RetryPolicy {
        RetryPolicy::new(
            options.retry_count.unwrap_or(self.config.default_retry_count),
            options.retry_delay.unwrap_or(self.config.default_retry_delay),
        )
    }
}

impl std::fmt::Debug for SambanovaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SambanovaClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
