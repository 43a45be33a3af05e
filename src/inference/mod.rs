//! Inference client for the SambaNova Cloud chat-completions API.
//!
//! This module handles all communication with the hosted endpoint:
//! - Message validation against the target model (text vs. vision)
//! - Inline embedding of image references as `data:` URIs
//! - Retry with exponential backoff on transport failures
//! - Streaming and non-streaming chat completions
//! - SSE stream parsing
//! - Client configuration loading from YAML
//!
//! The wire format is the OpenAI Chat Completions shape, so the request and
//! response types double as a general-purpose vocabulary.

pub mod client;
pub mod config;
pub mod errors;
pub mod executor;
pub mod images;
pub mod streaming;
pub mod transport;
pub mod types;
pub mod validation;

// Re-exports for convenience
pub use client::SambanovaClient;
pub use config::{load_client_config, ChatOptions, ClientConfig};
pub use errors::ClientError;
pub use executor::{ExecuteOutcome, RequestExecutor, RetryPolicy};
pub use images::{DataUriImageResolver, ImageResolver};
pub use streaming::{parse_sse_stream, text_deltas};
pub use transport::{ByteStream, HttpError, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use types::{
    models, ChatCompletion, ChatCompletionChunk, ChatMessage, ContentPart, ImageUrl,
    MessageContent, Role, Usage,
};
pub use validation::{is_vision_model, validate_message, validate_messages};
