//! Shared types for the chat-completions client.
//!
//! These mirror the OpenAI-compatible Chat Completions API that SambaNova
//! Cloud speaks, used for both request building and response parsing.

use serde::{Deserialize, Serialize};

// ─── Models ──────────────────────────────────────────────────────────────────

/// Model identifiers offered by SambaNova Cloud at the time of writing.
///
/// Model ids stay plain strings everywhere else; these are conveniences.
pub mod models {
    pub const LLAMA_3_2_11B_VISION_INSTRUCT: &str = "Llama-3.2-11B-Vision-Instruct";
    pub const LLAMA_3_2_90B_VISION_INSTRUCT: &str = "Llama-3.2-90B-Vision-Instruct";
    pub const META_LLAMA_3_1_8B_INSTRUCT: &str = "Meta-Llama-3.1-8B-Instruct";
    pub const META_LLAMA_3_1_70B_INSTRUCT: &str = "Meta-Llama-3.1-70B-Instruct";
    pub const META_LLAMA_3_1_405B_INSTRUCT: &str = "Meta-Llama-3.1-405B-Instruct";
    pub const META_LLAMA_3_2_1B_INSTRUCT: &str = "Meta-Llama-3.2-1B-Instruct";
    pub const META_LLAMA_3_2_3B_INSTRUCT: &str = "Meta-Llama-3.2-3B-Instruct";

    /// Every known model id.
    pub const ALL: &[&str] = &[
        LLAMA_3_2_11B_VISION_INSTRUCT,
        META_LLAMA_3_1_8B_INSTRUCT,
        META_LLAMA_3_1_70B_INSTRUCT,
        META_LLAMA_3_1_405B_INSTRUCT,
        META_LLAMA_3_2_1B_INSTRUCT,
        META_LLAMA_3_2_3B_INSTRUCT,
        LLAMA_3_2_90B_VISION_INSTRUCT,
    ];
}

// ─── Request Types ───────────────────────────────────────────────────────────

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    /// Plain-text message.
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(text.into()),
        }
    }

    /// Multi-part message (required by vision models).
    pub fn parts(role: Role, parts: Vec<ContentPart>) -> Self {
        Self {
            role,
            content: MessageContent::Parts(parts),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::text(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(Role::Assistant, text)
    }
}

/// Message content: a JSON string or a JSON array of parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    pub fn is_parts(&self) -> bool {
        matches!(self, MessageContent::Parts(_))
    }
}

/// One element of array-shaped content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    /// Image part. `url` may be remote, a local path, or a `data:` URI;
    /// the client embeds the first two before sending.
    pub fn image_url(url: impl Into<String>) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl { url: url.into() },
        }
    }
}

/// Image reference inside a content part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Extra streaming knobs sent alongside `stream: true`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StreamOptions {
    /// Ask the server to attach token usage to the final chunk.
    pub include_usage: bool,
}

/// Request body for `POST /chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<StreamOptions>,
}

// ─── Response Types ──────────────────────────────────────────────────────────

/// Token accounting reported by the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// A complete (non-streaming) chat completion.
///
/// Every field is lenient so partial bodies still decode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatCompletion {
    /// Text of the first choice, if any.
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
    }
}

/// A single choice in a complete response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub message: AssistantMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Message returned by the model.
///
/// `role` is kept as the raw string; servers omit it or send values outside
/// [`Role`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Raw SSE chunk from the streaming API.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub created: Option<u64>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    /// Only present on the last chunk when `include_usage` was requested.
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl ChatCompletionChunk {
    /// Incremental text of the first choice (`choices[0].delta.content`).
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.delta.content.as_deref())
    }

    /// Why the model stopped, if this is a terminal chunk.
    pub fn finish_reason(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.finish_reason.as_deref())
    }
}

/// A single choice within a streaming chunk.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// The delta (incremental update) within a chunk choice.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChunkDelta {
    /// Raw role string; an unrecognised value must not lose the frame.
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

// ─── Tests ───────────────────────────────────────────────────────────────────
