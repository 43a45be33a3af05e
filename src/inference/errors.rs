//! Client error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Each variant
//! carries enough context for the caller to tell validation failures, API
//! failures and transport failures apart without string matching.

use thiserror::Error;

/// Machine-readable code for message/capability mismatches.
pub const INVALID_MESSAGE_FORMAT: &str = "INVALID_MESSAGE_FORMAT";

/// Machine-readable code for image resolution failures.
pub const INVALID_IMAGE_FORMAT: &str = "INVALID_IMAGE_FORMAT";

/// Errors that can occur while talking to the chat-completions API.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Message content does not match the capability of the target model.
    /// Raised before any network call.
    #[error("invalid message format: {reason}")]
    InvalidMessageFormat {
        reason: String,
    },

    /// An image reference could not be turned into an embedded data URI.
    #[error("invalid image '{reference}': {reason}")]
    InvalidImageFormat {
        reference: String,
        reason: String,
    },

    /// The server answered with a non-2xx status.
    #[error("API error (HTTP {status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
        details: Option<serde_json::Value>,
    },

    /// Network, connection or body-read failure before a usable response
    /// was obtained. The only retried kind.
    #[error("transport error for {endpoint}: {reason}")]
    Transport {
        endpoint: String,
        reason: String,
    },

    /// Internal contract breach, e.g. a stream came back where a JSON body
    /// was expected.
    #[error("protocol violation: {reason}")]
    ProtocolViolation {
        reason: String,
    },

    /// A single streaming frame carried invalid JSON. Non-fatal: the
    /// decoder logs it and skips the frame.
    #[error("failed to decode stream frame: {reason} (data: {data})")]
    FrameDecode {
        reason: String,
        data: String,
    },

    /// A successful response body did not have the expected shape.
    #[error("invalid response: {reason}")]
    InvalidResponse {
        reason: String,
    },

    /// Configuration loading or validation error.
    #[error("config error: {reason}")]
    ConfigError {
        reason: String,
    },
}

impl ClientError {
    /// Machine-readable error code, if one applies.
    ///
    /// Validation and image errors have fixed codes; API errors carry
    /// whatever code the server sent.
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::InvalidMessageFormat { .. } => Some(INVALID_MESSAGE_FORMAT),
            ClientError::InvalidImageFormat { .. } => Some(INVALID_IMAGE_FORMAT),
            ClientError::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// HTTP-style status for the error.
    ///
    /// Client-side validation failures report 400 so they line up with
    /// what the server would have answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::InvalidMessageFormat { .. } | ClientError::InvalidImageFormat { .. } => {
                Some(400)
            }
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Raw error body returned by the server, if this is an `Api` error.
    pub fn details(&self) -> Option<&serde_json::Value> {
        match self {
            ClientError::Api { details, .. } => details.as_ref(),
            _ => None,
        }
    }

    /// Whether the request executor may retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Transport { .. })
    }
}
