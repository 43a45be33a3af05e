//! Message-shape checks against model capability.
//!
//! Vision models take array-shaped content (text + image parts); every
//! other model takes plain text. Capability is decided by model name alone.

use super::errors::ClientError;
use super::types::{ChatMessage, MessageContent};

/// Whether `model` accepts image input.
///
/// Naming convention only: the id contains `vision`, case-insensitively.
pub fn is_vision_model(model: &str) -> bool {
    model.to_lowercase().contains("vision")
}

/// Check one message's content shape for a model of the given capability.
pub fn validate_message(message: &ChatMessage, is_vision: bool) -> Result<(), ClientError> {
    match (&message.content, is_vision) {
        (MessageContent::Parts(_), false) => Err(ClientError::InvalidMessageFormat {
            reason: "array content is only supported for vision models".into(),
        }),
        (MessageContent::Text(_), true) => Err(ClientError::InvalidMessageFormat {
            reason: "vision models require array content format".into(),
        }),
        _ => Ok(()),
    }
}

/// Validate every message for `model`, stopping at the first failure.
pub fn validate_messages(messages: &[ChatMessage], model: &str) -> Result<(), ClientError> {
    let is_vision = is_vision_model(model);
    messages
        .iter()
        .try_for_each(|message| validate_message(message, is_vision))
}
