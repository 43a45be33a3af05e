//! Image reference resolution.
//!
//! Vision requests must carry images inline. Before a request is built,
//! every `image_url` part that is not already a `data:` URI is replaced with
//! `data:<mime>;base64,<payload>`.

use async_trait::async_trait;
use base64::Engine as _;

use super::errors::ClientError;
use super::types::{ChatMessage, ContentPart, MessageContent};

/// MIME type assumed for local files and for remote responses without a
/// `Content-Type` header.
pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// Turns an image reference into a self-contained data URI.
#[async_trait]
pub trait ImageResolver: Send + Sync {
    /// `reference` is a remote address (`http…`) or a local path.
    /// Failures are `ClientError::InvalidImageFormat`.
    async fn resolve(&self, reference: &str) -> Result<String, ClientError>;
}

/// Build a `data:` URI from raw bytes.
pub fn to_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{mime};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// Default resolver: fetches remote images with `reqwest`, reads local ones
/// with `tokio::fs`.
#[derive(Debug, Clone, Default)]
pub struct DataUriImageResolver {
    http: reqwest::Client,
}

impl DataUriImageResolver {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn fetch_remote(&self, url: &str) -> Result<String, ClientError> {
        let invalid = |reason: String| ClientError::InvalidImageFormat {
            reference: url.to_string(),
            reason,
        };

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| invalid(format!("failed to fetch image: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(invalid(format!("failed to fetch image: HTTP {}", status.as_u16())));
        }

        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_IMAGE_MIME)
            .to_string();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| invalid(format!("failed to read image body: {e}")))?;

        Ok(to_data_uri(&mime, &bytes))
    }

    async fn read_local(&self, path: &str) -> Result<String, ClientError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ClientError::InvalidImageFormat {
                reference: path.to_string(),
                reason: format!("failed to read image file: {e}"),
            })?;
        Ok(to_data_uri(DEFAULT_IMAGE_MIME, &bytes))
    }
}

#[async_trait]
impl ImageResolver for DataUriImageResolver {
    async fn resolve(&self, reference: &str) -> Result<String, ClientError> {
        if reference.starts_with("data:") {
            return Ok(reference.to_string());
        }
        if reference.starts_with("http") {
            self.fetch_remote(reference).await
        } else {
            self.read_local(reference).await
        }
    }
}

/// Rewrite every non-`data:` image URL in `messages` in place.
///
/// Returns the number of images embedded.
pub async fn embed_images(
    messages: &mut [ChatMessage],
    resolver: &dyn ImageResolver,
) -> Result<usize, ClientError> {
    let mut embedded = 0;
    for message in messages.iter_mut() {
        let MessageContent::Parts(parts) = &mut message.content else {
            continue;
        };
        for part in parts.iter_mut() {
            if let ContentPart::ImageUrl { image_url } = part {
                if image_url.url.starts_with("data:") {
                    continue;
                }
                image_url.url = resolver.resolve(&image_url.url).await?;
                embedded += 1;
            }
        }
    }

    if embedded > 0 {
        tracing::debug!(count = embedded, "embedded image references");
    }
    Ok(embedded)
}
