//! Request executor: one POST per attempt, exponential backoff between
//! attempts, and failure classification.
//!
//! Only transport failures are retried. A non-2xx status means the server
//! understood the request and refused it, so it surfaces on first sight.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;

use super::errors::ClientError;
use super::transport::{collect_body, ByteStream, HttpRequest, HttpTransport};

// ─── Retry Policy ────────────────────────────────────────────────────────────

/// How many times to retry transport failures and how long to wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    /// Delay before the second attempt; doubles for each one after.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay after the zero-indexed `attempt` fails: `base_delay * 2^attempt`.
    ///
    /// Saturates at `Duration::MAX` instead of overflowing.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }

    /// Upper bound on the number of requests sent.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// What a successful execution produced.
pub enum ExecuteOutcome {
    /// Fully read and decoded response body.
    Json(serde_json::Value),
    /// Unread response body, for the stream decoder.
    Stream(ByteStream),
}

impl std::fmt::Debug for ExecuteOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecuteOutcome::Json(value) => f.debug_tuple("Json").field(value).finish(),
            ExecuteOutcome::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

// ─── Executor ────────────────────────────────────────────────────────────────

/// Sends authenticated JSON POSTs with retries.
#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    api_key: String,
}

impl RequestExecutor {
    pub fn new(transport: Arc<dyn HttpTransport>, base_url: &str, api_key: &str) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `payload` to `{base_url}{endpoint}`.
    ///
    /// Up to `policy.max_retries + 1` attempts. Transport failures sleep
    /// `policy.delay_for_attempt(attempt)` and try again; the last one is
    /// returned once attempts run out. API errors return immediately.
    ///
    /// With `wants_stream` the body is handed back unread; otherwise it is
    /// read and decoded as JSON, and a malformed body counts as a transport
    /// failure.
    pub async fn execute<P>(
        &self,
        endpoint: &str,
        payload: &P,
        policy: RetryPolicy,
        wants_stream: bool,
    ) -> Result<ExecuteOutcome, ClientError>
    where
        P: Serialize + ?Sized,
    {
        let url = format!("{}{endpoint}", self.base_url);
        let body = serde_json::to_vec(payload).map_err(|e| ClientError::ProtocolViolation {
            reason: format!("failed to serialize request body: {e}"),
        })?;
        let body = Bytes::from(body);

        let mut last_error: Option<ClientError> = None;

        for attempt in 0..=policy.max_retries {
            tracing::debug!(
                url = %url,
                attempt,
                max_attempts = policy.max_attempts(),
                stream = wants_stream,
                "sending request"
            );

            match self.attempt(&url, body.clone(), wants_stream).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_retryable() => {
                    if attempt < policy.max_retries {
                        let delay = policy.delay_for_attempt(attempt);
                        tracing::warn!(
                            url = %url,
                            attempt,
                            delay_ms = millis(delay),
                            error = %e,
                            "transport failure, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    } else {
                        tracing::warn!(
                            url = %url,
                            attempts = attempt.saturating_add(1),
                            error = %e,
                            "retries exhausted"
                        );
                    }
                    last_error = Some(e);
                }
                Err(e) => return Err(e), // API error or other terminal failure
            }
        }

        Err(last_error.unwrap_or(ClientError::Transport {
            endpoint: url,
            reason: "request failed after retries".into(),
        }))
    }

    /// A single round-trip.
    async fn attempt(
        &self,
        url: &str,
        body: Bytes,
        wants_stream: bool,
    ) -> Result<ExecuteOutcome, ClientError> {
        let request = HttpRequest {
            url: url.to_string(),
            bearer_token: self.api_key.clone(),
            body,
            stream: wants_stream,
        };

        let response = self
            .transport
            .post(request)
            .await
            .map_err(|e| transport_error(url, e))?;

        if !response.is_success() {
            let status = response.status;
            // The status is authoritative even if the body is unreadable.
            let raw = collect_body(response.body).await.unwrap_or_default();
            return Err(api_error(status, &raw));
        }

        if wants_stream {
            return Ok(ExecuteOutcome::Stream(response.body));
        }

        let raw = collect_body(response.body)
            .await
            .map_err(|e| transport_error(url, e))?;
        let value = serde_json::from_slice(&raw).map_err(|e| ClientError::Transport {
            endpoint: url.to_string(),
            reason: format!("malformed response body: {e}"),
        })?;

        Ok(ExecuteOutcome::Json(value))
    }
}

/// Whole milliseconds for log fields, clamped to `u64::MAX`.
fn millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

fn transport_error(url: &str, err: impl std::fmt::Display) -> ClientError {
    ClientError::Transport {
        endpoint: url.to_string(),
        reason: err.to_string(),
    }
}

/// Build an `Api` error from a status and raw error body.
///
/// Accepts both `{"message", "code"}` and the OpenAI-style
/// `{"error": {"message", "code"}}` shapes. A non-JSON body becomes a string
/// `details` value.
fn api_error(status: u16, raw: &[u8]) -> ClientError {
    let details = match serde_json::from_slice::<serde_json::Value>(raw) {
        Ok(value) => Some(value),
        Err(_) => {
            let text = String::from_utf8_lossy(raw).trim().to_string();
            (!text.is_empty()).then_some(serde_json::Value::String(text))
        }
    };

    let message = error_field(details.as_ref(), "message")
        .and_then(|m| m.as_str())
        .map(str::to_owned)
        .unwrap_or_else(|| "API request failed".to_string());

    let code = error_field(details.as_ref(), "code").and_then(|c| match c {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    });

    ClientError::Api {
        status,
        code,
        message,
        details,
    }
}

/// Look up `name` at the top level, then under `error`.
fn error_field<'a>(details: Option<&'a serde_json::Value>, name: &str) -> Option<&'a serde_json::Value> {
    let value = details?;
    value
        .get(name)
        .or_else(|| value.get("error").and_then(|e| e.get(name)))
}

// ─── Tests ───────────────────────────────────────────────────────────────────
