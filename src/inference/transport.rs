//! HTTP transport seam.
//!
//! The executor talks to the network through [`HttpTransport`] so the retry
//! and decode logic can run against scripted responses. The default
//! implementation wraps a `reqwest::Client` and always hands back the body
//! as an unread byte stream; the executor decides whether to collect it.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use thiserror::Error;

/// Live response body. Dropping it releases the underlying connection.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, HttpError>> + Send>>;

/// One POST to send.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    /// Bearer credential, sent as `Authorization: Bearer <token>`.
    pub bearer_token: String,
    /// Serialized JSON body.
    pub body: Bytes,
    /// Adds `Accept: text/event-stream`.
    pub stream: bool,
}

/// Status plus an unconsumed body.
pub struct HttpResponse {
    pub status: u16,
    pub body: ByteStream,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Transport-level failures. All of them are candidates for retry.
#[derive(Debug, Clone, Error)]
pub enum HttpError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("body read failed: {0}")]
    Body(String),
}

/// Sends a single HTTP POST.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// Read a body stream to the end.
pub async fn collect_body(mut body: ByteStream) -> Result<Vec<u8>, HttpError> {
    let mut buf = Vec::new();
    while let Some(chunk) = body.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf)
}

// ─── Reqwest Transport ───────────────────────────────────────────────────────

/// Default transport backed by `reqwest`.
///
/// Only a connect timeout is applied. Total request time is unbounded since
/// streaming completions can run for minutes.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(connect_timeout: Option<Duration>) -> Result<Self, HttpError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| HttpError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wrap an existing client (shared pools, custom TLS, proxies).
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut req = self
            .client
            .post(&request.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .bearer_auth(&request.bearer_token)
            .body(request.body);

        if request.stream {
            req = req.header(reqwest::header::ACCEPT, "text/event-stream");
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_connect() {
                HttpError::Connect(e.to_string())
            } else {
                HttpError::Request(e.to_string())
            }
        })?;

        let status = resp.status().as_u16();
        let body = resp
            .bytes_stream()
            .map_err(|e| HttpError::Body(e.to_string()));

        Ok(HttpResponse {
            status,
            body: Box::pin(body),
        })
    }
}

// ─── Test Support ────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted transport for unit tests.

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use futures::stream;

    use super::*;

    /// One scripted reply.
    pub enum Reply {
        Fail(HttpError),
        Respond { status: u16, chunks: Vec<Vec<u8>> },
    }

    impl Reply {
        pub fn json(status: u16, body: &str) -> Self {
            Reply::Respond {
                status,
                chunks: vec![body.as_bytes().to_vec()],
            }
        }

        pub fn chunks(chunks: &[&str]) -> Self {
            Reply::Respond {
                status: 200,
                chunks: chunks.iter().map(|c| c.as_bytes().to_vec()).collect(),
            }
        }

        pub fn network_error() -> Self {
            Reply::Fail(HttpError::Connect("Network error".into()))
        }
    }

    /// Plays back replies in order and records every request.
    #[derive(Default)]
    pub struct ScriptedTransport {
        replies: Mutex<VecDeque<Reply>>,
        requests: Mutex<Vec<HttpRequest>>,
        calls: AtomicUsize,
    }

    impl ScriptedTransport {
        pub fn new(replies: Vec<Reply>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                ..Default::default()
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn post(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request);
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("scripted transport ran out of replies");
            match reply {
                Reply::Fail(e) => Err(e),
                Reply::Respond { status, chunks } => Ok(HttpResponse {
                    status,
                    body: Box::pin(stream::iter(
                        chunks.into_iter().map(|c| Ok::<_, HttpError>(Bytes::from(c))),
                    )),
                }),
            }
        }
    }
}
