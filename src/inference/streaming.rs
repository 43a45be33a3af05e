//! SSE streaming response decoder for chat completions.
//!
//! Reads a response body as a byte stream, reassembles newline-delimited
//! `data:` frames across arbitrary chunk boundaries (including split UTF-8
//! sequences), and yields one parsed value per complete frame, in order.
//!
//! The returned stream owns the body. It is dropped as soon as the stream
//! finishes (sentinel, end of data, read error) or the consumer drops the
//! stream, which releases the connection.

use futures::future;
use futures::stream::{self, Stream, StreamExt};
use serde::de::DeserializeOwned;

use super::errors::ClientError;
use super::transport::ByteStream;
use super::types::ChatCompletionChunk;

/// Prefix of frames that carry a payload. The space after the colon is
/// optional on the wire.
pub const DATA_PREFIX: &str = "data:";

/// Payload that ends the stream.
pub const DONE_SENTINEL: &str = "[DONE]";

// ─── Public entry points ─────────────────────────────────────────────────────

/// Decode an SSE body into a lazy stream of `T`.
///
/// Per frame:
/// 1. Lines without the `data:` prefix (comments, keep-alives) are dropped
/// 2. `data: [DONE]` ends the stream; nothing after it is read
/// 3. Any other payload is parsed as JSON. Malformed frames are logged and
///    skipped, the stream continues
///
/// A read error mid-stream is yielded once as `ClientError::Transport` and
/// ends the stream.
pub fn parse_sse_stream<T>(body: ByteStream) -> impl Stream<Item = Result<T, ClientError>> + Send
where
    T: DeserializeOwned + Send + 'static,
{
    stream::unfold(DecodeState::new(body), |mut state| async move {
        let item = state.next_item::<T>().await?;
        Some((item, state))
    })
}

/// Reduce chat-completion chunks to their non-empty text fragments.
///
/// Chunks without `choices[0].delta.content` (role headers, the final usage
/// chunk) produce nothing. Errors pass through.
pub fn text_deltas<S>(chunks: S) -> impl Stream<Item = Result<String, ClientError>>
where
    S: Stream<Item = Result<ChatCompletionChunk, ClientError>>,
{
    chunks.filter_map(|item| {
        future::ready(match item {
            Ok(chunk) => chunk
                .content()
                .filter(|text| !text.is_empty())
                .map(|text| Ok(text.to_string())),
            Err(e) => Some(Err(e)),
        })
    })
}

// ─── Decode State ────────────────────────────────────────────────────────────

/// Everything one in-flight stream owns.
struct DecodeState {
    /// `None` once the stream has finished.
    body: Option<ByteStream>,
    lines: LineBuffer,
}

impl DecodeState {
    fn new(body: ByteStream) -> Self {
        Self {
            body: Some(body),
            lines: LineBuffer::default(),
        }
    }

    /// Pull until one value is ready or the stream is over.
    async fn next_item<T: DeserializeOwned>(&mut self) -> Option<Result<T, ClientError>> {
        loop {
            // Drain complete lines already buffered before touching the network.
            while let Some(line) = self.lines.next_line() {
                match decode_frame::<T>(&line) {
                    Frame::Value(value) => return Some(Ok(value)),
                    Frame::Done => {
                        self.finish();
                        return None;
                    }
                    Frame::Skip => {}
                }
            }

            let next = self.body.as_mut()?.next().await;
            match next {
                Some(Ok(bytes)) => self.lines.push(&bytes),
                Some(Err(e)) => {
                    self.finish();
                    return Some(Err(ClientError::Transport {
                        endpoint: "response stream".into(),
                        reason: format!("stream read error: {e}"),
                    }));
                }
                None => {
                    // Body ended without the sentinel; the tail may hold one
                    // last unterminated frame.
                    self.finish();
                    let tail = self.lines.take_remainder()?;
                    return match decode_frame::<T>(&tail) {
                        Frame::Value(value) => Some(Ok(value)),
                        Frame::Done | Frame::Skip => None,
                    };
                }
            }
        }
    }

    /// Release the body.
    fn finish(&mut self) {
        if self.body.take().is_some() {
            tracing::trace!("stream body released");
        }
    }
}

// ─── Frame Decoding ──────────────────────────────────────────────────────────

enum Frame<T> {
    Value(T),
    Done,
    Skip,
}

/// Interpret one complete line.
fn decode_frame<T: DeserializeOwned>(line: &str) -> Frame<T> {
    let Some(payload) = data_payload(line) else {
        return Frame::Skip;
    };
    if payload == DONE_SENTINEL {
        return Frame::Done;
    }
    if payload.is_empty() {
        return Frame::Skip;
    }

    match serde_json::from_str(payload) {
        Ok(value) => Frame::Value(value),
        Err(e) => {
            let err = ClientError::FrameDecode {
                reason: e.to_string(),
                data: payload.to_string(),
            };
            tracing::warn!(error = %err, "skipping malformed stream frame");
            Frame::Skip
        }
    }
}

/// The payload of a `data:` line, trimmed. `None` for any other line.
fn data_payload(line: &str) -> Option<&str> {
    line.trim().strip_prefix(DATA_PREFIX).map(str::trim)
}

// ─── Line Buffer ─────────────────────────────────────────────────────────────

/// Carry-over text between chunks, split into complete lines on demand.
#[derive(Default)]
struct LineBuffer {
    utf8: Utf8Carry,
    buffer: String,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) {
        let text = self.utf8.decode(bytes);
        self.buffer.push_str(&text);
    }

    /// Next `\n`-terminated line (terminator removed). The incomplete tail
    /// stays buffered.
    fn next_line(&mut self) -> Option<String> {
        let end = self.buffer.find('\n')?;
        let mut line: String = self.buffer.drain(..=end).collect();
        line.pop();
        Some(line)
    }

    /// Whatever is left once the body has ended.
    fn take_remainder(&mut self) -> Option<String> {
        let tail = self.utf8.finish();
        self.buffer.push_str(&tail);
        let rest = std::mem::take(&mut self.buffer);
        (!rest.trim().is_empty()).then_some(rest)
    }
}

/// Incremental UTF-8 decoder.
///
/// Bytes of a multi-byte sequence cut off at the end of a chunk are held
/// back until the next chunk. Invalid sequences decode to U+FFFD.
#[derive(Default)]
struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    fn decode(&mut self, bytes: &[u8]) -> String {
        let mut input = std::mem::take(&mut self.pending);
        input.extend_from_slice(bytes);

        let mut out = String::with_capacity(input.len());
        let mut rest: &[u8] = &input;

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            // Truncated sequence at the end: wait for more.
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush held-back bytes at end of input.
    fn finish(&mut self) -> String {
        let pending = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&pending).into_owned()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use bytes::Bytes;
    use serde_json::{json, Value};

    use super::*;
    use crate::inference::transport::HttpError;

    fn body(chunks: &[&[u8]]) -> ByteStream {
        let chunks: Vec<Result<Bytes, HttpError>> = chunks
            .iter()
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Box::pin(stream::iter(chunks))
    }

    async fn decode_all(chunks: &[&[u8]]) -> Vec<Value> {
        parse_sse_stream::<Value>(body(chunks))
            .map(|item| item.unwrap())
            .collect()
            .await
    }

    /// Sets a flag when dropped, to observe body release.
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    /// A body that records how many chunks were pulled and when it is dropped.
    fn observed_body(
        chunks: &[&'static str],
        pulled: Arc<AtomicUsize>,
        dropped: Arc<AtomicBool>,
    ) -> ByteStream {
        let guard = DropFlag(dropped);
        let chunks: Vec<&'static str> = chunks.to_vec();
        Box::pin(stream::iter(chunks).map(move |c| {
            let _keep = &guard;
            pulled.fetch_add(1, Ordering::SeqCst);
            Ok::<_, HttpError>(Bytes::from_static(c.as_bytes()))
        }))
    }

    #[tokio::test]
    async fn test_two_frames_two_units_in_order() {
        let units = decode_all(&[b"data: {\"id\":\"1\"}\n", b"data: {\"id\":\"2\"}\n"]).await;
        assert_eq!(units, vec![json!({"id": "1"}), json!({"id": "2"})]);
    }

    #[tokio::test]
    async fn test_frame_split_across_chunks() {
        let units = decode_all(&[b"data: {\"i", b"d\":\"1\"}\n"]).await;
        assert_eq!(units, vec![json!({"id": "1"})]);
    }

    #[tokio::test]
    async fn test_frame_split_across_many_chunks() {
        let units = decode_all(&[b"da", b"ta: {", b"\"id\"", b":\"1\"", b"}", b"\n"]).await;
        assert_eq!(units, vec![json!({"id": "1"})]);
    }

    #[tokio::test]
    async fn test_multiple_frames_in_one_chunk() {
        let units = decode_all(&[b"data: {\"id\":\"1\"}\n\ndata: {\"id\":\"2\"}\n\n"]).await;
        assert_eq!(units.len(), 2);
        assert_eq!(units[1]["id"], "2");
    }

    #[tokio::test]
    async fn test_crlf_line_endings() {
        let units = decode_all(&[b"data: {\"id\":\"1\"}\r\n\r\n"]).await;
        assert_eq!(units, vec![json!({"id": "1"})]);
    }

    #[tokio::test]
    async fn test_multibyte_char_split_across_chunks() {
        // "é" is 0xC3 0xA9; "🦀" is four bytes.
        let frame = "data: {\"content\":\"caf\u{e9} \u{1F980}\"}\n".as_bytes();
        let e_pos = frame.iter().position(|&b| b == 0xC3).unwrap();
        let crab_pos = frame.iter().position(|&b| b == 0xF0).unwrap();
        let units = decode_all(&[
            &frame[..e_pos + 1],
            &frame[e_pos + 1..crab_pos + 2],
            &frame[crab_pos + 2..],
        ])
        .await;
        assert_eq!(units, vec![json!({"content": "caf\u{e9} \u{1F980}"})]);
    }

    #[tokio::test]
    async fn test_done_terminates_and_later_chunks_are_never_read() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let dropped = Arc::new(AtomicBool::new(false));
        let body = observed_body(
            &[
                "data: {\"id\":\"1\"}\n",
                "data: [DONE]\n",
                "data: {\"id\":\"2\"}\n",
            ],
            pulled.clone(),
            dropped.clone(),
        );

        let mut stream = Box::pin(parse_sse_stream::<Value>(body));
        assert_eq!(stream.next().await.unwrap().unwrap(), json!({"id": "1"}));
        assert!(stream.next().await.is_none());
        assert_eq!(pulled.load(Ordering::SeqCst), 2);
        assert!(dropped.load(Ordering::SeqCst), "body released on sentinel");
    }

    #[tokio::test]
    async fn test_done_in_same_chunk_discards_rest() {
        let units = decode_all(&[b"data: {\"id\":\"1\"}\ndata: [DONE]\ndata: {\"id\":\"2\"}\n"]).await;
        assert_eq!(units, vec![json!({"id": "1"})]);
    }

    #[tokio::test]
    async fn test_malformed_frame_is_skipped() {
        let units = decode_all(&[
            b"data: {\"id\":\"1\"}\n",
            b"data: {not json}\n",
            b"data: {\"id\":\"2\"}\n",
        ])
        .await;
        assert_eq!(units, vec![json!({"id": "1"}), json!({"id": "2"})]);
    }

    #[tokio::test]
    async fn test_non_data_lines_ignored() {
        let units = decode_all(&[
            b": keep-alive\n",
            b"event: message\n",
            b"id: 7\n",
            b"data:\n",
            b"data:{\"id\":\"1\"}\n",
        ])
        .await;
        assert_eq!(units, vec![json!({"id": "1"})]);
    }

    #[tokio::test]
    async fn test_trailing_frame_without_newline() {
        let units = decode_all(&[b"data: {\"id\":\"1\"}\n", b"data: {\"id\":\"2\"}"]).await;
        assert_eq!(units, vec![json!({"id": "1"}), json!({"id": "2"})]);
    }

    #[tokio::test]
    async fn test_trailing_garbage_is_ignored() {
        let units = decode_all(&[b"data: {\"id\":\"1\"}\n", b"partial noise"]).await;
        assert_eq!(units, vec![json!({"id": "1"})]);

        let units = decode_all(&[b"data: {\"id\":\"1\"}\n", b"data: {\"trunc"]).await;
        assert_eq!(units, vec![json!({"id": "1"})]);
    }

    #[tokio::test]
    async fn test_empty_body() {
        assert!(decode_all(&[]).await.is_empty());
    }

    #[tokio::test]
    async fn test_read_error_ends_stream() {
        let chunks: Vec<Result<Bytes, HttpError>> = vec![
            Ok(Bytes::from_static(b"data: {\"id\":\"1\"}\n")),
            Err(HttpError::Body("connection reset".into())),
            Ok(Bytes::from_static(b"data: {\"id\":\"2\"}\n")),
        ];
        let items: Vec<_> = parse_sse_stream::<Value>(Box::pin(stream::iter(chunks)))
            .collect()
            .await;

        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        let err = items[1].as_ref().unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_dropping_stream_releases_body() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let dropped = Arc::new(AtomicBool::new(false));
        let body = observed_body(
            &["data: {\"id\":\"1\"}\n", "data: {\"id\":\"2\"}\n"],
            pulled,
            dropped.clone(),
        );

        let mut stream = Box::pin(parse_sse_stream::<Value>(body));
        assert!(stream.next().await.is_some());
        assert!(!dropped.load(Ordering::SeqCst));
        drop(stream);
        assert!(dropped.load(Ordering::SeqCst), "body released on early drop");
    }

    #[tokio::test]
    async fn test_typed_chunks_and_text_deltas() {
        let chunks: &[&[u8]] = &[
            b"data: {\"id\":\"c\",\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n",
            b"data: {\"id\":\"c\",\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n",
            b"data: {\"id\":\"c\",\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n",
            b"data: {\"id\":\"c\",\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n",
            b"data: {\"id\":\"c\",\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}],\"usage\":{\"prompt_tokens\":1,\"completion_tokens\":2,\"total_tokens\":3}}\n",
            b"data: [DONE]\n",
        ];

        let units: Vec<ChatCompletionChunk> = parse_sse_stream(body(chunks))
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(units.len(), 5);
        assert_eq!(units[4].finish_reason(), Some("stop"));

        let text: Vec<String> = text_deltas(parse_sse_stream(body(chunks)))
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(text, vec!["Hel".to_string(), "lo".to_string()]);
    }

    #[tokio::test]
    async fn test_text_deltas_keeps_fragment_with_unknown_role() {
        let chunks: &[&[u8]] = &[
            b"data: {\"choices\":[{\"delta\":{\"role\":\"\",\"content\":\"Hel\"}}]}\n",
            b"data: {\"choices\":[{\"delta\":{\"role\":\"narrator\",\"content\":\"lo\"}}]}\n",
            b"data: [DONE]\n",
        ];

        let text: Vec<String> = text_deltas(parse_sse_stream(body(chunks)))
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(text.concat(), "Hello");
    }

    #[tokio::test]
    async fn test_text_deltas_passes_errors_through() {
        let items = stream::iter(vec![
            Ok(ChatCompletionChunk::default()),
            Err(ClientError::Transport {
                endpoint: "response stream".into(),
                reason: "reset".into(),
            }),
        ]);
        let out: Vec<_> = text_deltas(items).collect().await;
        assert_eq!(out.len(), 1);
        assert!(out[0].is_err());
    }

    #[test]
    fn test_utf8_carry_invalid_bytes_replaced() {
        let mut carry = Utf8Carry::default();
        assert_eq!(carry.decode(b"a\xFFb"), "a\u{FFFD}b");
        assert_eq!(carry.decode(&[0xE2, 0x82]), "");
        assert_eq!(carry.decode(&[0xAC]), "\u{20AC}");
        assert_eq!(carry.decode(&[0xE2]), "");
        assert_eq!(carry.finish(), "\u{FFFD}");
    }

    #[test]
    fn test_data_payload() {
        assert_eq!(data_payload("  data: [DONE]  "), Some("[DONE]"));
        assert_eq!(data_payload("data:{}"), Some("{}"));
        assert_eq!(data_payload(": comment"), None);
        assert_eq!(data_payload("event: data: x"), None);
    }
}
