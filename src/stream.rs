//! Streamed-response consumption: bytes → NDJSON lines → accumulated text.
//!
//! The OCR service streams its answer as newline-delimited JSON objects:
//!
//! ```text
//! {"response": "[{\"bbox\": [12, 30"}
//! {"response": ", 400, 88], \"category\": \"Title\", ..."}
//! {"response": "", "done": true}
//! ```
//!
//! Consumption is a cooperative pull in two layers, neither of which knows
//! about HTTP:
//!
//! 1. [`ndjson_lines`] turns any byte-chunk stream into a [`LineStream`],
//!    re-joining lines split across chunk boundaries.
//! 2. [`accumulate`] pulls lines, concatenates `response` fragments in arrival
//!    order, and stops at the first `"done": true`.
//!
//! A malformed line is counted and skipped. A transport error ends the pull
//! but keeps everything accumulated so far; the caller decides whether that
//! text is usable.

use crate::error::PageError;
use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;
use std::pin::Pin;
use tracing::{debug, warn};

/// A boxed stream of decoded text lines (without the trailing newline).
pub type LineStream = Pin<Box<dyn Stream<Item = Result<String, PageError>> + Send>>;

/// One decoded NDJSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamChunk {
    /// Incremental response text, if the object carried one.
    pub response: Option<String>,
    /// `true` once the service has finished generating.
    pub done: bool,
}

impl StreamChunk {
    /// Parse one line. Returns `None` for anything that is not a JSON object.
    pub fn parse(line: &str) -> Option<Self> {
        match serde_json::from_str::<Value>(line).ok()? {
            Value::Object(map) => Some(Self {
                response: map.get("response").and_then(Value::as_str).map(str::to_string),
                done: matches!(map.get("done"), Some(Value::Bool(true))),
            }),
            _ => None,
        }
    }
}

/// Everything pulled from one response stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Accumulated {
    /// Concatenated `response` fragments.
    pub text: String,
    /// Well-formed objects seen.
    pub chunks: usize,
    /// Lines that were not JSON objects.
    pub malformed: usize,
    /// Whether a `"done": true` object ended the stream.
    pub done: bool,
    /// The transport error that cut the stream short, if any.
    pub error: Option<PageError>,
}

struct LineState<S, F> {
    inner: Pin<Box<S>>,
    buf: Vec<u8>,
    finished: bool,
    map_err: F,
}

/// Split a byte-chunk stream into text lines.
///
/// `\r\n` and `\n` both end a line; a final line without a newline is still
/// emitted. Invalid UTF-8 is replaced rather than rejected, so one bad byte
/// only spoils the line it sits on. After a transport error the partial line
/// is dropped and the error is yielded once.
pub fn ndjson_lines<S, B, E, F>(bytes: S, map_err: F) -> LineStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Send + 'static,
    F: Fn(E) -> PageError + Send + 'static,
{
    let state = LineState {
        inner: Box::pin(bytes),
        buf: Vec::new(),
        finished: false,
        map_err,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(pos) = st.buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = st.buf.drain(..=pos).collect();
                return Some((Ok(decode_line(&line[..line.len() - 1])), st));
            }
            if st.finished {
                if st.buf.is_empty() {
                    return None;
                }
                let rest = std::mem::take(&mut st.buf);
                return Some((Ok(decode_line(&rest)), st));
            }
            match st.inner.next().await {
                Some(Ok(chunk)) => st.buf.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    st.finished = true;
                    st.buf.clear();
                    let err = (st.map_err)(e);
                    return Some((Err(err), st));
                }
                None => st.finished = true,
            }
        }
    })
    .boxed()
}

fn decode_line(bytes: &[u8]) -> String {
    let line = String::from_utf8_lossy(bytes);
    line.strip_suffix('\r').unwrap_or(&line).to_string()
}

/// Pull `lines` until `done`, end of stream, or a transport error.
///
/// `on_fragment` sees each non-empty `response` fragment as it arrives.
pub async fn accumulate<S>(mut lines: S, mut on_fragment: impl FnMut(&str)) -> Accumulated
where
    S: Stream<Item = Result<String, PageError>> + Unpin,
{
    let mut acc = Accumulated::default();

    while let Some(item) = lines.next().await {
        let line = match item {
            Ok(line) => line,
            Err(e) => {
                warn!("Response stream ended early: {}", e);
                acc.error = Some(e);
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match StreamChunk::parse(line) {
            Some(chunk) => {
                acc.chunks += 1;
                if let Some(fragment) = chunk.response {
                    if !fragment.is_empty() {
                        on_fragment(&fragment);
                    }
                    acc.text.push_str(&fragment);
                }
                if chunk.done {
                    acc.done = true;
                    break;
                }
            }
            None => {
                acc.malformed += 1;
                debug!("Skipping malformed stream line ({} bytes)", line.len());
            }
        }
    }

    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(items: &[&str]) -> LineStream {
        let owned: Vec<Result<String, PageError>> =
            items.iter().map(|s| Ok(s.to_string())).collect();
        stream::iter(owned).boxed()
    }

    fn io_err(e: std::io::Error) -> PageError {
        PageError::Transport {
            page: 1,
            detail: e.to_string(),
        }
    }

    #[test]
    fn chunk_parse() {
        assert_eq!(
            StreamChunk::parse(r#"{"response":"ab","done":false}"#),
            Some(StreamChunk {
                response: Some("ab".into()),
                done: false
            })
        );
        assert_eq!(
            StreamChunk::parse(r#"{"done":true}"#),
            Some(StreamChunk {
                response: None,
                done: true
            })
        );
        assert_eq!(StreamChunk::parse("[1,2]"), None);
        assert_eq!(StreamChunk::parse("{not json"), None);
    }

    #[test]
    fn accumulates_in_order_and_stops_at_done() {
        let acc = tokio_test::block_on(accumulate(
            lines(&[
                r#"{"response":"[{\"category\":"}"#,
                r#"{"response":"\"Text\"}]"}"#,
                r#"{"response":"","done":true}"#,
                r#"{"response":"IGNORED"}"#,
            ]),
            |_| {},
        ));
        assert_eq!(acc.text, r#"[{"category":"Text"}]"#);
        assert!(acc.done);
        assert_eq!(acc.chunks, 3);
        assert_eq!(acc.error, None);
    }

    #[test]
    fn malformed_lines_do_not_lose_content() {
        let mut seen = Vec::new();
        let acc = tokio_test::block_on(accumulate(
            lines(&[
                r#"{"response":"Hel"}"#,
                "garbage {{{",
                "",
                r#"{"response":"lo"}"#,
            ]),
            |f| seen.push(f.to_string()),
        ));
        assert_eq!(acc.text, "Hello");
        assert_eq!(acc.malformed, 1);
        assert!(!acc.done);
        assert_eq!(seen, vec!["Hel", "lo"]);
    }

    #[test]
    fn transport_error_keeps_accumulated_text() {
        let items: Vec<Result<String, PageError>> = vec![
            Ok(r#"{"response":"partial"}"#.to_string()),
            Err(PageError::Transport {
                page: 4,
                detail: "connection reset".into(),
            }),
            Ok(r#"{"response":"never read"}"#.to_string()),
        ];
        let acc = tokio_test::block_on(accumulate(stream::iter(items), |_| {}));
        assert_eq!(acc.text, "partial");
        assert!(matches!(acc.error, Some(PageError::Transport { page: 4, .. })));
    }

    #[test]
    fn lines_rejoin_across_chunk_boundaries() {
        let chunks: Vec<Result<&'static [u8], std::io::Error>> = vec![
            Ok(b"{\"response\":\"a\"}\n{\"resp"),
            Ok(b"onse\":\"b\"}\r\n"),
            Ok(b"{\"done\":true}"),
        ];
        let out: Vec<String> = tokio_test::block_on(
            ndjson_lines(stream::iter(chunks), io_err)
                .map(|r| r.unwrap())
                .collect(),
        );
        assert_eq!(
            out,
            vec![
                r#"{"response":"a"}"#,
                r#"{"response":"b"}"#,
                r#"{"done":true}"#
            ]
        );
    }

    #[test]
    fn lines_surface_transport_error_once() {
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(b"{\"response\":\"a\"}\n{\"respo".to_vec()),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];
        let out: Vec<Result<String, PageError>> =
            tokio_test::block_on(ndjson_lines(stream::iter(chunks), io_err).collect());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_deref(), Ok(r#"{"response":"a"}"#));
        assert!(matches!(out[1], Err(PageError::Transport { .. })));
    }
}
