//! Streamed response handling
//!
//! SSE parsing for chat-completion chunk streams plus the think-tag
//! bracketing that wraps provider-supplied reasoning content in literal
//! `<think>`/`</think>` markers.

use futures::{Stream, StreamExt};
use memos_core::{MemosError, Result};
use reqwest::Response;
use std::pin::Pin;

/// Boxed text chunk stream returned by `generate_stream`.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A single streamed delta from the vendor API.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamDelta {
    pub content: Option<String>,
    /// Intermediate "thinking" text emitted by reasoning-capable models.
    pub reasoning_content: Option<String>,
}

/// Parse an SSE response body into a stream of deltas.
pub fn parse_sse_stream(response: Response) -> impl Stream<Item = Result<StreamDelta>> + Send {
    async_stream::stream! {
        let mut byte_stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(bytes_result) = byte_stream.next().await {
            match bytes_result {
                Ok(bytes) => {
                    if let Ok(text) = std::str::from_utf8(&bytes) {
                        buffer.push_str(text);
                    }

                    while let Some(event_end) = buffer.find("\n\n") {
                        let event = buffer[..event_end].to_string();
                        buffer = buffer[event_end + 2..].to_string();

                        if let Some(result) = parse_sse_event(&event) {
                            yield result;
                        }
                    }
                }
                Err(e) => {
                    yield Err(MemosError::Http(format!("stream read error: {}", e)));
                    return;
                }
            }
        }
    }
}

/// Parse a single SSE event. Returns `None` for keep-alives and `[DONE]`.
fn parse_sse_event(event: &str) -> Option<Result<StreamDelta>> {
    for line in event.lines() {
        if let Some(data) = line.strip_prefix("data: ") {
            if data == "[DONE]" {
                return None;
            }

            match serde_json::from_str::<serde_json::Value>(data) {
                Ok(json) => {
                    if let Some(delta) = parse_delta(&json) {
                        return Some(Ok(delta));
                    }
                }
                Err(e) => {
                    return Some(Err(MemosError::Serialization(e)));
                }
            }
        }
    }
    None
}

fn parse_delta(json: &serde_json::Value) -> Option<StreamDelta> {
    let delta = &json["choices"].get(0)?["delta"];

    Some(StreamDelta {
        content: delta["content"].as_str().map(|s| s.to_string()),
        reasoning_content: delta["reasoning_content"].as_str().map(|s| s.to_string()),
    })
}

/// Re-emit a delta stream as text, bracketing reasoning content with
/// `<think>`/`</think>` markers when `keep_markers` is set.
///
/// An unterminated reasoning block is closed at stream end, so a stream that
/// carries only reasoning content still yields a final `</think>`.
pub fn bracket_reasoning<S>(deltas: S, keep_markers: bool) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = Result<StreamDelta>> + Send + 'static,
{
    async_stream::stream! {
        futures::pin_mut!(deltas);
        let mut reasoning_started = false;

        while let Some(item) = deltas.next().await {
            match item {
                Ok(delta) => {
                    if let Some(reasoning) =
                        delta.reasoning_content.filter(|s| !s.is_empty())
                    {
                        if !reasoning_started {
                            if keep_markers {
                                yield Ok("<think>".to_string());
                            }
                            reasoning_started = true;
                        }
                        yield Ok(reasoning);
                    } else if let Some(content) = delta.content.filter(|s| !s.is_empty()) {
                        if reasoning_started {
                            if keep_markers {
                                yield Ok("</think>".to_string());
                            }
                            reasoning_started = false;
                        }
                        yield Ok(content);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }

        if reasoning_started && keep_markers {
            yield Ok("</think>".to_string());
        }
    }
}
