//! Incremental parser for OpenAI-style server-sent event streams

use super::{StreamChunk, Usage};
use crate::event::FinishReason;
use serde::Deserialize;

/// Turns raw response bytes into stream chunks.
///
/// Frames are separated by a blank line; only `data:` lines matter. The
/// literal payload `[DONE]` marks the end of the stream, and so does a frame
/// carrying an `error` object.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    finished: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed arbitrary bytes and drain the chunks of every complete frame
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamChunk> {
        self.buffer
            .push_str(&String::from_utf8_lossy(bytes).replace("\r\n", "\n"));
        let mut chunks = Vec::new();

        while !self.finished {
            let Some(split) = self.buffer.find("\n\n") else {
                break;
            };
            let frame = self.buffer[..split].to_string();
            self.buffer.drain(..split + 2);

            let Some(payload) = extract_data_payload(&frame) else {
                continue;
            };
            if payload == "[DONE]" {
                self.finished = true;
                break;
            }

            match serde_json::from_str::<ApiStreamChunk>(&payload) {
                Ok(ApiStreamChunk {
                    error: Some(error), ..
                }) => {
                    chunks.push(map_error(error));
                    self.finished = true;
                }
                Ok(chunk) => chunks.extend(map_chunk(chunk)),
                Err(e) => tracing::debug!(error = %e, "skipping malformed stream frame"),
            }
        }

        chunks
    }

    /// Whether the `[DONE]` marker has been seen
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

fn extract_data_payload(frame: &str) -> Option<String> {
    let data_lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .collect();

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}

fn map_chunk(chunk: ApiStreamChunk) -> Vec<StreamChunk> {
    let mut out = Vec::new();
    let usage = chunk.usage.map(|u| Usage {
        prompt_tokens: u.prompt_tokens,
        completion_tokens: u.completion_tokens,
        total_tokens: u.total_tokens,
    });

    if let Some(choice) = chunk.choices.into_iter().next() {
        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
            out.push(StreamChunk::Text(content));
        }
        if let Some(reason) = choice.finish_reason {
            out.push(StreamChunk::Done {
                finish_reason: FinishReason::from_api(&reason),
                usage,
            });
        }
    }

    out
}

fn map_error(error: ApiStreamError) -> StreamChunk {
    let code = match error.code {
        Some(serde_json::Value::String(code)) => Some(code),
        Some(serde_json::Value::Number(code)) => Some(code.to_string()),
        _ => None,
    };
    let message = error
        .message
        .filter(|m| !m.trim().is_empty())
        .or(error.kind)
        .unwrap_or_else(|| "stream failed".to_string());
    StreamChunk::Error { code, message }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiStreamChunk {
    #[serde(default)]
    choices: Vec<ApiStreamChoice>,
    usage: Option<ApiUsage>,
    error: Option<ApiStreamError>,
}

#[derive(Debug, Deserialize)]
struct ApiStreamError {
    message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    /// Numeric HTTP-like status on some servers, a string on others
    code: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ApiStreamChoice {
    #[serde(default)]
    delta: ApiStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiStreamDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
    total_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(content: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":\"{}\"}},\"finish_reason\":null}}]}}\n\n",
            content
        )
    }

    #[test]
    fn test_parses_text_deltas() {
        let mut parser = SseParser::new();
        let input = format!("{}{}", frame("Hi"), frame(" there"));
        let chunks = parser.feed(input.as_bytes());
        assert_eq!(
            chunks,
            vec![
                StreamChunk::Text("Hi".into()),
                StreamChunk::Text(" there".into())
            ]
        );
        assert!(!parser.is_finished());
    }

    #[test]
    fn test_frames_split_across_feeds() {
        let mut parser = SseParser::new();
        let input = frame("split");
        let (head, tail) = input.split_at(20);

        assert!(parser.feed(head.as_bytes()).is_empty());
        assert_eq!(parser.feed(tail.as_bytes()), vec![StreamChunk::Text("split".into())]);
    }

    #[test]
    fn test_finish_reason_and_done_marker() {
        let mut parser = SseParser::new();
        let input = "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}],\
                     \"usage\":{\"prompt_tokens\":3,\"completion_tokens\":2,\"total_tokens\":5}}\n\n\
                     data: [DONE]\n\n\
                     data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\n";
        let chunks = parser.feed(input.as_bytes());

        assert_eq!(
            chunks,
            vec![StreamChunk::Done {
                finish_reason: FinishReason::Stop,
                usage: Some(Usage {
                    prompt_tokens: 3,
                    completion_tokens: 2,
                    total_tokens: 5
                }),
            }]
        );
        assert!(parser.is_finished());
    }

    #[test]
    fn test_skips_comments_and_malformed_frames() {
        let mut parser = SseParser::new();
        let input = format!(": keep-alive\n\ndata: {{not json\n\n{}", frame("ok"));
        assert_eq!(parser.feed(input.as_bytes()), vec![StreamChunk::Text("ok".into())]);
    }

    #[test]
    fn test_error_frame_ends_stream() {
        let mut parser = SseParser::new();
        let input = format!(
            "{}data: {{\"error\":{{\"message\":\"Model is overloaded\",\"code\":503}}}}\n\n{}",
            frame("Hel"),
            frame("lo")
        );

        assert_eq!(
            parser.feed(input.as_bytes()),
            vec![
                StreamChunk::Text("Hel".into()),
                StreamChunk::Error {
                    code: Some("503".into()),
                    message: "Model is overloaded".into(),
                },
            ]
        );
        assert!(parser.is_finished());
    }

    #[test]
    fn test_error_frame_with_string_code_and_no_message() {
        let mut parser = SseParser::new();
        let input = "data: {\"error\":{\"type\":\"server_error\",\"code\":\"overloaded\"}}\n\n";

        assert_eq!(
            parser.feed(input.as_bytes()),
            vec![StreamChunk::Error {
                code: Some("overloaded".into()),
                message: "server_error".into(),
            }]
        );
    }

    #[test]
    fn test_crlf_frames() {
        let mut parser = SseParser::new();
        let input = "data: {\"choices\":[{\"delta\":{\"content\":\"win\"}}]}\r\n\r\n";
        assert_eq!(parser.feed(input.as_bytes()), vec![StreamChunk::Text("win".into())]);
    }
}
