//! Server-sent event decoding for streamed completions
//!
//! [`SseDecoder`] turns arbitrary byte chunks into complete SSE frames.
//! [`StreamAssembler`] folds Anthropic stream events into a
//! [`CompletionResponse`], yielding text deltas as they arrive and
//! assembling tool-use input from `input_json_delta` fragments.

use super::{CompletionResponse, ContentBlock, LLMError, Result, StopReason};
use serde::Deserialize;
use std::collections::BTreeMap;

/// One decoded SSE frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental SSE frame decoder
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every frame completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut events = Vec::new();
        while let Some(end) = find_frame_end(&self.buffer) {
            let frame: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(event) = parse_frame(&frame[..end]) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing frame that was not terminated by a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let frame = std::mem::take(&mut self.buffer);
        parse_frame(&frame)
    }
}

fn find_frame_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

fn parse_frame(frame: &[u8]) -> Option<SseEvent> {
    // Frames end on a newline byte, so no UTF-8 sequence is ever split here
    let text = String::from_utf8_lossy(frame);
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event = Some(value.to_string()),
            "data" => data.push(value),
            _ => {}
        }
    }

    if data.is_empty() {
        return None;
    }
    Some(SseEvent {
        event,
        data: data.join("\n"),
    })
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    MessageStart {},
    ContentBlockStart {
        index: usize,
        content_block: StartBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: BlockDelta,
    },
    ContentBlockStop {},
    MessageDelta {
        delta: MessageDeltaBody,
    },
    MessageStop {},
    Ping {},
    Error {
        error: ApiErrorBody,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StartBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaBody {
    #[serde(default)]
    stop_reason: Option<StopReason>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug)]
enum PartialBlock {
    Text(String),
    ToolUse {
        id: String,
        name: String,
        json: String,
    },
}

/// Folds stream events into a reply
#[derive(Debug, Default)]
pub struct StreamAssembler {
    blocks: BTreeMap<usize, PartialBlock>,
    stop_reason: Option<StopReason>,
    stopped: bool,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one frame. Returns the text delta it carried, if any.
    pub fn apply(&mut self, event: &SseEvent) -> Result<Option<String>> {
        let parsed: StreamEvent = serde_json::from_str(&event.data)
            .map_err(|e| LLMError::ParseError(format!("bad stream event: {}", e)))?;

        match parsed {
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                StartBlock::Text { text } => {
                    self.blocks.insert(index, PartialBlock::Text(text.clone()));
                    return Ok((!text.is_empty()).then_some(text));
                }
                StartBlock::ToolUse { id, name } => {
                    self.blocks.insert(
                        index,
                        PartialBlock::ToolUse {
                            id,
                            name,
                            json: String::new(),
                        },
                    );
                }
                StartBlock::Unknown => {}
            },
            StreamEvent::ContentBlockDelta { index, delta } => match delta {
                BlockDelta::TextDelta { text } => {
                    let block = self
                        .blocks
                        .entry(index)
                        .or_insert_with(|| PartialBlock::Text(String::new()));
                    if let PartialBlock::Text(existing) = block {
                        existing.push_str(&text);
                        return Ok(Some(text));
                    }
                }
                BlockDelta::InputJsonDelta { partial_json } => {
                    if let Some(PartialBlock::ToolUse { json, .. }) = self.blocks.get_mut(&index) {
                        json.push_str(&partial_json);
                    }
                }
                BlockDelta::Unknown => {}
            },
            StreamEvent::MessageDelta { delta } => {
                if delta.stop_reason.is_some() {
                    self.stop_reason = delta.stop_reason;
                }
            }
            StreamEvent::MessageStop {} => self.stopped = true,
            StreamEvent::Error { error } => {
                return Err(match error.kind.as_str() {
                    "rate_limit_error" => LLMError::RateLimitExceeded,
                    "authentication_error" => LLMError::AuthenticationFailed(error.message),
                    _ => LLMError::ProviderUnavailable(error.message),
                })
            }
            StreamEvent::MessageStart {}
            | StreamEvent::ContentBlockStop {}
            | StreamEvent::Ping {}
            | StreamEvent::Unknown => {}
        }

        Ok(None)
    }

    /// Assemble the reply. A stream that never reached `message_stop` was cut off.
    pub fn finish(self) -> Result<CompletionResponse> {
        if !self.stopped {
            return Err(LLMError::NetworkError(
                "stream ended before message_stop".to_string(),
            ));
        }

        let mut content = Vec::with_capacity(self.blocks.len());
        for block in self.blocks.into_values() {
            match block {
                PartialBlock::Text(text) => content.push(ContentBlock::Text { text }),
                PartialBlock::ToolUse { id, name, json } => {
                    let input = if json.trim().is_empty() {
                        serde_json::json!({})
                    } else {
                        serde_json::from_str(&json).map_err(|e| {
                            LLMError::ParseError(format!("tool input for '{}': {}", name, e))
                        })?
                    };
                    content.push(ContentBlock::ToolUse { id, name, input });
                }
            }
        }

        Ok(CompletionResponse {
            content,
            stop_reason: self.stop_reason.unwrap_or_default(),
        })
    }
}
