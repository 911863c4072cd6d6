//! Completion Service Abstraction Layer
//!
//! Every reviewer and the conversational tool loop talk to the external
//! completion service through the [`CompletionService`] trait. The message
//! model follows the block-structured shape of the Anthropic Messages API:
//! a message is a role plus a list of text, tool-use and tool-result blocks.
//!
//! The service is treated as an unreliable oracle. Transport failures are
//! reported as [`LLMError`] and never retried here; callers decide what an
//! unavailable service means for them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

pub mod anthropic;
pub mod sse;

/// Result type for completion operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur while talking to the completion service
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Stream receiver dropped")]
    Cancelled,
}

impl LLMError {
    /// Whether the failure means the service could not produce an answer at
    /// all, as opposed to producing one we could not read.
    pub fn is_unavailable(&self) -> bool {
        !matches!(self, LLMError::ParseError(_) | LLMError::Cancelled)
    }
}

impl From<LLMError> for sdk::errors::EngineError {
    fn from(err: LLMError) -> Self {
        use sdk::errors::EngineError;
        match err {
            LLMError::ParseError(msg) => EngineError::MalformedResponse(msg),
            LLMError::Cancelled => EngineError::Cancelled,
            other => EngineError::CompletionUnavailable(other.to_string()),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// One block of message content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }
}

/// A tool invocation requested by the service
#[derive(Debug, Clone, PartialEq)]
pub struct ToolUse {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// Message in a conversation history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: Vec<ContentBlock>,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: vec![ContentBlock::text(content)],
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: vec![ContentBlock::text(content)],
        }
    }

    /// Assistant turn carrying the blocks the service returned
    pub fn assistant_blocks(content: Vec<ContentBlock>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content,
        }
    }

    /// User turn carrying tool results for the preceding assistant turn
    pub fn tool_results(results: Vec<ContentBlock>) -> Self {
        Self {
            role: MessageRole::User,
            content: results,
        }
    }

    /// Concatenated text blocks
    pub fn text(&self) -> String {
        collect_text(&self.content)
    }
}

fn collect_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

/// Name, description and JSON input schema of one tool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// How the service may use the offered tools
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ToolChoice {
    #[default]
    Auto,
    /// Tools stay defined but must not be called
    None,
    /// The named tool must be called
    Tool(String),
}

/// One call to the completion service
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub system: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    pub tool_choice: ToolChoice,
    /// Overrides the provider's configured ceiling when set
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    #[default]
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    #[serde(other)]
    Other,
}

/// Assistant reply
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompletionResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
}

impl CompletionResponse {
    pub fn text(&self) -> String {
        collect_text(&self.content)
    }

    pub fn tool_uses(&self) -> Vec<ToolUse> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, name, input } => Some(ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Input of the first call to `tool`, if any
    pub fn tool_input(&self, tool: &str) -> Option<&serde_json::Value> {
        self.content.iter().find_map(|b| match b {
            ContentBlock::ToolUse { name, input, .. } if name == tool => Some(input),
            _ => None,
        })
    }
}

/// Completion service trait that every backend implements
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Returns the name of the provider (e.g., "anthropic")
    fn name(&self) -> &str;

    /// Request/response call
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse>;

    /// Streaming call. Text is forwarded through `deltas` as it arrives and
    /// the assembled reply is returned at the end.
    ///
    /// Returns `LLMError::Cancelled` if the receiver is dropped mid-stream.
    /// The default implementation completes and forwards the text at once.
    async fn stream(
        &self,
        request: &CompletionRequest,
        deltas: mpsc::Sender<String>,
    ) -> Result<CompletionResponse> {
        let response = self.complete(request).await?;
        let text = response.text();
        if !text.is_empty() && deltas.send(text).await.is_err() {
            return Err(LLMError::Cancelled);
        }
        Ok(response)
    }
}

/// Strip one optional markdown code fence around a payload.
///
/// A fence only counts at the start of a line, so backticks inside JSON
/// string values are left alone. Works even when there is prose before the
/// opening fence or after the closing one. Returns the input unchanged when
/// no fence is present.
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(fence_start) = line_fence(trimmed) else {
        return trimmed;
    };
    let after_opening = &trimmed[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let Some(newline) = after_opening.find('\n') else {
        return trimmed;
    };
    let body = &after_opening[newline + 1..];

    match line_fence(body) {
        Some(closing) => body[..closing].trim(),
        None => body.trim(),
    }
}

/// Byte offset of the first "```" that opens a line.
fn line_fence(text: &str) -> Option<usize> {
    if text.starts_with("```") {
        return Some(0);
    }
    text.find("\n```").map(|i| i + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_creation() {
        let user_msg = Message::user("Hello");
        assert_eq!(user_msg.role, MessageRole::User);
        assert_eq!(user_msg.text(), "Hello");

        let assistant_msg = Message::assistant("Hi there");
        assert_eq!(assistant_msg.role, MessageRole::Assistant);
    }

    #[test]
    fn test_content_block_wire_format() {
        let block = ContentBlock::ToolUse {
            id: "toolu_1".to_string(),
            name: "get_pipeline".to_string(),
            input: json!({}),
        };
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "tool_use");

        let result = ContentBlock::ToolResult {
            tool_use_id: "toolu_1".to_string(),
            content: "ok".to_string(),
            is_error: false,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["type"], "tool_result");
        assert!(json.get("is_error").is_none());
    }

    #[test]
    fn test_response_helpers() {
        let response = CompletionResponse {
            content: vec![
                ContentBlock::text("Looking. "),
                ContentBlock::ToolUse {
                    id: "a".to_string(),
                    name: "find_component".to_string(),
                    input: json!({"query": "Toggle"}),
                },
                ContentBlock::text("Done."),
            ],
            stop_reason: StopReason::ToolUse,
        };

        assert_eq!(response.text(), "Looking. Done.");
        assert_eq!(response.tool_uses().len(), 1);
        assert_eq!(
            response.tool_input("find_component").unwrap()["query"],
            "Toggle"
        );
        assert!(response.tool_input("submit_review").is_none());
    }

    #[test]
    fn test_unknown_stop_reason() {
        let reason: StopReason = serde_json::from_str("\"pause_turn\"").unwrap();
        assert_eq!(reason, StopReason::Other);
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(
            strip_code_fence("Here you go:\n```\n{\"a\":1}\n```\nThanks"),
            "{\"a\":1}"
        );
        assert_eq!(strip_code_fence("```json\n{\"a\":1}"), "{\"a\":1}");

        // Backticks inside a value are not a fence
        let inline = "{\n \"note\": \"use ``` blocks\"\n}";
        assert_eq!(strip_code_fence(inline), inline);
    }

    #[test]
    fn test_unavailable_classification() {
        assert!(LLMError::Timeout.is_unavailable());
        assert!(LLMError::RateLimitExceeded.is_unavailable());
        assert!(!LLMError::ParseError("x".to_string()).is_unavailable());
    }
}
