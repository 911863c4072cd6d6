//! Bounded multi-turn tool loop
//!
//! One call to [`ChatLoop::run`] handles one user message:
//!
//! 1. Send the history plus the tool registry to the completion service,
//!    streaming text to the caller as it arrives.
//! 2. A reply without tool calls ends the turn.
//! 3. Otherwise every tool call is executed for real, a start and a result
//!    event are emitted per call, and the results go back into the history.
//! 4. After `max_turns` completions one more completion is forced with
//!    tools disabled, so the turn always ends in natural language.
//!
//! A transport failure or a dropped event receiver aborts the turn; the
//! session history is rolled back to where the turn began.

use super::session::SessionStore;
use super::tools::ToolRegistry;
use crate::llm::{
    CompletionRequest, CompletionResponse, CompletionService, ContentBlock, Message, ToolChoice,
    ToolUse,
};
use crate::secrets::scrub_secrets;
use sdk::errors::EngineError;
use sdk::types::ChatEvent;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const SYSTEM_PROMPT: &str = "You are Arbor, the steward of a design-system component pipeline. \
Components move through the zones nursery, workshop, canopy and stable; archived components rest \
in the seed vault. Use the tools to inspect and change the pipeline and its ledgers. Never claim \
an action succeeded unless its tool result says so. Answer concisely.";

/// Text used when the model ends a turn without saying anything.
pub const EMPTY_REPLY_NOTICE: &str =
    "I stopped without a written answer. The tool results above show what was done.";

/// Buffered text deltas between the provider and the event forwarder.
const DELTA_BUFFER: usize = 64;

enum LoopState {
    AwaitingCompletion,
    ExecutingTools(Vec<ToolUse>),
    ForcingFinal,
    Done { reply: String, forced_final: bool },
    Aborted(EngineError),
}

/// What a finished turn produced.
#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    pub session_id: String,
    pub reply: String,
    pub turns: usize,
    pub forced_final: bool,
}

pub struct ChatLoop {
    service: Arc<dyn CompletionService>,
    tools: Arc<ToolRegistry>,
    sessions: SessionStore,
    max_turns: usize,
    preview_chars: usize,
}

impl ChatLoop {
    pub fn new(
        service: Arc<dyn CompletionService>,
        tools: Arc<ToolRegistry>,
        sessions: SessionStore,
        max_turns: usize,
        preview_chars: usize,
    ) -> Self {
        Self {
            service,
            tools,
            sessions,
            max_turns,
            preview_chars,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Run one user message to completion, emitting events as they happen.
    pub async fn run(
        &self,
        session_id: Option<&str>,
        message: &str,
        events: mpsc::Sender<ChatEvent>,
    ) -> Result<ChatOutcome, EngineError> {
        if message.trim().is_empty() {
            return Err(EngineError::Validation("message must not be empty".to_string()));
        }

        let handle = self.sessions.get_or_create(session_id).await;
        let mut session = handle.lock().await;
        session.touch();
        let session_id = session.id.clone();
        let checkpoint = session.history.len();
        session.history.push(Message::user(message));

        let mut turns = 0;
        let mut state = LoopState::AwaitingCompletion;
        loop {
            state = match state {
                LoopState::AwaitingCompletion if turns >= self.max_turns => {
                    warn!(
                        "Session {} reached {} turns, forcing a final answer",
                        session_id, self.max_turns
                    );
                    LoopState::ForcingFinal
                }
                LoopState::AwaitingCompletion => {
                    turns += 1;
                    debug!("Session {} turn {}/{}", session_id, turns, self.max_turns);
                    let request = self.request(&session.history, ToolChoice::Auto);
                    match self.stream_turn(&request, &events).await {
                        Ok(response) => {
                            let calls = response.tool_uses();
                            if calls.is_empty() {
                                let reply = self.final_reply(response.text(), &events).await;
                                match reply {
                                    Ok(reply) => {
                                        session.history.push(Message::assistant(reply.clone()));
                                        LoopState::Done {
                                            reply,
                                            forced_final: false,
                                        }
                                    }
                                    Err(e) => LoopState::Aborted(e),
                                }
                            } else {
                                session
                                    .history
                                    .push(Message::assistant_blocks(response.content));
                                LoopState::ExecutingTools(calls)
                            }
                        }
                        Err(e) => LoopState::Aborted(e),
                    }
                }
                LoopState::ExecutingTools(calls) => match self.execute(calls, &events).await {
                    Ok(results) => {
                        session.history.push(Message::tool_results(results));
                        LoopState::AwaitingCompletion
                    }
                    Err(e) => LoopState::Aborted(e),
                },
                LoopState::ForcingFinal => {
                    turns += 1;
                    let request = self.request(&session.history, ToolChoice::None);
                    let reply = match self.stream_turn(&request, &events).await {
                        Ok(response) => self.final_reply(response.text(), &events).await,
                        Err(e) => Err(e),
                    };
                    match reply {
                        Ok(reply) => {
                            session.history.push(Message::assistant(reply.clone()));
                            LoopState::Done {
                                reply,
                                forced_final: true,
                            }
                        }
                        Err(e) => LoopState::Aborted(e),
                    }
                }
                LoopState::Done {
                    reply,
                    forced_final,
                } => {
                    session.touch();
                    info!(
                        "Session {} turn finished after {} completions{}",
                        session_id,
                        turns,
                        if forced_final { " (forced final)" } else { "" }
                    );
                    // The caller may have stopped listening after the last token
                    let _ = events
                        .send(ChatEvent::Done {
                            session_id: session_id.clone(),
                            turns,
                            forced_final,
                        })
                        .await;
                    return Ok(ChatOutcome {
                        session_id,
                        reply,
                        turns,
                        forced_final,
                    });
                }
                LoopState::Aborted(error) => {
                    session.history.truncate(checkpoint);
                    warn!("Session {} turn aborted: {}", session_id, error);
                    let _ = events
                        .send(ChatEvent::Error {
                            message: scrub_secrets(&error.to_string()),
                        })
                        .await;
                    return Err(error);
                }
            };
        }
    }

    fn request(&self, history: &[Message], tool_choice: ToolChoice) -> CompletionRequest {
        CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            messages: history.to_vec(),
            tools: self.tools.schemas(),
            tool_choice,
            max_tokens: None,
        }
    }

    /// One streamed completion. Text deltas become token events.
    async fn stream_turn(
        &self,
        request: &CompletionRequest,
        events: &mpsc::Sender<ChatEvent>,
    ) -> Result<CompletionResponse, EngineError> {
        let (deltas, mut incoming) = mpsc::channel::<String>(DELTA_BUFFER);
        let forward = async move {
            while let Some(text) = incoming.recv().await {
                if events.send(ChatEvent::Token { text }).await.is_err() {
                    // Dropping `incoming` here makes the provider stop
                    return false;
                }
            }
            true
        };

        let (response, delivered) = tokio::join!(self.service.stream(request, deltas), forward);
        if !delivered {
            return Err(EngineError::Cancelled);
        }
        Ok(response?)
    }

    /// Replace a blank reply with the notice and stream it.
    async fn final_reply(
        &self,
        text: String,
        events: &mpsc::Sender<ChatEvent>,
    ) -> Result<String, EngineError> {
        if !text.trim().is_empty() {
            return Ok(text);
        }
        events
            .send(ChatEvent::Token {
                text: EMPTY_REPLY_NOTICE.to_string(),
            })
            .await
            .map_err(|_| EngineError::Cancelled)?;
        Ok(EMPTY_REPLY_NOTICE.to_string())
    }

    async fn execute(
        &self,
        calls: Vec<ToolUse>,
        events: &mpsc::Sender<ChatEvent>,
    ) -> Result<Vec<ContentBlock>, EngineError> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            events
                .send(ChatEvent::ToolStart {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: call.input.clone(),
                })
                .await
                .map_err(|_| EngineError::Cancelled)?;

            let (ok, content) = match self.tools.dispatch(&call.name, &call.input).await {
                Ok(value) => (true, value.to_string()),
                Err(e) => {
                    warn!("Tool {} failed: {}", call.name, e);
                    (false, format!("ERROR: {}", scrub_secrets(&e.to_string())))
                }
            };
            if ok && ToolRegistry::is_write(&call.name) {
                info!("Tool {} ({}) changed state", call.name, call.id);
            }

            events
                .send(ChatEvent::ToolResult {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    ok,
                    preview: preview(&content, self.preview_chars),
                })
                .await
                .map_err(|_| EngineError::Cancelled)?;

            results.push(ContentBlock::ToolResult {
                tool_use_id: call.id,
                content,
                is_error: !ok,
            });
        }
        Ok(results)
    }
}

/// First `limit` characters of `text`, marked when cut.
pub fn preview(text: &str, limit: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(limit).collect();
    if chars.next().is_some() {
        format!("{}…", head)
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_is_bounded_by_chars() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("abcdef", 3), "abc…");
        assert_eq!(preview("ééééé", 2).chars().count(), 3);
        assert_eq!(preview("", 5), "");
    }
}
