//! AgentBackend trait: the abstraction over agent runtimes.
//!
//! A backend knows how to run one turn of an agent, either returning the
//! final message or producing an ordered sequence of native events.
//!
//! Implementations: a deterministic simulated backend (tests / offline mode)
//! and a live backend that delegates to an external orchestration runtime.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::approval::Resolution;
use crate::error::BackendError;
use crate::message::Message;
use crate::session::{TodoItem, TokenUsage, WorkspaceFile};

/// Per-turn configuration passed to the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Thread id the backend keys its own checkpoint state by
    pub session_id: String,

    /// The model to use
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Whether extended reasoning was requested
    #[serde(default)]
    pub extended_thinking: bool,

    /// Decision that resumes a previously interrupted turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume: Option<Resolution>,
}

fn default_temperature() -> f32 {
    0.7
}

impl BackendConfig {
    pub fn new(session_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            model: model.into(),
            temperature: default_temperature(),
            max_tokens: None,
            extended_thinking: false,
            resume: None,
        }
    }
}

/// A native event produced by the backend while a turn runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendEvent {
    /// Reasoning text delta.
    ThinkingDelta { text: String },

    /// Response text delta.
    MessageDelta { text: String },

    /// A tool started running.
    ToolStart {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },

    /// A tool finished.
    ToolEnd {
        id: String,
        name: String,
        output: String,
    },

    /// The backend paused and needs a human decision.
    Interrupt {
        tool: String,
        #[serde(default)]
        input: serde_json::Value,
        reason: String,
    },

    /// Token counters for the work done so far.
    Usage { usage: TokenUsage },

    /// The complete current todo list.
    Todos { todos: Vec<TodoItem> },

    /// Work was delegated to a sub-agent.
    SubagentStart { name: String, task: String },

    /// A sub-agent reported progress.
    SubagentProgress { name: String, message: String },

    /// A sub-agent finished.
    SubagentEnd { name: String, output: String },

    /// The agent asked to store a long-term memory.
    MemorySave {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        category: Option<String>,
    },

    /// The agent asked to search long-term memory.
    MemorySearch {
        query: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
    },
}

/// The receiving half of a backend event stream.
pub type BackendEventStream = mpsc::Receiver<std::result::Result<BackendEvent, BackendError>>;

/// A pause request carried by a non-streaming reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptRequest {
    pub tool: String,
    #[serde(default)]
    pub input: serde_json::Value,
    pub reason: String,
}

/// A complete (non-streaming) reply from a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendReply {
    /// Final assistant text
    pub content: String,

    /// Token usage statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,

    /// Present when the turn paused for approval instead of finishing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupt: Option<InterruptRequest>,
}

/// The core AgentBackend trait.
///
/// The turn runner calls `invoke()` or `stream_events()` without knowing
/// which backend is in use.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// A human-readable name for this backend (e.g., "simulated", "live").
    fn name(&self) -> &str;

    /// Run a turn and return the final message.
    async fn invoke(
        &self,
        messages: Vec<Message>,
        config: BackendConfig,
    ) -> std::result::Result<BackendReply, BackendError>;

    /// Run a turn and stream its native events in order.
    ///
    /// Default implementation calls `invoke()` and replays the reply as events.
    async fn stream_events(
        &self,
        messages: Vec<Message>,
        config: BackendConfig,
    ) -> std::result::Result<BackendEventStream, BackendError> {
        let reply = self.invoke(messages, config).await?;
        let (tx, rx) = mpsc::channel(4);
        if !reply.content.is_empty() {
            let _ = tx
                .send(Ok(BackendEvent::MessageDelta {
                    text: reply.content,
                }))
                .await;
        }
        if let Some(usage) = reply.usage {
            let _ = tx.send(Ok(BackendEvent::Usage { usage })).await;
        }
        if let Some(interrupt) = reply.interrupt {
            let _ = tx
                .send(Ok(BackendEvent::Interrupt {
                    tool: interrupt.tool,
                    input: interrupt.input,
                    reason: interrupt.reason,
                }))
                .await;
        }
        Ok(rx)
    }

    /// Current workspace files the backend holds for a session.
    async fn workspace_files(
        &self,
        _session_id: &str,
    ) -> std::result::Result<Vec<WorkspaceFile>, BackendError> {
        Ok(Vec::new())
    }

    /// Health check: can we reach the backend?
    async fn health_check(&self) -> std::result::Result<bool, BackendError> {
        Ok(true)
    }
}
