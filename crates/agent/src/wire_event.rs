//! Client-facing streaming events.
//!
//! `WireEvent` is the fixed vocabulary the gateway forwards over SSE. Each
//! backend-native event becomes exactly one of these, in backend order.
//! Every payload is a flat JSON object whose `type` equals the SSE event
//! name.

use agentgate_core::{
    Artifact, MemoryCandidate, MemoryEntry, TodoItem, TokenUsage, WorkspaceFile,
};
use serde::{Deserialize, Serialize};

/// Events emitted while a turn runs.
///
/// A stream always ends with exactly one of `done`, `interrupt` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WireEvent {
    /// The turn was admitted.
    Start {
        session_id: String,
        model: String,
        temperature: f32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_tokens: Option<u32>,
        extended_thinking: bool,
        resumed: bool,
    },

    /// Extended reasoning was requested; sent before any content.
    ThinkingStatus { status: String },

    ThinkingChunk { text: String },

    MessageChunk { text: String },

    ToolStart {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// Tool finished. `output` is a bounded preview.
    ToolEnd {
        id: String,
        name: String,
        output: String,
        truncated: bool,
    },

    /// The agent paused for a human decision. The stream closes after this
    /// event; a later turn carrying the resolution continues the work.
    Interrupt {
        session_id: String,
        tool: String,
        input: serde_json::Value,
        reason: String,
    },

    /// `usage` is the latest report, `total` the session's running totals.
    TokenUsage { usage: TokenUsage, total: TokenUsage },

    TodoUpdate { todos: Vec<TodoItem> },

    SubagentStart { name: String, task: String },

    SubagentProgress { name: String, message: String },

    SubagentEnd { name: String, output: String },

    MemorySaved {
        id: String,
        content: String,
        category: String,
    },

    MemorySearchResult {
        query: String,
        results: Vec<MemoryEntry>,
    },

    FilesUpdate { files: Vec<WorkspaceFile> },

    Done {
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thinking: Option<String>,
        artifacts: Vec<Artifact>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        memory: Option<MemoryCandidate>,
        files: Vec<WorkspaceFile>,
        usage: TokenUsage,
    },

    Error { message: String },
}

impl WireEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::ThinkingStatus { .. } => "thinking-status",
            Self::ThinkingChunk { .. } => "thinking-chunk",
            Self::MessageChunk { .. } => "message-chunk",
            Self::ToolStart { .. } => "tool-start",
            Self::ToolEnd { .. } => "tool-end",
            Self::Interrupt { .. } => "interrupt",
            Self::TokenUsage { .. } => "token-usage",
            Self::TodoUpdate { .. } => "todo-update",
            Self::SubagentStart { .. } => "subagent-start",
            Self::SubagentProgress { .. } => "subagent-progress",
            Self::SubagentEnd { .. } => "subagent-end",
            Self::MemorySaved { .. } => "memory-saved",
            Self::MemorySearchResult { .. } => "memory-search-result",
            Self::FilesUpdate { .. } => "files-update",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    /// Whether the stream closes after this event.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Done { .. } | Self::Error { .. } | Self::Interrupt { .. }
        )
    }
}

/// Cut tool output to at most `max_chars` characters.
pub fn preview(output: &str, max_chars: usize) -> (String, bool) {
    match output.char_indices().nth(max_chars) {
        Some((cut, _)) => (output[..cut].to_string(), true),
        None => (output.to_string(), false),
    }
}
