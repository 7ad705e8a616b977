//! Per-session state visible to polling clients.
//!
//! A session accumulates the agent's todo list, the workspace files it
//! produced, sub-agent delegation results, and token counters. State is
//! written through [`SessionPatch`] so that a reader always observes a
//! value produced by one complete mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a single todo item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

/// One entry of the agent's todo list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    #[serde(alias = "content")]
    pub text: String,
    #[serde(default)]
    pub status: TodoStatus,
}

impl TodoItem {
    pub fn new(id: impl Into<String>, text: impl Into<String>, status: TodoStatus) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            status,
        }
    }
}

/// A file the agent wrote into its workspace.
///
/// Compared by value: two snapshots are equal only when every field matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceFile {
    pub id: String,
    pub name: String,
    pub path: String,
    pub content: String,
    pub size: u64,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
}

impl WorkspaceFile {
    /// Build a file record from a path and its content, inferring name, size and mime type.
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let path = path.into();
        let content = content.into();
        let name = path.rsplit('/').next().unwrap_or(&path).to_string();
        Self {
            id: Uuid::new_v4().to_string(),
            mime_type: mime_for(&name).to_string(),
            size: content.len() as u64,
            name,
            path,
            content,
            created_at: Utc::now(),
        }
    }
}

fn mime_for(name: &str) -> &'static str {
    let ext = name.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("md") => "text/markdown",
        Some("html" | "htm") => "text/html",
        Some("json") => "application/json",
        Some("js" | "mjs") => "text/javascript",
        Some("ts" | "tsx" | "jsx") => "text/plain",
        Some("py") => "text/x-python",
        Some("rs") => "text/x-rust",
        Some("csv") => "text/csv",
        Some("svg") => "image/svg+xml",
        Some("toml" | "yaml" | "yml" | "txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Output of one completed sub-agent delegation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubagentResult {
    pub subagent: String,
    pub output: String,
}

/// Token counters for a turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_tokens: u64,
    #[serde(default)]
    pub cache_write_tokens: u64,
}

impl TokenUsage {
    /// Add another usage report onto these counters.
    pub fn merge(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
        self.cache_write_tokens += other.cache_write_tokens;
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// The mutable state of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub todos: Vec<TodoItem>,
    pub files: Vec<WorkspaceFile>,
    pub subagent_results: Vec<SubagentResult>,
    pub usage: TokenUsage,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            todos: Vec::new(),
            files: Vec::new(),
            subagent_results: Vec::new(),
            usage: TokenUsage::default(),
            updated_at: Utc::now(),
        }
    }
}

/// A partial update. Only the provided fields replace the stored ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionPatch {
    pub todos: Option<Vec<TodoItem>>,
    pub files: Option<Vec<WorkspaceFile>>,
    pub subagent_results: Option<Vec<SubagentResult>>,
    pub usage: Option<TokenUsage>,
}

impl SessionPatch {
    /// Opens a turn: token counters and delegation results start over,
    /// so they describe the latest turn only. Todos and files stay until
    /// the turn replaces them.
    pub fn turn_start() -> Self {
        Self::default()
            .usage(TokenUsage::default())
            .subagent_results(Vec::new())
    }

    pub fn todos(mut self, todos: Vec<TodoItem>) -> Self {
        self.todos = Some(todos);
        self
    }

    pub fn files(mut self, files: Vec<WorkspaceFile>) -> Self {
        self.files = Some(files);
        self
    }

    pub fn subagent_results(mut self, results: Vec<SubagentResult>) -> Self {
        self.subagent_results = Some(results);
        self
    }

    pub fn usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.todos.is_none()
            && self.files.is_none()
            && self.subagent_results.is_none()
            && self.usage.is_none()
    }

    /// Apply this patch to a state, stamping `updated_at`.
    pub fn apply_to(self, state: &mut SessionState) {
        if let Some(todos) = self.todos {
            state.todos = todos;
        }
        if let Some(files) = self.files {
            state.files = files;
        }
        if let Some(results) = self.subagent_results {
            state.subagent_results = results;
        }
        if let Some(usage) = self.usage {
            state.usage = usage;
        }
        state.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_start_resets_per_turn_fields() {
        let mut state = SessionState::new("s1");
        state.todos = vec![TodoItem::new("1", "keep me", TodoStatus::Pending)];
        state.subagent_results = vec![SubagentResult {
            subagent: "research-agent".into(),
            output: "old findings".into(),
        }];
        state.usage = TokenUsage {
            input_tokens: 40,
            output_tokens: 2,
            ..TokenUsage::default()
        };

        SessionPatch::turn_start().apply_to(&mut state);
        assert!(state.subagent_results.is_empty());
        assert_eq!(state.usage, TokenUsage::default());
        assert_eq!(state.todos.len(), 1);
    }

    #[test]
    fn patch_replaces_only_provided_fields() {
        let mut state = SessionState::new("s1");
        state.todos = vec![TodoItem::new("1", "write tests", TodoStatus::Pending)];

        SessionPatch::default()
            .usage(TokenUsage {
                input_tokens: 5,
                ..TokenUsage::default()
            })
            .apply_to(&mut state);

        assert_eq!(state.todos.len(), 1);
        assert_eq!(state.usage.input_tokens, 5);
    }

    #[test]
    fn usage_merge_is_additive() {
        let mut usage = TokenUsage {
            input_tokens: 10,
            output_tokens: 3,
            cache_read_tokens: 1,
            cache_write_tokens: 0,
        };
        usage.merge(&TokenUsage {
            input_tokens: 2,
            output_tokens: 4,
            cache_read_tokens: 0,
            cache_write_tokens: 7,
        });
        assert_eq!(usage.input_tokens, 12);
        assert_eq!(usage.output_tokens, 7);
        assert_eq!(usage.cache_write_tokens, 7);
        assert_eq!(usage.total(), 19);
    }

    #[test]
    fn workspace_file_infers_metadata() {
        let file = WorkspaceFile::new("/notes/report.md", "# Report");
        assert_eq!(file.name, "report.md");
        assert_eq!(file.mime_type, "text/markdown");
        assert_eq!(file.size, 8);
    }

    #[test]
    fn todo_accepts_content_alias() {
        let todo: TodoItem =
            serde_json::from_str(r#"{"id":"t1","content":"plan","status":"in_progress"}"#).unwrap();
        assert_eq!(todo.text, "plan");
        assert_eq!(todo.status, TodoStatus::InProgress);
    }

    #[test]
    fn empty_patch_detected() {
        assert!(SessionPatch::default().is_empty());
        assert!(!SessionPatch::default().todos(vec![]).is_empty());
    }
}
