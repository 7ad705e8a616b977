//! Deterministic simulated backend.
//!
//! Drives offline mode and tests. A turn is planned from keywords in the
//! latest user message, so the same input always yields the same events:
//!
//! | keyword               | events                                            |
//! |-----------------------|---------------------------------------------------|
//! | `delete`, `sensitive` | a message, usage, then an `interrupt` (turn ends) |
//! | `todo`, `plan`        | `todos`                                           |
//! | `delegate`, `research`| sub-agent start / progress / end                  |
//! | `remember`            | `memory_save`                                     |
//! | `recall`              | `memory_search`                                   |
//! | `file`, `write`       | a `write_file` tool call and a workspace file     |
//! | `code`                | a fenced Python block in the reply                |
//!
//! Every turn ends with an echo of the message and a `usage` event.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use agentgate_core::backend::InterruptRequest;
use agentgate_core::error::BackendError;
use agentgate_core::message::last_user_content;
use agentgate_core::{
    AgentBackend, BackendConfig, BackendEvent, BackendEventStream, BackendReply, Message,
    Resolution, TodoItem, TodoStatus, TokenUsage, WorkspaceFile,
};
use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::debug;

/// Tool the simulated agent asks approval for.
pub const SIMULATED_SENSITIVE_TOOL: &str = "delete_file";

const GREETING_CODE: &str = "```python\ndef greet(name):\n    return f\"Hello, {name}!\"\n```";

pub struct SimulatedBackend {
    chunk_delay: Duration,
    script: Option<Vec<BackendEvent>>,
    files: Mutex<HashMap<String, Vec<WorkspaceFile>>>,
}

impl std::fmt::Debug for SimulatedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedBackend")
            .field("chunk_delay", &self.chunk_delay)
            .field("scripted", &self.script.is_some())
            .finish()
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self {
            chunk_delay: Duration::ZERO,
            script: None,
            files: Mutex::new(HashMap::new()),
        }
    }

    /// Replay exactly these events on every turn, ignoring the input.
    pub fn scripted(events: Vec<BackendEvent>) -> Self {
        Self {
            script: Some(events),
            ..Self::new()
        }
    }

    /// Pause between streamed events.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Seed the workspace of a session.
    pub fn with_files(self, session_id: &str, files: Vec<WorkspaceFile>) -> Self {
        self.lock_files().insert(session_id.to_string(), files);
        self
    }

    fn lock_files(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<WorkspaceFile>>> {
        self.files.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Write a file into a session's workspace, replacing one at the same path.
    fn write_file(&self, session_id: &str, path: &str, content: &str) {
        let mut files = self.lock_files();
        let workspace = files.entry(session_id.to_string()).or_default();
        if workspace.iter().any(|f| f.path == path && f.content == content) {
            return;
        }
        workspace.retain(|f| f.path != path);
        workspace.push(WorkspaceFile::new(path, content));
    }

    /// Plan the events of one turn. Workspace writes happen here.
    fn plan(&self, messages: &[Message], config: &BackendConfig) -> Vec<BackendEvent> {
        if let Some(script) = &self.script {
            return script.clone();
        }

        let prompt_words = messages
            .iter()
            .map(|m| m.content.split_whitespace().count() as u64)
            .sum::<u64>();

        let mut events = Vec::new();

        if config.extended_thinking {
            events.push(BackendEvent::ThinkingDelta {
                text: "Reading the request. ".into(),
            });
            events.push(BackendEvent::ThinkingDelta {
                text: "Choosing the tools to use.".into(),
            });
        }

        if let Some(resolution) = &config.resume {
            events.extend(resume_events(resolution));
            push_usage(&mut events, prompt_words);
            return events;
        }

        let message = last_user_content(messages).unwrap_or_default().to_string();
        let lowered = message.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| lowered.contains(w));

        if has(&["delete", "sensitive"]) {
            events.push(BackendEvent::MessageDelta {
                text: "This action needs your approval before I continue.".into(),
            });
            push_usage(&mut events, prompt_words);
            events.push(BackendEvent::Interrupt {
                tool: SIMULATED_SENSITIVE_TOOL.into(),
                input: json!({ "path": "workspace/old-report.md" }),
                reason: "Deleting files cannot be undone".into(),
            });
            return events;
        }

        if has(&["todo", "plan"]) {
            events.push(BackendEvent::Todos {
                todos: vec![
                    TodoItem::new("1", "Understand the request", TodoStatus::Completed),
                    TodoItem::new("2", "Draft a plan", TodoStatus::InProgress),
                    TodoItem::new("3", "Carry out the plan", TodoStatus::Pending),
                ],
            });
        }

        if has(&["delegate", "research"]) {
            let name = "research-agent".to_string();
            events.push(BackendEvent::SubagentStart {
                name: name.clone(),
                task: message.clone(),
            });
            events.push(BackendEvent::SubagentProgress {
                name: name.clone(),
                message: "Collecting sources".into(),
            });
            events.push(BackendEvent::SubagentEnd {
                name,
                output: format!("Findings for: {message}"),
            });
        }

        if has(&["remember"]) {
            events.push(BackendEvent::MemorySave {
                content: message.clone(),
                category: Some("preference".into()),
            });
        }

        if has(&["recall"]) {
            events.push(BackendEvent::MemorySearch {
                query: message.clone(),
                limit: None,
            });
        }

        if has(&["file", "write"]) {
            let path = "notes.md";
            let content = format!("# Notes\n\n{message}\n");
            events.push(BackendEvent::ToolStart {
                id: "call_write_1".into(),
                name: "write_file".into(),
                input: json!({ "path": path }),
            });
            self.write_file(&config.session_id, path, &content);
            events.push(BackendEvent::ToolEnd {
                id: "call_write_1".into(),
                name: "write_file".into(),
                output: format!("Wrote {} bytes to {path}", content.len()),
            });
        }

        let mut reply = format!("You said: {message}");
        if has(&["code"]) {
            reply.push_str("\n\nHere is an example:\n\n");
            reply.push_str(GREETING_CODE);
            reply.push('\n');
        }
        for word in reply.split_inclusive(' ') {
            events.push(BackendEvent::MessageDelta { text: word.into() });
        }

        push_usage(&mut events, prompt_words);
        events
    }
}

fn resume_events(resolution: &Resolution) -> Vec<BackendEvent> {
    if !resolution.is_resumed() {
        return vec![BackendEvent::MessageDelta {
            text: format!("Understood. I did not run {}.", resolution.tool),
        }];
    }

    let how = if resolution.edited_input.is_some() {
        "with your edits"
    } else {
        "as approved"
    };
    vec![
        BackendEvent::ToolStart {
            id: "call_resume_1".into(),
            name: resolution.tool.clone(),
            input: resolution.input.clone(),
        },
        BackendEvent::ToolEnd {
            id: "call_resume_1".into(),
            name: resolution.tool.clone(),
            output: format!("{} finished with input {}", resolution.tool, resolution.input),
        },
        BackendEvent::MessageDelta {
            text: format!("Done. I ran {} {how}.", resolution.tool),
        },
    ]
}

fn push_usage(events: &mut Vec<BackendEvent>, prompt_words: u64) {
    let output_words = events
        .iter()
        .map(|e| match e {
            BackendEvent::MessageDelta { text } | BackendEvent::ThinkingDelta { text } => {
                text.split_whitespace().count() as u64
            }
            _ => 0,
        })
        .sum();
    events.push(BackendEvent::Usage {
        usage: TokenUsage {
            input_tokens: prompt_words,
            output_tokens: output_words,
            ..TokenUsage::default()
        },
    });
}

#[async_trait]
impl AgentBackend for SimulatedBackend {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn invoke(
        &self,
        messages: Vec<Message>,
        config: BackendConfig,
    ) -> std::result::Result<BackendReply, BackendError> {
        let mut reply = BackendReply {
            content: String::new(),
            usage: None,
            interrupt: None,
        };

        for event in self.plan(&messages, &config) {
            match event {
                BackendEvent::MessageDelta { text } => reply.content.push_str(&text),
                BackendEvent::Usage { usage } => {
                    reply.usage.get_or_insert_with(TokenUsage::default).merge(&usage);
                }
                BackendEvent::Interrupt { tool, input, reason } => {
                    reply.interrupt = Some(InterruptRequest { tool, input, reason });
                    break;
                }
                _ => {}
            }
        }

        Ok(reply)
    }

    async fn stream_events(
        &self,
        messages: Vec<Message>,
        config: BackendConfig,
    ) -> std::result::Result<BackendEventStream, BackendError> {
        let events = self.plan(&messages, &config);
        let delay = self.chunk_delay;
        let (tx, rx) = mpsc::channel(64);

        debug!(session_id = %config.session_id, events = events.len(), "Simulated turn planned");

        tokio::spawn(async move {
            for event in events {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if tx.send(Ok(event)).await.is_err() {
                    return; // receiver dropped
                }
            }
        });

        Ok(rx)
    }

    async fn workspace_files(
        &self,
        session_id: &str,
    ) -> std::result::Result<Vec<WorkspaceFile>, BackendError> {
        Ok(self.lock_files().get(session_id).cloned().unwrap_or_default())
    }
}
