//! Turn execution: one user message in, a stream of wire events out.
//!
//! A streaming turn moves through
//! `Started -> (Thinking) -> Streaming -> {Interrupted | Completed | Failed}`:
//!
//! 1. Admission via the session hub (single-flight, pending-approval check)
//! 2. `start`, then the composed system prompt goes to the backend
//! 3. Each backend event becomes exactly one wire event, in backend order
//! 4. Workspace files are reconciled against the last snapshot
//! 5. On completion, artifacts and a memory candidate are extracted and
//!    `done` closes the stream
//!
//! An interrupt parks the action in the approval gate and closes the stream
//! without `done`. A later turn carrying the resolution resumes it.

use std::sync::Arc;
use std::time::Duration;

use agentgate_config::AppConfig;
use agentgate_core::error::{BackendError, SessionError};
use agentgate_core::{
    AgentBackend, Artifact, ArtifactStore, BackendConfig, BackendEvent, BackendReply,
    MemoryCandidate, MemoryStore, Message, PendingApproval, Resolution, SessionId, SessionPatch,
    SubagentResult, TokenUsage, WorkspaceFile,
};
use agentgate_extract::{detect_memory, extract_artifacts};
use agentgate_session::SessionHub;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::composer::ContextComposer;
use crate::fallback::{fallback_reply, word_chunks};
use crate::wire_event::{preview, WireEvent};

/// Per-turn defaults drawn from config.
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub tool_output_preview_chars: usize,
    pub fallback_word_delay: Duration,
    pub auto_extract: bool,
    pub search_limit: usize,
}

impl TurnSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.default_model.clone(),
            temperature: config.default_temperature,
            max_tokens: Some(config.default_max_tokens),
            tool_output_preview_chars: config.streaming.tool_output_preview_chars,
            fallback_word_delay: Duration::from_millis(config.streaming.fallback_word_delay_ms),
            auto_extract: config.memory.auto_extract,
            search_limit: config.memory.search_limit,
        }
    }
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// A request to run one turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnRequest {
    #[serde(default)]
    pub message: String,

    /// Generated when absent or blank.
    #[serde(default, alias = "thread_id")]
    pub session_id: Option<String>,

    #[serde(default)]
    pub project_id: Option<String>,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default)]
    pub max_tokens: Option<u32>,

    #[serde(default)]
    pub extended_thinking: bool,

    /// Marks the turn as continuing a decided approval. The resolution
    /// that reaches the backend is the one held by the approval gate; the
    /// contents sent here are not trusted.
    #[serde(default)]
    pub resume: Option<Resolution>,
}

impl TurnRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_thinking(mut self, enabled: bool) -> Self {
        self.extended_thinking = enabled;
        self
    }

    pub fn with_resume(mut self, resolution: Resolution) -> Self {
        self.resume = Some(resolution);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Completed,
    Interrupted,
    Error,
}

/// Outcome of a synchronous turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResult {
    pub session_id: String,
    pub response: String,
    pub status: TurnStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub artifacts: Vec<Artifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupt: Option<PendingApproval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryCandidate>,
    pub usage: TokenUsage,
}

impl TurnResult {
    fn new(session_id: &str, response: String, status: TurnStatus) -> Self {
        Self {
            session_id: session_id.to_string(),
            response,
            status,
            error: None,
            artifacts: Vec::new(),
            interrupt: None,
            memory: None,
            usage: TokenUsage::default(),
        }
    }
}

/// Why a streaming turn stopped early.
enum TurnAbort {
    /// The client went away.
    Closed,
    /// Terminal failure, reported as an `error` event.
    Failed(String),
}

impl From<BackendError> for TurnAbort {
    fn from(e: BackendError) -> Self {
        Self::Failed(e.to_string())
    }
}

/// Text accumulated over one turn.
#[derive(Default)]
struct TurnText {
    response: String,
    thinking: String,
}

async fn emit(tx: &mpsc::Sender<WireEvent>, event: WireEvent) -> Result<(), TurnAbort> {
    tx.send(event).await.map_err(|_| TurnAbort::Closed)
}

/// Runs turns against the configured backend and session hub.
pub struct TurnRunner {
    backend: Arc<dyn AgentBackend>,
    sessions: Arc<SessionHub>,
    composer: ContextComposer,
    artifacts: Option<Arc<dyn ArtifactStore>>,
    memories: Option<Arc<dyn MemoryStore>>,
    settings: TurnSettings,
}

impl TurnRunner {
    pub fn new(
        backend: Arc<dyn AgentBackend>,
        sessions: Arc<SessionHub>,
        settings: TurnSettings,
    ) -> Self {
        Self {
            backend,
            sessions,
            composer: ContextComposer::new(""),
            artifacts: None,
            memories: None,
            settings,
        }
    }

    pub fn with_composer(mut self, composer: ContextComposer) -> Self {
        self.composer = composer;
        self
    }

    pub fn with_artifact_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.artifacts = Some(store);
        self
    }

    pub fn with_memory_store(mut self, store: Arc<dyn MemoryStore>) -> Self {
        self.memories = Some(store);
        self
    }

    pub fn sessions(&self) -> &Arc<SessionHub> {
        &self.sessions
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn settings(&self) -> &TurnSettings {
        &self.settings
    }

    /// Admit a streaming turn and start it in the background.
    ///
    /// Returns the effective session id and the event receiver. Dropping
    /// the receiver cancels the turn at its next event; session writes
    /// already applied stay.
    pub fn run_stream(
        self: &Arc<Self>,
        mut request: TurnRequest,
    ) -> Result<(String, mpsc::Receiver<WireEvent>), SessionError> {
        let session_id = SessionId::or_generate(request.session_id.as_deref()).0;
        let admission = self
            .sessions
            .begin_turn(&session_id, request.resume.is_some())?;
        let permit = admission.permit;
        request.resume = admission.resume;

        let (tx, rx) = mpsc::channel::<WireEvent>(128);
        let runner = Arc::clone(self);
        let sid = session_id.clone();

        tokio::spawn(async move {
            let outcome = runner.drive(&sid, request, &tx).await;
            // Release the session before the receiver observes end of stream.
            drop(permit);
            match outcome {
                Ok(()) => {}
                Err(TurnAbort::Closed) => {
                    debug!(session_id = %sid, "Client disconnected, turn cancelled");
                }
                Err(TurnAbort::Failed(message)) => {
                    error!(session_id = %sid, error = %message, "Turn failed");
                    let _ = tx.send(WireEvent::Error { message }).await;
                }
            }
        });

        Ok((session_id, rx))
    }

    async fn drive(
        &self,
        session_id: &str,
        request: TurnRequest,
        tx: &mpsc::Sender<WireEvent>,
    ) -> Result<(), TurnAbort> {
        let config = self.backend_config(session_id, &request);
        let thinking_requested = config.extended_thinking;

        info!(
            session_id,
            model = %config.model,
            resumed = config.resume.is_some(),
            "Turn started"
        );
        emit(
            tx,
            WireEvent::Start {
                session_id: session_id.to_string(),
                model: config.model.clone(),
                temperature: config.temperature,
                max_tokens: config.max_tokens,
                extended_thinking: thinking_requested,
                resumed: config.resume.is_some(),
            },
        )
        .await?;

        self.sessions.merge_patch(session_id, SessionPatch::turn_start());
        let messages = self.compose_messages(&request).await;

        if thinking_requested {
            emit(
                tx,
                WireEvent::ThinkingStatus {
                    status: "thinking".into(),
                },
            )
            .await?;
        }

        let mut text = TurnText::default();

        match self.backend.stream_events(messages, config).await {
            Ok(mut events) => {
                while let Some(item) = events.recv().await {
                    let event = item?;
                    if let Some(interrupt) = self.forward(session_id, event, &mut text, tx).await? {
                        // stop pulling; the backend resumes on a later turn
                        drop(events);
                        self.reconcile_files(session_id, tx).await?;
                        info!(session_id, "Turn interrupted for approval");
                        return emit(tx, interrupt).await;
                    }
                }
            }
            Err(BackendError::NotConfigured(reason)) => {
                warn!(session_id, %reason, "Agent backend unavailable, streaming fallback reply");
                self.stream_fallback(&request.message, &reason, &mut text, tx)
                    .await?;
            }
            Err(e) => return Err(e.into()),
        }

        let files = self.reconcile_files(session_id, tx).await?;
        let (artifacts, memory) = self.post_process(session_id, &text.response).await;
        let usage = self
            .sessions
            .get(session_id)
            .map(|s| s.usage)
            .unwrap_or_default();

        info!(
            session_id,
            chars = text.response.len(),
            artifacts = artifacts.len(),
            "Turn completed"
        );
        emit(
            tx,
            WireEvent::Done {
                session_id: session_id.to_string(),
                thinking: thinking_requested.then_some(text.thinking),
                artifacts,
                memory,
                files,
                usage,
            },
        )
        .await
    }

    /// Translate one backend event. Returns the `interrupt` event to close
    /// the stream with when the backend paused.
    async fn forward(
        &self,
        session_id: &str,
        event: BackendEvent,
        text: &mut TurnText,
        tx: &mpsc::Sender<WireEvent>,
    ) -> Result<Option<WireEvent>, TurnAbort> {
        let wire = match event {
            BackendEvent::ThinkingDelta { text: delta } => {
                text.thinking.push_str(&delta);
                WireEvent::ThinkingChunk { text: delta }
            }
            BackendEvent::MessageDelta { text: delta } => {
                text.response.push_str(&delta);
                WireEvent::MessageChunk { text: delta }
            }
            BackendEvent::ToolStart { id, name, input } => {
                debug!(session_id, tool = %name, "Tool started");
                WireEvent::ToolStart { id, name, input }
            }
            BackendEvent::ToolEnd { id, name, output } => {
                let (output, truncated) =
                    preview(&output, self.settings.tool_output_preview_chars);
                WireEvent::ToolEnd {
                    id,
                    name,
                    output,
                    truncated,
                }
            }
            BackendEvent::Interrupt {
                tool,
                input,
                reason,
            } => {
                self.sessions
                    .approvals
                    .request_approval(session_id, &tool, input.clone(), &reason);
                return Ok(Some(WireEvent::Interrupt {
                    session_id: session_id.to_string(),
                    tool,
                    input,
                    reason,
                }));
            }
            BackendEvent::Usage { usage } => {
                let total = self.record_usage(session_id, &usage);
                WireEvent::TokenUsage { usage, total }
            }
            BackendEvent::Todos { todos } => {
                self.sessions
                    .merge_patch(session_id, SessionPatch::default().todos(todos.clone()));
                WireEvent::TodoUpdate { todos }
            }
            BackendEvent::SubagentStart { name, task } => WireEvent::SubagentStart { name, task },
            BackendEvent::SubagentProgress { name, message } => {
                WireEvent::SubagentProgress { name, message }
            }
            BackendEvent::SubagentEnd { name, output } => {
                let mut results = self
                    .sessions
                    .get(session_id)
                    .map(|s| s.subagent_results)
                    .unwrap_or_default();
                results.push(SubagentResult {
                    subagent: name.clone(),
                    output: output.clone(),
                });
                self.sessions
                    .merge_patch(session_id, SessionPatch::default().subagent_results(results));
                WireEvent::SubagentEnd { name, output }
            }
            BackendEvent::MemorySave { content, category } => {
                match self.save_requested_memory(session_id, content, category).await {
                    Some(wire) => wire,
                    None => return Ok(None),
                }
            }
            BackendEvent::MemorySearch { query, limit } => {
                match self.search_memories(query, limit).await {
                    Some(wire) => wire,
                    None => return Ok(None),
                }
            }
        };

        emit(tx, wire).await?;
        Ok(None)
    }

    async fn save_requested_memory(
        &self,
        session_id: &str,
        content: String,
        category: Option<String>,
    ) -> Option<WireEvent> {
        let Some(store) = &self.memories else {
            debug!(session_id, "No memory store, dropping memory-save");
            return None;
        };

        let mut candidate = MemoryCandidate::new(content).with_source(session_id);
        if let Some(category) = category.filter(|c| !c.trim().is_empty()) {
            candidate = candidate.with_category(category);
        }

        match store.save_memory(&candidate).await {
            Ok(record) => Some(WireEvent::MemorySaved {
                id: record.id,
                content: candidate.content,
                category: candidate.category,
            }),
            Err(e) => {
                warn!(session_id, error = %e, "Memory save failed");
                None
            }
        }
    }

    async fn search_memories(&self, query: String, limit: Option<usize>) -> Option<WireEvent> {
        let store = self.memories.as_ref()?;
        let limit = limit.unwrap_or(self.settings.search_limit);
        match store.search(&query, limit).await {
            Ok(results) => Some(WireEvent::MemorySearchResult { query, results }),
            Err(e) => {
                warn!(error = %e, "Memory search failed");
                None
            }
        }
    }

    async fn stream_fallback(
        &self,
        user_message: &str,
        reason: &str,
        text: &mut TurnText,
        tx: &mpsc::Sender<WireEvent>,
    ) -> Result<(), TurnAbort> {
        let reply = fallback_reply(user_message, reason);
        let delay = self.settings.fallback_word_delay;

        for chunk in word_chunks(&reply) {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            text.response.push_str(&chunk);
            emit(tx, WireEvent::MessageChunk { text: chunk }).await?;
        }
        Ok(())
    }

    /// Run a turn to completion and return a single result.
    pub async fn invoke(&self, mut request: TurnRequest) -> Result<TurnResult, SessionError> {
        let session_id = SessionId::or_generate(request.session_id.as_deref()).0;
        let admission = self
            .sessions
            .begin_turn(&session_id, request.resume.is_some())?;
        let _permit = admission.permit;
        request.resume = admission.resume;
        let session_id = session_id.as_str();

        let config = self.backend_config(session_id, &request);
        self.sessions.merge_patch(session_id, SessionPatch::turn_start());
        let messages = self.compose_messages(&request).await;

        let reply = match self.backend.invoke(messages, config).await {
            Ok(reply) => reply,
            Err(BackendError::NotConfigured(reason)) => {
                warn!(session_id, %reason, "Agent backend unavailable, using fallback reply");
                BackendReply {
                    content: fallback_reply(&request.message, &reason),
                    usage: None,
                    interrupt: None,
                }
            }
            Err(e) => {
                error!(session_id, error = %e, "Synchronous turn failed");
                let mut result = TurnResult::new(session_id, String::new(), TurnStatus::Error);
                result.error = Some(e.to_string());
                return Ok(result);
            }
        };

        if let Some(usage) = &reply.usage {
            self.record_usage(session_id, usage);
        }

        if let Some(interrupt) = reply.interrupt {
            let pending = self.sessions.approvals.request_approval(
                session_id,
                &interrupt.tool,
                interrupt.input,
                &interrupt.reason,
            );
            // files may have changed before the pause
            self.sync_files(session_id).await;
            let mut result = TurnResult::new(session_id, reply.content, TurnStatus::Interrupted);
            result.interrupt = Some(pending);
            result.usage = self.session_usage(session_id);
            return Ok(result);
        }

        self.sync_files(session_id).await;
        let (artifacts, memory) = self.post_process(session_id, &reply.content).await;

        let mut result = TurnResult::new(session_id, reply.content, TurnStatus::Completed);
        result.artifacts = artifacts;
        result.memory = memory;
        result.usage = self.session_usage(session_id);
        Ok(result)
    }

    fn backend_config(&self, session_id: &str, request: &TurnRequest) -> BackendConfig {
        let model = request
            .model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.settings.model.clone());

        let mut config = BackendConfig::new(session_id, model);
        config.temperature = request.temperature.unwrap_or(self.settings.temperature);
        config.max_tokens = request.max_tokens.or(self.settings.max_tokens);
        config.extended_thinking = request.extended_thinking;
        config.resume = request.resume.clone();
        config
    }

    async fn compose_messages(&self, request: &TurnRequest) -> Vec<Message> {
        let system = self.composer.compose(request.project_id.as_deref()).await;
        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(Message::system(system));
        }
        if !request.message.trim().is_empty() {
            messages.push(Message::user(request.message.clone()));
        }
        messages
    }

    /// Merge a usage report into the session and return the running totals.
    fn record_usage(&self, session_id: &str, usage: &TokenUsage) -> TokenUsage {
        let mut total = self.session_usage(session_id);
        total.merge(usage);
        self.sessions
            .merge_patch(session_id, SessionPatch::default().usage(total));
        total
    }

    fn session_usage(&self, session_id: &str) -> TokenUsage {
        self.sessions
            .get(session_id)
            .map(|s| s.usage)
            .unwrap_or_default()
    }

    /// Compare the backend's workspace against the stored snapshot by value
    /// and replace the snapshot on change. Returns the current files and
    /// whether they changed. An unreachable workspace keeps the snapshot.
    async fn sync_files(&self, session_id: &str) -> (Vec<WorkspaceFile>, bool) {
        let previous = self
            .sessions
            .get(session_id)
            .map(|s| s.files)
            .unwrap_or_default();

        let current = match self.backend.workspace_files(session_id).await {
            Ok(files) => files,
            Err(e) => {
                warn!(session_id, error = %e, "Workspace files unavailable");
                return (previous, false);
            }
        };

        if current == previous {
            return (previous, false);
        }

        debug!(session_id, files = current.len(), "Workspace files changed");
        self.sessions
            .merge_patch(session_id, SessionPatch::default().files(current.clone()));
        (current, true)
    }

    /// [`sync_files`](Self::sync_files), announcing a change as `files-update`.
    async fn reconcile_files(
        &self,
        session_id: &str,
        tx: &mpsc::Sender<WireEvent>,
    ) -> Result<Vec<WorkspaceFile>, TurnAbort> {
        let (files, changed) = self.sync_files(session_id).await;
        if changed {
            emit(
                tx,
                WireEvent::FilesUpdate {
                    files: files.clone(),
                },
            )
            .await?;
        }
        Ok(files)
    }

    /// Extract artifacts and a memory candidate, persisting each
    /// independently. Persistence failures are logged only.
    async fn post_process(
        &self,
        session_id: &str,
        response: &str,
    ) -> (Vec<Artifact>, Option<MemoryCandidate>) {
        let artifacts = extract_artifacts(response);
        if let Some(store) = &self.artifacts {
            for artifact in &artifacts {
                if let Err(e) = store.save_artifact(session_id, artifact).await {
                    warn!(session_id, title = %artifact.title, error = %e, "Artifact save failed");
                }
            }
        }

        let memory = if self.settings.auto_extract {
            detect_memory(response, Some(session_id))
        } else {
            None
        };
        if let (Some(candidate), Some(store)) = (&memory, &self.memories) {
            if let Err(e) = store.save_memory(candidate).await {
                warn!(session_id, error = %e, "Memory save failed");
            }
        }

        (artifacts, memory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentgate_backends::SimulatedBackend;
    use agentgate_core::error::StoreError;
    use agentgate_core::{BackendEventStream, MemoryEntry, StoredRecord};
    use agentgate_memory::InMemoryStore;
    use agentgate_session::RetentionPolicy;
    use async_trait::async_trait;
    use serde_json::json;

    fn settings() -> TurnSettings {
        TurnSettings {
            fallback_word_delay: Duration::ZERO,
            ..TurnSettings::default()
        }
    }

    fn runner(backend: impl AgentBackend + 'static) -> Arc<TurnRunner> {
        Arc::new(TurnRunner::new(
            Arc::new(backend),
            Arc::new(SessionHub::new(RetentionPolicy::default())),
            settings(),
        ))
    }

    async fn collect(mut rx: mpsc::Receiver<WireEvent>) -> Vec<WireEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn types(events: &[WireEvent]) -> Vec<&'static str> {
        events.iter().map(|e| e.event_type()).collect()
    }

    struct Unconfigured;

    #[async_trait]
    impl AgentBackend for Unconfigured {
        fn name(&self) -> &str {
            "unconfigured"
        }

        async fn invoke(
            &self,
            _messages: Vec<Message>,
            _config: BackendConfig,
        ) -> Result<BackendReply, BackendError> {
            Err(BackendError::NotConfigured("missing API key".into()))
        }
    }

    struct BreaksMidStream;

    #[async_trait]
    impl AgentBackend for BreaksMidStream {
        fn name(&self) -> &str {
            "breaks"
        }

        async fn invoke(
            &self,
            _messages: Vec<Message>,
            _config: BackendConfig,
        ) -> Result<BackendReply, BackendError> {
            Err(BackendError::Network("connection reset".into()))
        }

        async fn stream_events(
            &self,
            _messages: Vec<Message>,
            _config: BackendConfig,
        ) -> Result<BackendEventStream, BackendError> {
            let (tx, rx) = mpsc::channel(4);
            tx.send(Ok(BackendEvent::MessageDelta { text: "partial".into() }))
                .await
                .unwrap();
            tx.send(Err(BackendError::StreamInterrupted("eof".into())))
                .await
                .unwrap();
            Ok(rx)
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl MemoryStore for BrokenStore {
        fn name(&self) -> &str {
            "broken"
        }

        async fn save_memory(&self, _: &MemoryCandidate) -> Result<StoredRecord, StoreError> {
            Err(StoreError::Storage("disk full".into()))
        }

        async fn search(&self, _: &str, _: usize) -> Result<Vec<MemoryEntry>, StoreError> {
            Err(StoreError::Query("timeout".into()))
        }
    }

    #[tokio::test]
    async fn completed_turn_ends_with_done() {
        let runner = runner(SimulatedBackend::new());
        let (session_id, rx) = runner
            .run_stream(TurnRequest::new("show me some code").with_session("s1"))
            .unwrap();
        assert_eq!(session_id, "s1");

        let events = collect(rx).await;
        let kinds = types(&events);
        assert_eq!(kinds.first(), Some(&"start"));
        assert_eq!(kinds.last(), Some(&"done"));
        assert!(kinds.contains(&"message-chunk"));
        assert!(kinds.contains(&"token-usage"));

        let WireEvent::Done { artifacts, thinking, usage, .. } = events.last().unwrap() else {
            panic!("expected done");
        };
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].language, "py");
        assert_eq!(artifacts[0].title, "greet");
        assert!(thinking.is_none());
        assert!(usage.output_tokens > 0);
        assert!(!runner.sessions().turns.is_active("s1"));
    }

    #[tokio::test]
    async fn thinking_status_precedes_content() {
        let runner = runner(SimulatedBackend::new());
        let (_, rx) = runner
            .run_stream(TurnRequest::new("hello").with_thinking(true))
            .unwrap();
        let events = collect(rx).await;
        let kinds = types(&events);

        assert_eq!(kinds[1], "thinking-status");
        let first_message = kinds.iter().position(|k| *k == "message-chunk").unwrap();
        let first_thought = kinds.iter().position(|k| *k == "thinking-chunk").unwrap();
        assert!(first_thought < first_message);

        let WireEvent::Done { thinking, .. } = events.last().unwrap() else {
            panic!("expected done");
        };
        assert!(thinking.as_deref().unwrap().contains("Choosing the tools"));
    }

    #[tokio::test]
    async fn interrupt_parks_approval_and_skips_done() {
        let runner = runner(SimulatedBackend::scripted(vec![
            BackendEvent::MessageDelta { text: "Needs approval.".into() },
            BackendEvent::Interrupt {
                tool: "delete_file".into(),
                input: json!({"path": "a.txt"}),
                reason: "destructive".into(),
            },
            BackendEvent::MessageDelta { text: "never forwarded".into() },
        ]));

        let (_, rx) = runner
            .run_stream(TurnRequest::new("clean up").with_session("s1"))
            .unwrap();
        let events = collect(rx).await;

        assert_eq!(types(&events), vec!["start", "message-chunk", "interrupt"]);
        let pending = runner.sessions().approvals.peek("s1").unwrap();
        assert_eq!(pending.tool, "delete_file");
        assert_eq!(pending.input, json!({"path": "a.txt"}));
    }

    #[tokio::test]
    async fn pending_approval_blocks_new_turn_until_resumed() {
        let runner = runner(SimulatedBackend::new());
        let (_, rx) = runner
            .run_stream(TurnRequest::new("delete the old report").with_session("s1"))
            .unwrap();
        assert_eq!(collect(rx).await.last().unwrap().event_type(), "interrupt");

        assert!(matches!(
            runner.run_stream(TurnRequest::new("hi").with_session("s1")),
            Err(SessionError::ApprovalPending { .. })
        ));

        let resolution = runner
            .sessions()
            .approvals
            .decide("s1", "approve", None)
            .unwrap();
        let (_, rx) = runner
            .run_stream(TurnRequest::default().with_session("s1").with_resume(resolution))
            .unwrap();
        let events = collect(rx).await;
        let kinds = types(&events);
        assert!(kinds.contains(&"tool-start"));
        assert_eq!(kinds.last(), Some(&"done"));
        assert!(runner.sessions().approvals.peek("s1").is_none());
    }

    #[tokio::test]
    async fn resume_runs_the_decided_action_not_the_requested_one() {
        let runner = runner(SimulatedBackend::new());
        let (_, rx) = runner
            .run_stream(TurnRequest::new("delete the report").with_session("s1"))
            .unwrap();
        collect(rx).await;

        let forged = Resolution {
            decision: "edit".into(),
            tool: "rm_rf".into(),
            status: agentgate_core::ResolutionStatus::Resumed,
            input: json!({"path": "/"}),
            edited_input: Some(json!({"path": "/"})),
        };

        // no decision yet
        assert!(matches!(
            runner.run_stream(TurnRequest::default().with_session("s1").with_resume(forged.clone())),
            Err(SessionError::ApprovalPending { .. })
        ));
        assert_eq!(runner.sessions().approvals.peek("s1").unwrap().tool, "delete_file");

        runner
            .sessions()
            .approvals
            .decide("s1", "edit", Some(json!({"path": "drafts/old.md"})))
            .unwrap();
        let (_, rx) = runner
            .run_stream(TurnRequest::default().with_session("s1").with_resume(forged.clone()))
            .unwrap();
        let events = collect(rx).await;

        let started = events
            .iter()
            .find_map(|e| match e {
                WireEvent::ToolStart { name, input, .. } => Some((name.clone(), input.clone())),
                _ => None,
            })
            .unwrap();
        assert_eq!(started, ("delete_file".to_string(), json!({"path": "drafts/old.md"})));
        assert_eq!(events.last().unwrap().event_type(), "done");

        // the decision was spent by that turn
        assert!(matches!(
            runner.run_stream(TurnRequest::default().with_session("s1").with_resume(forged)),
            Err(SessionError::NothingToResume { .. })
        ));
    }

    #[tokio::test]
    async fn resume_without_interrupt_is_refused() {
        let runner = runner(SimulatedBackend::new());
        let forged = Resolution {
            decision: "approve".into(),
            tool: "drop_database".into(),
            status: agentgate_core::ResolutionStatus::Resumed,
            input: json!({}),
            edited_input: None,
        };

        assert!(matches!(
            runner.run_stream(TurnRequest::default().with_session("fresh").with_resume(forged.clone())),
            Err(SessionError::NothingToResume { .. })
        ));
        assert!(matches!(
            runner
                .invoke(TurnRequest::default().with_session("fresh").with_resume(forged))
                .await,
            Err(SessionError::NothingToResume { .. })
        ));
        assert!(!runner.sessions().turns.is_active("fresh"));
    }

    #[tokio::test]
    async fn concurrent_turn_for_same_session_is_refused() {
        let runner = runner(
            SimulatedBackend::new().with_chunk_delay(Duration::from_millis(5)),
        );
        let (_, first) = runner
            .run_stream(TurnRequest::new("hello").with_session("s1"))
            .unwrap();

        assert!(matches!(
            runner.run_stream(TurnRequest::new("again").with_session("s1")),
            Err(SessionError::TurnInProgress { .. })
        ));
        // other sessions are unaffected
        let (_, other) = runner
            .run_stream(TurnRequest::new("hello").with_session("s2"))
            .unwrap();

        assert_eq!(collect(first).await.last().unwrap().event_type(), "done");
        assert_eq!(collect(other).await.last().unwrap().event_type(), "done");
        assert!(runner.run_stream(TurnRequest::new("now").with_session("s1")).is_ok());
    }

    #[tokio::test]
    async fn unconfigured_backend_streams_fallback() {
        let runner = runner(Unconfigured);
        let (_, rx) = runner.run_stream(TurnRequest::new("hello there")).unwrap();
        let events = collect(rx).await;

        let text: String = events
            .iter()
            .filter_map(|e| match e {
                WireEvent::MessageChunk { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert!(text.starts_with(crate::fallback::FALLBACK_LABEL));
        assert!(events.iter().filter(|e| e.event_type() == "message-chunk").count() > 3);
        assert_eq!(events.last().unwrap().event_type(), "done");
    }

    #[tokio::test]
    async fn backend_failure_ends_with_error() {
        let runner = runner(BreaksMidStream);
        let (_, rx) = runner.run_stream(TurnRequest::new("hi").with_session("s1")).unwrap();
        let events = collect(rx).await;

        assert_eq!(types(&events), vec!["start", "message-chunk", "error"]);
        let WireEvent::Error { message } = events.last().unwrap() else {
            panic!("expected error");
        };
        assert!(message.contains("eof"));
        assert!(!runner.sessions().turns.is_active("s1"));
    }

    #[tokio::test]
    async fn tool_output_is_previewed() {
        let long_output = "x".repeat(2_000);
        let runner = runner(SimulatedBackend::scripted(vec![
            BackendEvent::ToolStart {
                id: "t1".into(),
                name: "read_file".into(),
                input: json!({}),
            },
            BackendEvent::ToolEnd {
                id: "t1".into(),
                name: "read_file".into(),
                output: long_output,
            },
        ]));

        let (_, rx) = runner.run_stream(TurnRequest::new("read")).unwrap();
        let events = collect(rx).await;
        let end = events
            .iter()
            .find_map(|e| match e {
                WireEvent::ToolEnd { output, truncated, .. } => Some((output.len(), *truncated)),
                _ => None,
            })
            .unwrap();
        assert_eq!(end, (500, true));
    }

    #[tokio::test]
    async fn session_state_is_updated_from_events() {
        let runner = runner(SimulatedBackend::new());

        let (_, rx) = runner
            .run_stream(TurnRequest::new("plan and research rust").with_session("s1"))
            .unwrap();
        let kinds = types(&collect(rx).await);
        assert!(kinds.contains(&"todo-update"));
        assert!(kinds.contains(&"subagent-start"));
        assert!(kinds.contains(&"subagent-progress"));
        assert!(kinds.contains(&"subagent-end"));

        assert_eq!(
            runner.sessions().get("s1").unwrap().subagent_results.len(),
            1
        );

        let (_, rx) = runner
            .run_stream(TurnRequest::new("research more").with_session("s1"))
            .unwrap();
        let events = collect(rx).await;
        let (delta, total) = events
            .iter()
            .find_map(|e| match e {
                WireEvent::TokenUsage { usage, total } => Some((*usage, *total)),
                _ => None,
            })
            .unwrap();
        // counters restart with each turn
        assert_eq!(delta, total);

        let state = runner.sessions().get("s1").unwrap();
        assert_eq!(state.todos.len(), 3);
        assert_eq!(state.subagent_results.len(), 1);
        assert_eq!(state.subagent_results[0].subagent, "research-agent");
        assert!(state.subagent_results[0].output.contains("research more"));
        assert_eq!(state.usage, total);
        let WireEvent::Done { usage, .. } = events.last().unwrap() else {
            panic!("expected done");
        };
        assert_eq!(*usage, total);
    }

    #[tokio::test]
    async fn files_update_only_on_change() {
        let runner = runner(SimulatedBackend::new());

        let (_, rx) = runner
            .run_stream(TurnRequest::new("write a file").with_session("s1"))
            .unwrap();
        let events = collect(rx).await;
        let kinds = types(&events);
        let files_at = kinds.iter().position(|k| *k == "files-update").unwrap();
        assert_eq!(files_at, kinds.len() - 2);

        let WireEvent::Done { files, .. } = events.last().unwrap() else {
            panic!("expected done");
        };
        assert_eq!(files[0].path, "notes.md");

        let (_, rx) = runner
            .run_stream(TurnRequest::new("write a file").with_session("s1"))
            .unwrap();
        assert!(!types(&collect(rx).await).contains(&"files-update"));
        assert_eq!(runner.sessions().get("s1").unwrap().files.len(), 1);
    }

    #[tokio::test]
    async fn memory_events_use_the_store() {
        let store = InMemoryStore::new();
        let runner = Arc::new(
            TurnRunner::new(
                Arc::new(SimulatedBackend::scripted(vec![
                    BackendEvent::MemorySave {
                        content: "Prefers tabs over spaces".into(),
                        category: None,
                    },
                    BackendEvent::MemorySearch {
                        query: "tabs".into(),
                        limit: None,
                    },
                ])),
                Arc::new(SessionHub::default()),
                settings(),
            )
            .with_memory_store(Arc::new(store.clone())),
        );

        let (_, rx) = runner.run_stream(TurnRequest::new("x").with_session("s1")).unwrap();
        let events = collect(rx).await;

        let WireEvent::MemorySaved { category, .. } = &events[1] else {
            panic!("expected memory-saved, got {:?}", events[1]);
        };
        assert_eq!(category, "preference");
        let WireEvent::MemorySearchResult { results, .. } = &events[2] else {
            panic!("expected memory-search-result");
        };
        assert_eq!(results.len(), 1);
        assert_eq!(store.memories().await[0].source.as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn memory_failures_never_abort_the_turn() {
        let runner = Arc::new(
            TurnRunner::new(
                Arc::new(SimulatedBackend::scripted(vec![
                    BackendEvent::MemorySave {
                        content: "x".into(),
                        category: None,
                    },
                    BackendEvent::MemorySearch {
                        query: "x".into(),
                        limit: Some(3),
                    },
                    BackendEvent::MessageDelta {
                        text: "I'll remember that you prefer dark mode.".into(),
                    },
                ])),
                Arc::new(SessionHub::default()),
                settings(),
            )
            .with_memory_store(Arc::new(BrokenStore)),
        );

        let (_, rx) = runner.run_stream(TurnRequest::new("x")).unwrap();
        let events = collect(rx).await;
        assert_eq!(types(&events), vec!["start", "message-chunk", "done"]);

        let WireEvent::Done { memory, .. } = events.last().unwrap() else {
            panic!("expected done");
        };
        // detection still reports the candidate even though saving failed
        assert_eq!(memory.as_ref().unwrap().category, "preference");
    }

    #[tokio::test]
    async fn dropped_receiver_releases_session() {
        let runner = runner(
            SimulatedBackend::new().with_chunk_delay(Duration::from_millis(2)),
        );
        let (_, mut rx) = runner
            .run_stream(TurnRequest::new("a fairly long message to echo back").with_session("s1"))
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().event_type(), "start");
        drop(rx);

        for _ in 0..100 {
            if !runner.sessions().turns.is_active("s1") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!runner.sessions().turns.is_active("s1"));
    }

    #[tokio::test]
    async fn invoke_returns_structured_result() {
        let store = InMemoryStore::new();
        let runner = TurnRunner::new(
            Arc::new(SimulatedBackend::new()),
            Arc::new(SessionHub::default()),
            settings(),
        )
        .with_artifact_store(Arc::new(store.clone()));

        let result = runner
            .invoke(TurnRequest::new("give me code").with_session("s1"))
            .await
            .unwrap();
        assert_eq!(result.status, TurnStatus::Completed);
        assert!(result.response.starts_with("You said: give me code"));
        assert_eq!(result.artifacts.len(), 1);
        assert_eq!(store.artifacts_for("s1").await.len(), 1);
        assert!(result.usage.input_tokens > 0);
    }

    #[tokio::test]
    async fn invoke_reports_interrupt_and_fallback() {
        let runner = TurnRunner::new(
            Arc::new(SimulatedBackend::new()),
            Arc::new(SessionHub::default()),
            settings(),
        );
        let result = runner
            .invoke(TurnRequest::new("delete everything").with_session("s1"))
            .await
            .unwrap();
        assert_eq!(result.status, TurnStatus::Interrupted);
        assert_eq!(result.interrupt.unwrap().tool, "delete_file");
        assert!(runner.sessions().approvals.has_pending("s1"));

        let fallback = TurnRunner::new(
            Arc::new(Unconfigured),
            Arc::new(SessionHub::default()),
            settings(),
        );
        let result = fallback.invoke(TurnRequest::new("hi")).await.unwrap();
        assert_eq!(result.status, TurnStatus::Completed);
        assert!(result.response.starts_with(crate::fallback::FALLBACK_LABEL));
    }

    #[tokio::test]
    async fn invoke_surfaces_backend_errors() {
        let runner = TurnRunner::new(
            Arc::new(BreaksMidStream),
            Arc::new(SessionHub::default()),
            settings(),
        );
        let result = runner.invoke(TurnRequest::new("hi")).await.unwrap();
        assert_eq!(result.status, TurnStatus::Error);
        assert!(result.error.unwrap().contains("connection reset"));
    }

    #[test]
    fn request_accepts_thread_id_alias() {
        let request: TurnRequest =
            serde_json::from_str(r#"{"message":"hi","thread_id":"t1","extended_thinking":true}"#)
                .unwrap();
        assert_eq!(request.session_id.as_deref(), Some("t1"));
        assert!(request.extended_thinking);
        assert!(request.resume.is_none());
    }
}
