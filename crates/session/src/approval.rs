//! Approval Gate: at most one pending human decision per session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use agentgate_core::error::ApprovalError;
use agentgate_core::{Decision, PendingApproval, Resolution};
use agentgate_security::{AuditEntry, AuditEvent, AuditOutcome, AuditSink};
use chrono::Utc;
use tracing::{info, warn};

/// Parks interrupted actions until a client decides on them.
///
/// A newer request for the same session overwrites the older one
/// (last writer wins); interrupts are never queued.
///
/// A decision is kept here until the resuming turn takes it, so the
/// backend only ever resumes with what was actually decided.
pub struct ApprovalGate {
    records: Mutex<Records>,
    audit: Option<Arc<dyn AuditSink>>,
}

#[derive(Default)]
struct Records {
    pending: HashMap<String, PendingApproval>,
    decided: HashMap<String, Resolution>,
}

impl std::fmt::Debug for ApprovalGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalGate")
            .field("pending", &self.lock().pending.len())
            .field("audited", &self.audit.is_some())
            .finish()
    }
}

impl Default for ApprovalGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ApprovalGate {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Records::default()),
            audit: None,
        }
    }

    /// Forward approval lifecycle records to an audit sink.
    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Park an action for a session, replacing any earlier pending one.
    pub fn request_approval(
        &self,
        session_id: &str,
        tool: &str,
        input: serde_json::Value,
        reason: &str,
    ) -> PendingApproval {
        let record = PendingApproval {
            session_id: session_id.to_string(),
            tool: tool.to_string(),
            input,
            reason: reason.to_string(),
            requested_at: Utc::now(),
        };

        let replaced = {
            let mut records = self.lock();
            records.decided.remove(session_id);
            records.pending.insert(session_id.to_string(), record.clone())
        };

        if let Some(old) = replaced {
            warn!(session_id, old_tool = %old.tool, new_tool = %tool, "Pending approval overwritten");
            self.audit(
                AuditEvent::ApprovalReplaced { tool: old.tool },
                "agent",
                session_id,
                AuditOutcome::Success,
                None,
            );
        }
        info!(session_id, tool, "Approval requested");
        self.audit(
            AuditEvent::ApprovalRequested { tool: tool.to_string() },
            "agent",
            session_id,
            AuditOutcome::Success,
            Some(reason.to_string()),
        );

        record
    }

    /// The pending approval for a session, if any. Does not clear it.
    pub fn peek(&self, session_id: &str) -> Option<PendingApproval> {
        self.lock().pending.get(session_id).cloned()
    }

    pub fn has_pending(&self, session_id: &str) -> bool {
        self.lock().pending.contains_key(session_id)
    }

    /// Whether a decision is waiting for its resuming turn.
    pub fn has_resolution(&self, session_id: &str) -> bool {
        self.lock().decided.contains_key(session_id)
    }

    /// Hand the decided resolution to the turn that resumes it. One-shot.
    pub fn take_resolution(&self, session_id: &str) -> Option<Resolution> {
        self.lock().decided.remove(session_id)
    }

    /// Apply a decision and clear the pending record.
    ///
    /// The decision is validated first: `InvalidDecision` or
    /// `MissingEditedInput` is returned whether or not anything is pending.
    /// With no pending record the result is `NotFound`. On failure any
    /// pending record is left untouched. On success the resolution is
    /// returned and also held for [`take_resolution`](Self::take_resolution).
    pub fn decide(
        &self,
        session_id: &str,
        decision: &str,
        edited_input: Option<serde_json::Value>,
    ) -> Result<Resolution, ApprovalError> {
        let parsed = match Decision::parse(decision, edited_input) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.refuse(session_id, decision, e.to_string());
                return Err(e);
            }
        };

        let mut records = self.lock();
        let Some(record) = records.pending.remove(session_id) else {
            drop(records);
            self.refuse(session_id, decision, "no pending approval".into());
            return Err(ApprovalError::NotFound {
                session_id: session_id.to_string(),
            });
        };

        let resolution = Resolution::from_decision(record, parsed);
        records
            .decided
            .insert(session_id.to_string(), resolution.clone());
        drop(records);

        info!(
            session_id,
            tool = %resolution.tool,
            decision = %resolution.decision,
            "Approval resolved"
        );
        let outcome = if resolution.is_resumed() {
            AuditOutcome::Success
        } else {
            AuditOutcome::Denied
        };
        self.audit(
            AuditEvent::ApprovalDecided {
                tool: resolution.tool.clone(),
                decision: resolution.decision.clone(),
            },
            "user",
            session_id,
            outcome,
            None,
        );

        Ok(resolution)
    }

    fn refuse(&self, session_id: &str, decision: &str, why: String) {
        self.audit(
            AuditEvent::DecisionRefused {
                decision: decision.to_string(),
            },
            "user",
            session_id,
            AuditOutcome::Failure,
            Some(why),
        );
    }

    /// Drop any pending approval for a session without deciding it.
    /// An undelivered decision for the session is dropped too.
    pub fn clear(&self, session_id: &str) -> Option<PendingApproval> {
        let mut records = self.lock();
        records.decided.remove(session_id);
        records.pending.remove(session_id)
    }

    /// Number of sessions currently waiting on a decision.
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    fn audit(
        &self,
        event: AuditEvent,
        actor: &str,
        session_id: &str,
        outcome: AuditOutcome,
        details: Option<String>,
    ) {
        if let Some(sink) = &self.audit {
            sink.record(&AuditEntry {
                timestamp: Utc::now(),
                event,
                actor: actor.to_string(),
                target: session_id.to_string(),
                outcome,
                details,
            });
        }
    }

    fn lock(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}
