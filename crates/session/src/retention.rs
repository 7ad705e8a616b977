//! Session retention: idle expiry and a capacity ceiling.
//!
//! Sessions with a pending approval or an in-flight turn are never evicted.

use std::sync::Arc;
use std::time::Duration;

use agentgate_core::error::SessionError;
use agentgate_core::{Resolution, SessionPatch, SessionState};
use agentgate_security::{AuditEntry, AuditEvent, AuditOutcome, AuditSink};
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::approval::ApprovalGate;
use crate::store::SessionStore;
use crate::turn_guard::{TurnGuard, TurnPermit};

/// Retention limits for session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Evict sessions idle longer than this. `None` keeps them forever.
    pub idle_ttl: Option<Duration>,
    /// Hard ceiling on stored sessions.
    pub max_sessions: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            idle_ttl: Some(Duration::from_secs(86_400)),
            max_sessions: 10_000,
        }
    }
}

impl RetentionPolicy {
    /// Build from config values, where a TTL of zero disables expiry.
    pub fn from_secs(idle_ttl_secs: u64, max_sessions: usize) -> Self {
        Self {
            idle_ttl: (idle_ttl_secs > 0).then(|| Duration::from_secs(idle_ttl_secs)),
            max_sessions: max_sessions.max(1),
        }
    }
}

/// An admitted turn: the single-flight permit plus, for a resuming turn,
/// the resolution decided through the approval gate.
#[derive(Debug)]
pub struct TurnAdmission {
    pub permit: TurnPermit,
    pub resume: Option<Resolution>,
}

/// The session-scoped state the gateway shares across requests: stored
/// state, pending approvals and turn admission, under one retention policy.
pub struct SessionHub {
    pub store: SessionStore,
    pub approvals: ApprovalGate,
    pub turns: TurnGuard,
    policy: RetentionPolicy,
    audit: Option<Arc<dyn AuditSink>>,
}

impl std::fmt::Debug for SessionHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHub")
            .field("sessions", &self.store.len())
            .field("pending_approvals", &self.approvals.pending_count())
            .field("active_turns", &self.turns.active_count())
            .field("policy", &self.policy)
            .finish()
    }
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::new(RetentionPolicy::default())
    }
}

impl SessionHub {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self {
            store: SessionStore::new(),
            approvals: ApprovalGate::new(),
            turns: TurnGuard::new(),
            policy,
            audit: None,
        }
    }

    /// Route approval and eviction records to an audit sink.
    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.approvals = self.approvals.with_audit(Arc::clone(&sink));
        self.audit = Some(sink);
        self
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Merge a patch, then enforce the capacity ceiling without evicting
    /// the session just written.
    pub fn merge_patch(&self, session_id: &str, patch: SessionPatch) -> SessionState {
        let state = self.store.merge_patch(session_id, patch);
        self.enforce_capacity(Some(session_id));
        state
    }

    pub fn get(&self, session_id: &str) -> Option<SessionState> {
        self.store.get(session_id)
    }

    /// Admit a turn for a session.
    ///
    /// Every turn is refused while an approval is pending, as is a second
    /// concurrent turn for the same session. A resuming turn also needs a
    /// decision made through the gate. It receives that resolution, never
    /// one supplied by the client. A fresh turn discards any undelivered
    /// decision.
    pub fn begin_turn(&self, session_id: &str, resuming: bool) -> Result<TurnAdmission, SessionError> {
        let admitted = if self.approvals.has_pending(session_id) {
            Err(SessionError::ApprovalPending {
                session_id: session_id.to_string(),
            })
        } else {
            self.turns.try_begin(session_id).and_then(|permit| {
                let resolution = self.approvals.take_resolution(session_id);
                match (resuming, resolution) {
                    (true, Some(resolution)) => Ok(TurnAdmission {
                        permit,
                        resume: Some(resolution),
                    }),
                    (true, None) => Err(SessionError::NothingToResume {
                        session_id: session_id.to_string(),
                    }),
                    (false, stale) => {
                        if let Some(stale) = stale {
                            debug!(session_id, tool = %stale.tool, "Undelivered decision discarded");
                        }
                        Ok(TurnAdmission {
                            permit,
                            resume: None,
                        })
                    }
                }
            })
        };

        if let Err(e) = &admitted {
            warn!(session_id, error = %e, "Turn refused");
            self.record(
                AuditEvent::TurnRefused { reason: e.to_string() },
                "user",
                session_id,
                AuditOutcome::Denied,
                None,
            );
        }
        admitted
    }

    /// Whether retention must leave a session alone.
    pub fn is_protected(&self, session_id: &str) -> bool {
        self.approvals.has_pending(session_id)
            || self.approvals.has_resolution(session_id)
            || self.turns.is_active(session_id)
    }

    /// Evict idle sessions as of now. Returns the number removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    /// Evict sessions idle as of `now`, then enforce the ceiling.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut evicted = 0;

        if let Some(ttl) = self.policy.idle_ttl {
            let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
            let cutoff = now.checked_sub_signed(ttl).unwrap_or(DateTime::<Utc>::MIN_UTC);
            for id in self.store.idle_since(cutoff) {
                if self.evict(&id, "idle") {
                    evicted += 1;
                }
            }
        }

        evicted += self.enforce_capacity(None);
        if evicted > 0 {
            info!(evicted, remaining = self.store.len(), "Session sweep complete");
        }
        evicted
    }

    /// Evict least recently updated unprotected sessions until the store
    /// is within its ceiling. `keep` is never evicted.
    pub fn enforce_capacity(&self, keep: Option<&str>) -> usize {
        let overflow = self.store.len().saturating_sub(self.policy.max_sessions);
        if overflow == 0 {
            return 0;
        }

        let mut evicted = 0;
        for id in self.store.ids_by_age() {
            if evicted == overflow {
                break;
            }
            if keep == Some(id.as_str()) {
                continue;
            }
            if self.evict(&id, "capacity") {
                evicted += 1;
            }
        }
        evicted
    }

    /// Run [`sweep`](Self::sweep) every `interval` until the handle is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let hub = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // first tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                hub.sweep();
            }
        })
    }

    fn evict(&self, session_id: &str, reason: &str) -> bool {
        if self.is_protected(session_id) || !self.store.remove(session_id) {
            return false;
        }
        debug!(session_id, reason, "Session evicted");
        self.record(
            AuditEvent::SessionEvicted,
            "retention",
            session_id,
            AuditOutcome::Success,
            Some(reason.to_string()),
        );
        true
    }

    fn record(
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
}
