//! Per-session single-flight admission for turns.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use agentgate_core::error::SessionError;

/// Admits at most one in-flight turn per session id.
///
/// Cloning shares the underlying set.
#[derive(Debug, Clone, Default)]
pub struct TurnGuard {
    active: Arc<Mutex<HashSet<String>>>,
}

/// Proof that a turn was admitted. Releases the session on drop, including
/// when the streaming task is aborted because the client went away.
#[derive(Debug)]
pub struct TurnPermit {
    session_id: String,
    active: Arc<Mutex<HashSet<String>>>,
}

impl TurnGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a session for one turn.
    pub fn try_begin(&self, session_id: &str) -> Result<TurnPermit, SessionError> {
        if !lock(&self.active).insert(session_id.to_string()) {
            return Err(SessionError::TurnInProgress {
                session_id: session_id.to_string(),
            });
        }
        Ok(TurnPermit {
            session_id: session_id.to_string(),
            active: Arc::clone(&self.active),
        })
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        lock(&self.active).contains(session_id)
    }

    pub fn active_count(&self) -> usize {
        lock(&self.active).len()
    }
}

impl TurnPermit {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for TurnPermit {
    fn drop(&mut self) {
        lock(&self.active).remove(&self.session_id);
    }
}

fn lock(set: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    set.lock().unwrap_or_else(|e| e.into_inner())
}
