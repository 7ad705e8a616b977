//! Session State Store: per-session todos, files, delegation results and
//! token counters, visible to polling clients.

use std::collections::HashMap;
use std::sync::RwLock;

use agentgate_core::{SessionPatch, SessionState};
use chrono::{DateTime, Utc};

/// A concurrency-safe map from session id to [`SessionState`].
///
/// Locks are held only for the duration of a map operation, never across
/// an await point.
#[derive(Debug, Default)]
pub struct SessionStore {
    entries: RwLock<HashMap<String, SessionState>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a session's state.
    pub fn get(&self, session_id: &str) -> Option<SessionState> {
        self.read().get(session_id).cloned()
    }

    /// Create or update a session, replacing only the fields the patch carries.
    pub fn merge_patch(&self, session_id: &str, patch: SessionPatch) -> SessionState {
        let mut entries = self.write();
        let state = entries
            .entry(session_id.to_string())
            .or_insert_with(|| SessionState::new(session_id));
        patch.apply_to(state);
        state.clone()
    }

    /// Drop a session. Returns whether it existed.
    pub fn remove(&self, session_id: &str) -> bool {
        self.write().remove(session_id).is_some()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.read().contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Session ids last updated before `cutoff`.
    pub fn idle_since(&self, cutoff: DateTime<Utc>) -> Vec<String> {
        self.read()
            .values()
            .filter(|s| s.updated_at < cutoff)
            .map(|s| s.session_id.clone())
            .collect()
    }

    /// All session ids, least recently updated first.
    pub fn ids_by_age(&self) -> Vec<String> {
        let entries = self.read();
        let mut ids: Vec<(&DateTime<Utc>, &String)> =
            entries.values().map(|s| (&s.updated_at, &s.session_id)).collect();
        ids.sort();
        ids.into_iter().map(|(_, id)| id.clone()).collect()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, SessionState>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, SessionState>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}
