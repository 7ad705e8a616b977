//! In-memory store: useful for testing and ephemeral deployments.

use std::sync::Arc;

use agentgate_core::error::StoreError;
use agentgate_core::{
    Artifact, ArtifactStore, MemoryCandidate, MemoryEntry, MemoryStore, StoredRecord,
};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// An artifact together with the record handed back when it was saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedArtifact {
    pub record: StoredRecord,
    pub session_id: String,
    pub artifact: Artifact,
}

/// Stores artifacts and memories in vectors.
///
/// Memories are deduplicated by case-insensitive content: saving the same
/// fact twice returns the original record.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    artifacts: Arc<RwLock<Vec<SavedArtifact>>>,
    memories: Arc<RwLock<Vec<MemoryEntry>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Artifacts saved for a session, oldest first.
    pub async fn artifacts_for(&self, session_id: &str) -> Vec<SavedArtifact> {
        self.artifacts
            .read()
            .await
            .iter()
            .filter(|a| a.session_id == session_id)
            .cloned()
            .collect()
    }

    /// All stored memories, oldest first.
    pub async fn memories(&self) -> Vec<MemoryEntry> {
        self.memories.read().await.clone()
    }

    /// Active memories, newest first.
    pub async fn active_memories(&self, limit: usize) -> Vec<MemoryEntry> {
        self.memories
            .read()
            .await
            .iter()
            .rev()
            .filter(|m| m.active)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Switch a memory in or out of prompt injection.
    pub async fn set_active(&self, id: &str, active: bool) -> bool {
        let mut memories = self.memories.write().await;
        match memories.iter_mut().find(|m| m.id == id) {
            Some(entry) => {
                entry.active = active;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl ArtifactStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn save_artifact(
        &self,
        session_id: &str,
        artifact: &Artifact,
    ) -> Result<StoredRecord, StoreError> {
        let record = StoredRecord {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
        };
        self.artifacts.write().await.push(SavedArtifact {
            record: record.clone(),
            session_id: session_id.to_string(),
            artifact: artifact.clone(),
        });
        Ok(record)
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn save_memory(&self, candidate: &MemoryCandidate) -> Result<StoredRecord, StoreError> {
        let content = candidate.content.trim();
        if content.is_empty() {
            return Err(StoreError::Storage("memory content is empty".into()));
        }

        let mut memories = self.memories.write().await;
        let lowered = content.to_lowercase();
        if let Some(existing) = memories.iter().find(|m| m.content.to_lowercase() == lowered) {
            tracing::debug!(id = %existing.id, "Duplicate memory, keeping original");
            return Ok(StoredRecord {
                id: existing.id.clone(),
                created_at: existing.created_at,
            });
        }

        let entry = MemoryEntry {
            id: Uuid::new_v4().to_string(),
            content: content.to_string(),
            category: candidate.category.clone(),
            source: candidate.source_session.clone(),
            created_at: Utc::now(),
            active: true,
        };
        let record = StoredRecord {
            id: entry.id.clone(),
            created_at: entry.created_at,
        };
        memories.push(entry);
        Ok(record)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MemoryEntry>, StoreError> {
        let memories = self.memories.read().await;
        let terms: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .filter(|t| t.len() > 2)
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        // Simple keyword relevance: number of query terms present
        let mut scored: Vec<(usize, &MemoryEntry)> = memories
            .iter()
            .filter(|m| m.active)
            .filter_map(|m| {
                let content = m.content.to_lowercase();
                let hits = terms.iter().filter(|t| content.contains(t.as_str())).count();
                (hits > 0).then_some((hits, m))
            })
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.created_at.cmp(&a.1.created_at)));
        Ok(scored.into_iter().take(limit).map(|(_, m)| m.clone()).collect())
    }
}
