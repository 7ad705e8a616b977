//! No-op store: disables artifact and memory persistence entirely.

use agentgate_core::error::StoreError;
use agentgate_core::{
    Artifact, ArtifactStore, MemoryCandidate, MemoryEntry, MemoryStore, StoredRecord,
};
use async_trait::async_trait;
use chrono::Utc;

/// Accepts every write and remembers nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStore;

fn discarded() -> StoredRecord {
    StoredRecord {
        id: String::new(),
        created_at: Utc::now(),
    }
}

#[async_trait]
impl ArtifactStore for NoopStore {
    fn name(&self) -> &str {
        "none"
    }

    async fn save_artifact(
        &self,
        _session_id: &str,
        _artifact: &Artifact,
    ) -> Result<StoredRecord, StoreError> {
        Ok(discarded())
    }
}

#[async_trait]
impl MemoryStore for NoopStore {
    fn name(&self) -> &str {
        "none"
    }

    async fn save_memory(&self, _candidate: &MemoryCandidate) -> Result<StoredRecord, StoreError> {
        Ok(discarded())
    }

    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<MemoryEntry>, StoreError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_remembers_nothing() {
        let store = NoopStore;
        let record = store.save_memory(&MemoryCandidate::new("you prefer tabs")).await.unwrap();
        assert!(record.id.is_empty());
        assert!(store.search("tabs", 5).await.unwrap().is_empty());
        assert_eq!(MemoryStore::name(&store), "none");
    }
}
