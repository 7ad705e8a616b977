//! Long-term memory types and the storage collaborator trait.
//!
//! The gateway only *detects* memory candidates; persistence, deduplication
//! and search belong to a [`MemoryStore`] implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::StoredRecord;
use crate::error::StoreError;

/// Default category for detected memories.
pub const DEFAULT_MEMORY_CATEGORY: &str = "preference";

/// A durable fact or preference heuristically detected in response text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryCandidate {
    /// Bounded-length excerpt
    pub content: String,

    /// Free-text category, defaults to "preference"
    pub category: String,

    /// The session whose response produced this candidate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_session: Option<String>,
}

impl MemoryCandidate {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            category: DEFAULT_MEMORY_CATEGORY.into(),
            source_session: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_source(mut self, session_id: impl Into<String>) -> Self {
        self.source_session = Some(session_id.into());
        self
    }
}

/// A stored long-term memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Unique ID for this memory
    pub id: String,

    /// The content of the memory
    pub content: String,

    /// Category (preference, fact, ...)
    pub category: String,

    /// Source of the memory (session ID)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// When this memory was created
    pub created_at: DateTime<Utc>,

    /// Whether the memory is injected into prompts
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Durable storage and search for long-term memories.
///
/// Implementations: in-memory (offline/testing), none (no-op).
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// The store name (e.g., "in_memory", "none").
    fn name(&self) -> &str;

    /// Persist a detected memory candidate.
    async fn save_memory(
        &self,
        candidate: &MemoryCandidate,
    ) -> std::result::Result<StoredRecord, StoreError>;

    /// Search memories by free text.
    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> std::result::Result<Vec<MemoryEntry>, StoreError>;
}
