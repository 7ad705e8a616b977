//! Artifacts extracted from a completed response.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// What kind of renderable artifact a code block is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Code,
    Html,
    Svg,
    Mermaid,
    Latex,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Html => "html",
            Self::Svg => "svg",
            Self::Mermaid => "mermaid",
            Self::Latex => "latex",
        }
    }
}

/// A structured extraction of one fenced code block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub content: String,
    pub language: String,
    pub title: String,
    pub kind: ArtifactKind,
}

/// Identifier and timestamp handed back by a persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

/// Durable storage for extracted artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// The store name (e.g., "in_memory", "none").
    fn name(&self) -> &str;

    /// Persist an artifact produced during a session's turn.
    async fn save_artifact(
        &self,
        session_id: &str,
        artifact: &Artifact,
    ) -> std::result::Result<StoredRecord, StoreError>;
}
