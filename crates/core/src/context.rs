//! Prompt-context collaborator trait.
//!
//! Supplies the raw material the context composer turns into a system
//! prompt: custom instructions, project files and active memories.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::memory::MemoryEntry;

/// A file attached to a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFile {
    pub name: String,
    pub content: String,
}

/// Where prompt context comes from (a relational store in production).
#[async_trait]
pub trait PromptContextSource: Send + Sync {
    /// Workspace-wide custom instructions.
    async fn global_instructions(&self) -> std::result::Result<Option<String>, StoreError>;

    /// Project-specific custom instructions; these override the global ones.
    async fn project_instructions(
        &self,
        project_id: &str,
    ) -> std::result::Result<Option<String>, StoreError>;

    /// Files attached to a project.
    async fn project_files(
        &self,
        project_id: &str,
    ) -> std::result::Result<Vec<ProjectFile>, StoreError>;

    /// Currently active long-term memories, newest first.
    async fn active_memories(
        &self,
        limit: usize,
    ) -> std::result::Result<Vec<MemoryEntry>, StoreError>;
}
