//! Static prompt-context source configured in process.

use std::collections::HashMap;

use agentgate_core::error::StoreError;
use agentgate_core::{MemoryEntry, ProjectFile, PromptContextSource};
use async_trait::async_trait;

use crate::in_memory::InMemoryStore;

#[derive(Debug, Clone, Default)]
struct Project {
    instructions: Option<String>,
    files: Vec<ProjectFile>,
}

/// Instructions and project files held in memory; active memories come
/// from an [`InMemoryStore`] when one is attached.
#[derive(Clone, Default)]
pub struct StaticContext {
    global_instructions: Option<String>,
    projects: HashMap<String, Project>,
    memories: Option<InMemoryStore>,
}

impl StaticContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_global_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.global_instructions = Some(instructions.into());
        self
    }

    pub fn with_project_instructions(
        mut self,
        project_id: &str,
        instructions: impl Into<String>,
    ) -> Self {
        self.projects.entry(project_id.to_string()).or_default().instructions =
            Some(instructions.into());
        self
    }

    pub fn with_project_file(
        mut self,
        project_id: &str,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        self.projects
            .entry(project_id.to_string())
            .or_default()
            .files
            .push(ProjectFile {
                name: name.into(),
                content: content.into(),
            });
        self
    }

    /// Read active memories from this store.
    pub fn with_memory_store(mut self, store: InMemoryStore) -> Self {
        self.memories = Some(store);
        self
    }
}

#[async_trait]
impl PromptContextSource for StaticContext {
    async fn global_instructions(&self) -> Result<Option<String>, StoreError> {
        Ok(self.global_instructions.clone())
    }

    async fn project_instructions(&self, project_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .projects
            .get(project_id)
            .and_then(|p| p.instructions.clone()))
    }

    async fn project_files(&self, project_id: &str) -> Result<Vec<ProjectFile>, StoreError> {
        Ok(self
            .projects
            .get(project_id)
            .map(|p| p.files.clone())
            .unwrap_or_default())
    }

    async fn active_memories(&self, limit: usize) -> Result<Vec<MemoryEntry>, StoreError> {
        match &self.memories {
            Some(store) => Ok(store.active_memories(limit).await),
            None => Ok(Vec::new()),
        }
    }
}
