//! Context composition: the system prompt sent ahead of each turn.
//!
//! Sections are appended in a fixed order:
//!
//! 1. **Base prompt** from config
//! 2. **Custom Instructions**, project instructions winning over global ones
//! 3. **Project Files**, each cut to a per-file limit under a total budget
//! 4. **Long-Term Memory**, the currently active memories
//! 5. **Content Guidelines**, keyed by filter level and categories
//!
//! A failing collaborator only drops its own section.

use std::sync::Arc;

use agentgate_config::AppConfig;
use agentgate_core::{MemoryEntry, ProjectFile, PromptContextSource};
use tracing::{debug, warn};

/// Content-filter strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterLevel {
    Off,
    Standard,
    Strict,
}

impl FilterLevel {
    /// Unknown names fall back to `Standard`.
    pub fn parse(level: &str) -> Self {
        match level.trim().to_ascii_lowercase().as_str() {
            "off" => Self::Off,
            "strict" => Self::Strict,
            _ => Self::Standard,
        }
    }
}

/// Character budgets for the project-files section.
#[derive(Debug, Clone, Copy)]
pub struct ContextLimits {
    pub max_file_chars: usize,
    pub max_total_chars: usize,
    pub max_memories: usize,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            max_file_chars: 20_000,
            max_total_chars: 60_000,
            max_memories: 20,
        }
    }
}

/// Builds the system message for a turn.
pub struct ContextComposer {
    base_prompt: String,
    source: Option<Arc<dyn PromptContextSource>>,
    filter_level: FilterLevel,
    filter_categories: Vec<String>,
    limits: ContextLimits,
}

impl ContextComposer {
    pub fn new(base_prompt: impl Into<String>) -> Self {
        Self {
            base_prompt: base_prompt.into(),
            source: None,
            filter_level: FilterLevel::Standard,
            filter_categories: Vec::new(),
            limits: ContextLimits::default(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.system_prompt.clone())
            .with_filter(
                FilterLevel::parse(&config.content_filter.level),
                config.content_filter.categories.clone(),
            )
            .with_limits(ContextLimits {
                max_file_chars: config.context.max_project_file_chars,
                max_total_chars: config.context.max_project_context_chars,
                max_memories: config.memory.max_active_memories,
            })
    }

    pub fn with_source(mut self, source: Arc<dyn PromptContextSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_filter(mut self, level: FilterLevel, categories: Vec<String>) -> Self {
        self.filter_level = level;
        self.filter_categories = categories;
        self
    }

    pub fn with_limits(mut self, limits: ContextLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Compose the system prompt for a turn in `project_id`.
    pub async fn compose(&self, project_id: Option<&str>) -> String {
        let mut out = self.base_prompt.trim_end().to_string();

        if let Some(source) = &self.source {
            if let Some(instructions) = self.instructions(source.as_ref(), project_id).await {
                push_section(&mut out, "[Custom Instructions]\n", &instructions);
            }

            if let Some(project_id) = project_id {
                match source.project_files(project_id).await {
                    Ok(files) if !files.is_empty() => {
                        let block = format_project_files(&files, self.limits);
                        push_section(&mut out, "[Project Files]\n", &block);
                    }
                    Ok(_) => {}
                    Err(e) => warn!(project_id, error = %e, "Project files unavailable"),
                }
            }

            match source.active_memories(self.limits.max_memories).await {
                Ok(memories) if !memories.is_empty() => {
                    push_section(&mut out, "[Long-Term Memory]\n", &format_memories(&memories));
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Active memories unavailable"),
            }
        }

        if let Some(directives) = content_directives(self.filter_level, &self.filter_categories) {
            push_section(&mut out, "[Content Guidelines]\n", &directives);
        }

        debug!(chars = out.len(), "Composed system prompt");
        out
    }

    async fn instructions(
        &self,
        source: &dyn PromptContextSource,
        project_id: Option<&str>,
    ) -> Option<String> {
        if let Some(project_id) = project_id {
            match source.project_instructions(project_id).await {
                Ok(Some(text)) if !text.trim().is_empty() => return Some(text),
                Ok(_) => {}
                Err(e) => warn!(project_id, error = %e, "Project instructions unavailable"),
            }
        }

        match source.global_instructions().await {
            Ok(Some(text)) if !text.trim().is_empty() => Some(text),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Global instructions unavailable");
                None
            }
        }
    }
}

fn push_section(out: &mut String, header: &str, body: &str) {
    if !out.is_empty() {
        out.push_str("\n\n");
    }
    out.push_str(header);
    out.push_str(body.trim_end());
}

fn format_project_files(files: &[ProjectFile], limits: ContextLimits) -> String {
    let mut out = String::new();
    let mut used = 0usize;

    for file in files {
        let remaining = limits.max_total_chars.saturating_sub(used);
        if remaining == 0 {
            debug!(file = %file.name, "Project context budget exhausted");
            break;
        }
        let cap = limits.max_file_chars.min(remaining);
        let (content, cut) = take_chars(&file.content, cap);
        used += content.chars().count();

        out.push_str(&format!("--- {} ---\n{}", file.name, content));
        if cut {
            out.push_str("\n[truncated]");
        }
        out.push('\n');
    }
    out
}

fn format_memories(memories: &[MemoryEntry]) -> String {
    memories
        .iter()
        .map(|m| format!("- {} ({})", m.content, m.category))
        .collect::<Vec<_>>()
        .join("\n")
}

fn content_directives(level: FilterLevel, categories: &[String]) -> Option<String> {
    let base = match level {
        FilterLevel::Off => return None,
        FilterLevel::Standard => {
            "Keep responses appropriate for a professional workspace. Decline requests for clearly harmful content."
        }
        FilterLevel::Strict => {
            "Keep all responses suitable for a general audience. Refuse any request touching restricted topics and do not describe them even indirectly."
        }
    };

    if categories.is_empty() {
        return Some(base.to_string());
    }
    Some(format!("{base}\nRestricted categories: {}.", categories.join(", ")))
}

fn take_chars(text: &str, max: usize) -> (&str, bool) {
    match text.char_indices().nth(max) {
        Some((cut, _)) => (&text[..cut], true),
        None => (text, false),
    }
}
