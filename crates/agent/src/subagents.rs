//! Sub-agent descriptors the backend may delegate to.

use agentgate_config::SubagentConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubagentDescriptor {
    pub name: String,
    pub description: String,
    pub tools: Vec<String>,
    pub builtin: bool,
}

impl SubagentDescriptor {
    fn builtin(name: &str, description: &str, tools: &[&str]) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            tools: tools.iter().map(|t| t.to_string()).collect(),
            builtin: true,
        }
    }
}

impl From<&SubagentConfig> for SubagentDescriptor {
    fn from(config: &SubagentConfig) -> Self {
        Self {
            name: config.name.clone(),
            description: config.description.clone(),
            tools: config.tools.clone(),
            builtin: false,
        }
    }
}

/// Built-in descriptors followed by custom ones.
///
/// A custom entry sharing a built-in name replaces it.
pub fn catalog(custom: &[SubagentConfig]) -> Vec<SubagentDescriptor> {
    let mut agents = vec![
        SubagentDescriptor::builtin(
            "general-purpose",
            "Handles multi-step tasks that need several tools.",
            &["read_file", "write_file", "web_search"],
        ),
        SubagentDescriptor::builtin(
            "research-agent",
            "Researches a topic and reports a concise summary.",
            &["web_search", "read_file"],
        ),
        SubagentDescriptor::builtin(
            "code-reviewer",
            "Reviews code for bugs, style and security issues.",
            &["read_file"],
        ),
    ];

    for config in custom {
        let name = config.name.trim();
        if name.is_empty() {
            tracing::warn!("Skipping custom sub-agent with empty name");
            continue;
        }
        let descriptor = SubagentDescriptor::from(config);
        match agents.iter_mut().find(|a| a.name == name) {
            Some(existing) => *existing = descriptor,
            None => agents.push(descriptor),
        }
    }
    agents
}
