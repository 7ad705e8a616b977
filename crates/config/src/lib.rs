//! Configuration loading, validation, and management for agentgate.
//!
//! Loads configuration from `~/.agentgate/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.agentgate/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default model passed to the agent backend
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Base system prompt placed before composed context
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Agent backend selection and credentials
    #[serde(default)]
    pub backend: BackendSettings,

    /// Streaming protocol limits
    #[serde(default)]
    pub streaming: StreamingConfig,

    /// Session state retention
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// Memory extraction and recall
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Content-filter directives injected into prompts
    #[serde(default)]
    pub content_filter: ContentFilterConfig,

    /// Project context budgets
    #[serde(default)]
    pub context: ContextConfig,

    /// Custom sub-agent descriptors
    #[serde(default)]
    pub subagents: Vec<SubagentConfig>,
}

fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_system_prompt() -> String {
    "You are a helpful assistant working inside a project workspace. \
     Ask for approval before taking destructive actions."
        .into()
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Request body size limit
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Origin allowed by CORS
    #[serde(default = "default_allowed_origin")]
    pub allowed_origin: String,
}

fn default_port() -> u16 {
    42618
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_max_body_bytes() -> usize {
    1024 * 1024
}
fn default_allowed_origin() -> String {
    "http://localhost:5173".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            max_body_bytes: default_max_body_bytes(),
            allowed_origin: default_allowed_origin(),
        }
    }
}

/// Which agent backend to run and how to reach it.
#[derive(Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    /// "simulated" or "live"
    #[serde(default = "default_backend_kind")]
    pub kind: String,

    /// Base URL of the external orchestration runtime (live only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// API key for the orchestration runtime (live only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Delay between simulated events, for demos
    #[serde(default)]
    pub chunk_delay_ms: u64,
}

fn default_backend_kind() -> String {
    "simulated".into()
}
fn default_timeout_secs() -> u64 {
    300
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            kind: default_backend_kind(),
            base_url: None,
            api_key: None,
            timeout_secs: default_timeout_secs(),
            chunk_delay_ms: 0,
        }
    }
}

impl std::fmt::Debug for BackendSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSettings")
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("timeout_secs", &self.timeout_secs)
            .field("chunk_delay_ms", &self.chunk_delay_ms)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// `tool-end` output is cut to this many characters
    #[serde(default = "default_tool_output_preview_chars")]
    pub tool_output_preview_chars: usize,

    /// Pacing of the unavailable-agent fallback reply
    #[serde(default = "default_fallback_word_delay_ms")]
    pub fallback_word_delay_ms: u64,
}

fn default_tool_output_preview_chars() -> usize {
    500
}
fn default_fallback_word_delay_ms() -> u64 {
    20
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            tool_output_preview_chars: default_tool_output_preview_chars(),
            fallback_word_delay_ms: default_fallback_word_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Idle sessions older than this are evicted (0 = never)
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,

    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_idle_ttl_secs() -> u64 {
    86_400
}
fn default_max_sessions() -> usize {
    10_000
}
fn default_sweep_interval_secs() -> u64 {
    300
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: default_idle_ttl_secs(),
            max_sessions: default_max_sessions(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Run the memory-trigger detector over finished responses
    #[serde(default = "default_true")]
    pub auto_extract: bool,

    /// Active memories injected into each prompt
    #[serde(default = "default_max_active_memories")]
    pub max_active_memories: usize,

    /// Default result count for backend memory searches
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

fn default_max_active_memories() -> usize {
    20
}
fn default_search_limit() -> usize {
    5
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            auto_extract: true,
            max_active_memories: default_max_active_memories(),
            search_limit: default_search_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentFilterConfig {
    /// "off", "standard" or "strict"
    #[serde(default = "default_filter_level")]
    pub level: String,

    /// Categories the directives cover (e.g. "violence", "adult")
    #[serde(default)]
    pub categories: Vec<String>,
}

fn default_filter_level() -> String {
    "standard".into()
}

impl Default for ContentFilterConfig {
    fn default() -> Self {
        Self {
            level: default_filter_level(),
            categories: vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Per-file cut-off for project files in the prompt
    #[serde(default = "default_max_project_file_chars")]
    pub max_project_file_chars: usize,

    /// Total budget for all project files
    #[serde(default = "default_max_project_context_chars")]
    pub max_project_context_chars: usize,
}

fn default_max_project_file_chars() -> usize {
    20_000
}
fn default_max_project_context_chars() -> usize {
    60_000
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_project_file_chars: default_max_project_file_chars(),
            max_project_context_chars: default_max_project_context_chars(),
        }
    }
}

/// A custom sub-agent the backend may delegate to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubagentConfig {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub tools: Vec<String>,
}

const BACKEND_KINDS: &[&str] = &["simulated", "live"];
const FILTER_LEVELS: &[&str] = &["off", "standard", "strict"];

impl AppConfig {
    /// Load configuration from the default path (~/.agentgate/config.toml).
    ///
    /// Environment variables override the file:
    /// - `AGENTGATE_API_KEY`
    /// - `AGENTGATE_BACKEND`
    /// - `AGENTGATE_BACKEND_URL`
    /// - `AGENTGATE_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in production).
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("AGENTGATE_API_KEY") {
            self.backend.api_key = Some(key);
        }
        if let Some(kind) = lookup("AGENTGATE_BACKEND") {
            self.backend.kind = kind;
        }
        if let Some(url) = lookup("AGENTGATE_BACKEND_URL") {
            self.backend.base_url = Some(url);
        }
        if let Some(model) = lookup("AGENTGATE_MODEL") {
            self.default_model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".agentgate")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !BACKEND_KINDS.contains(&self.backend.kind.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "backend.kind must be one of {BACKEND_KINDS:?}, got '{}'",
                self.backend.kind
            )));
        }

        if !FILTER_LEVELS.contains(&self.content_filter.level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "content_filter.level must be one of {FILTER_LEVELS:?}, got '{}'",
                self.content_filter.level
            )));
        }

        if self.streaming.tool_output_preview_chars == 0 {
            return Err(ConfigError::ValidationError(
                "streaming.tool_output_preview_chars must be > 0".into(),
            ));
        }

        if self.sessions.max_sessions == 0 {
            return Err(ConfigError::ValidationError(
                "sessions.max_sessions must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Whether the live backend has credentials.
    pub fn has_api_key(&self) -> bool {
        self.backend
            .api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty())
    }

    /// Generate a default config TOML string (for `config --init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            system_prompt: default_system_prompt(),
            gateway: GatewayConfig::default(),
            backend: BackendSettings::default(),
            streaming: StreamingConfig::default(),
            sessions: SessionsConfig::default(),
            memory: MemoryConfig::default(),
            content_filter: ContentFilterConfig::default(),
            context: ContextConfig::default(),
            subagents: vec![],
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
