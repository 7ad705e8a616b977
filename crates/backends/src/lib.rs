//! Agent backend implementations for agentgate.
//!
//! All backends implement the `agentgate_core::AgentBackend` trait.
//! [`build_from_config`] selects one from `[backend] kind`.

pub mod live;
pub mod simulated;

pub use live::{LiveBackend, SseLineBuffer};
pub use simulated::{SimulatedBackend, SIMULATED_SENSITIVE_TOOL};

use std::sync::Arc;
use std::time::Duration;

use agentgate_core::AgentBackend;
use agentgate_core::error::BackendError;

/// Base URL used when `kind = "live"` and none is configured.
pub const DEFAULT_LIVE_URL: &str = "http://127.0.0.1:8123";

/// Build the configured backend.
///
/// A live backend without an API key is still built; its turns fail with
/// `NotConfigured`, which the turn runner answers with a fallback reply.
pub fn build_from_config(
    config: &agentgate_config::AppConfig,
) -> Result<Arc<dyn AgentBackend>, BackendError> {
    let settings = &config.backend;
    match settings.kind.as_str() {
        "live" => {
            let base_url = settings
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_LIVE_URL.to_string());
            if !config.has_api_key() {
                tracing::warn!(%base_url, "Live backend has no API key; turns will use the fallback reply");
            }
            let backend = LiveBackend::new(
                base_url,
                settings.api_key.clone(),
                Duration::from_secs(settings.timeout_secs),
            )?;
            Ok(Arc::new(backend))
        }
        "simulated" => Ok(Arc::new(
            SimulatedBackend::new().with_chunk_delay(Duration::from_millis(settings.chunk_delay_ms)),
        )),
        other => Err(BackendError::NotConfigured(format!(
            "unknown backend kind '{other}'"
        ))),
    }
}
