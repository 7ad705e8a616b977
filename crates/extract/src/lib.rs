//! Post-processing of completed agent responses.
//!
//! Two pure passes run over the full response text once a turn finishes:
//!
//! - [`code_blocks`] turns fenced code blocks into typed [`Artifact`]s
//!   (language, title, kind).
//! - [`memory_trigger`] looks for phrases suggesting the agent learned
//!   something durable about the user and yields at most one
//!   [`MemoryCandidate`].
//!
//! Neither pass performs I/O. Persisting the results is the caller's job.
//!
//! [`Artifact`]: agentgate_core::Artifact
//! [`MemoryCandidate`]: agentgate_core::MemoryCandidate

pub mod code_blocks;
pub mod memory_trigger;

pub use code_blocks::{
    classify_kind, detect_language, extract_artifacts, extract_title, resolve_language,
    UI_COMPONENT_LABEL,
};
pub use memory_trigger::{detect_memory, TRIGGER_PHRASES};

use regex_lite::Regex;

/// Compile an ordered pattern family, skipping (and logging) any pattern
/// the engine rejects so the remaining rules keep their relative order.
pub(crate) fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::error!(pattern = %p, error = %e, "Invalid extraction pattern");
                None
            }
        })
        .collect()
}
