//! Heuristic detection of durable user facts in response text.
//!
//! Deliberately shallow: a case-insensitive substring search over a fixed,
//! ordered phrase list. The first phrase found ends the search and at most
//! one candidate is produced per call.

use agentgate_core::MemoryCandidate;

/// Phrases suggesting the agent learned something lasting about the user.
pub const TRIGGER_PHRASES: &[&str] = &[
    "remember that",
    "i'll remember",
    "i will remember",
    "you prefer",
    "your favorite",
    "your favourite",
    "you mentioned",
    "you like",
    "you told me",
];

/// Candidates are cut to this many characters.
pub const MAX_MEMORY_CHARS: usize = 500;

/// Shorter candidates are treated as noise.
pub const MIN_MEMORY_CHARS: usize = 10;

/// Scan `text` for the first trigger phrase and build a candidate from it.
///
/// The candidate content is the response text itself, trimmed and cut to
/// [`MAX_MEMORY_CHARS`]. The text following the trigger must carry at least
/// [`MIN_MEMORY_CHARS`] of substance, otherwise nothing is returned.
pub fn detect_memory(text: &str, session_id: Option<&str>) -> Option<MemoryCandidate> {
    let lowered = text.to_lowercase();

    let (phrase, at) = TRIGGER_PHRASES
        .iter()
        .find_map(|phrase| lowered.find(phrase).map(|at| (*phrase, at)))?;

    let after_trigger = lowered
        .get(at + phrase.len()..)
        .unwrap_or_default()
        .trim();
    if after_trigger.chars().count() < MIN_MEMORY_CHARS {
        tracing::debug!(phrase, "Memory trigger matched but trailing text too short");
        return None;
    }

    let content: String = text.trim().chars().take(MAX_MEMORY_CHARS).collect();
    if content.chars().count() < MIN_MEMORY_CHARS {
        return None;
    }

    let candidate = MemoryCandidate::new(content);
    Some(match session_id {
        Some(id) => candidate.with_source(id),
        None => candidate,
    })
}
