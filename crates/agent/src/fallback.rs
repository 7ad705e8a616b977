//! Reply used when no agent backend is available.
//!
//! The fallback completes the normal protocol so clients need no special
//! case: it streams word by word and ends with `done`.

/// Label every fallback reply starts with.
pub const FALLBACK_LABEL: &str = "[Agent unavailable]";

/// The full fallback reply for a user message.
pub fn fallback_reply(user_message: &str, reason: &str) -> String {
    let echoed: String = user_message.chars().take(200).collect();
    format!(
        "{FALLBACK_LABEL} The agent backend is not configured ({reason}). \
         This is a placeholder response to: \"{echoed}\""
    )
}

/// Split a reply into chunks that concatenate back to the original text.
pub fn word_chunks(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_whitespace() && !current.trim().is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        current.push(ch);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
