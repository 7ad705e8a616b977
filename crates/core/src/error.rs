//! Error types for the agentgate domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all agentgate operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Agent backend errors ---
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    // --- Approval gate errors ---
    #[error("Approval error: {0}")]
    Approval(#[from] ApprovalError),

    // --- Session errors ---
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    // --- Collaborator storage errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The backend cannot run at all (missing credentials, no endpoint).
    /// The streaming gateway degrades to the unavailable-agent reply.
    #[error("Agent backend not configured: {0}")]
    NotConfigured(String),

    #[error("Backend request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Event stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Malformed backend event: {0}")]
    InvalidEvent(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApprovalError {
    #[error("No pending approval for session {session_id}")]
    NotFound { session_id: String },

    #[error("Invalid decision '{0}': expected one of approve, edit, reject")]
    InvalidDecision(String),

    #[error("An 'edit' decision requires edited_input")]
    MissingEditedInput,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("A turn is already running for session {session_id}")]
    TurnInProgress { session_id: String },

    #[error("Session {session_id} has a pending approval; resolve it before starting a new turn")]
    ApprovalPending { session_id: String },

    #[error("Session {session_id} has no decided approval to resume")]
    NothingToResume { session_id: String },
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    Query(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_error_displays_correctly() {
        let err = Error::Backend(BackendError::Api {
            status_code: 502,
            message: "upstream unavailable".into(),
        });
        assert!(err.to_string().contains("502"));
        assert!(err.to_string().contains("upstream unavailable"));
    }

    #[test]
    fn approval_error_displays_correctly() {
        let err = Error::Approval(ApprovalError::InvalidDecision("maybe".into()));
        assert!(err.to_string().contains("maybe"));
        assert!(err.to_string().contains("approve, edit, reject"));
    }

    #[test]
    fn session_error_names_the_session() {
        let err = SessionError::TurnInProgress {
            session_id: "s-1".into(),
        };
        assert!(err.to_string().contains("s-1"));

        let err = SessionError::NothingToResume {
            session_id: "s-2".into(),
        };
        assert!(err.to_string().contains("no decided approval"));
    }
}
