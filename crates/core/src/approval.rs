//! Human-in-the-loop approval types.
//!
//! When the agent backend wants to perform a sensitive action it raises an
//! interrupt. The gateway parks it as a [`PendingApproval`] until a client
//! delivers a [`Decision`], which resolves into a [`Resolution`] that a
//! follow-up turn hands back to the backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApprovalError;

/// An action waiting for a human decision. At most one per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingApproval {
    pub session_id: String,
    pub tool: String,
    pub input: serde_json::Value,
    pub reason: String,
    pub requested_at: DateTime<Utc>,
}

/// A human decision on a pending approval.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Approve,
    Edit { input: serde_json::Value },
    Reject,
}

impl Decision {
    /// Parse a wire decision. `edited_input` is only consulted for `edit`.
    pub fn parse(
        kind: &str,
        edited_input: Option<serde_json::Value>,
    ) -> Result<Self, ApprovalError> {
        match kind.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            "edit" => match edited_input {
                Some(input) => Ok(Self::Edit { input }),
                None => Err(ApprovalError::MissingEditedInput),
            },
            _ => Err(ApprovalError::InvalidDecision(kind.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Edit { .. } => "edit",
            Self::Reject => "reject",
        }
    }
}

/// Outcome of a resolved approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionStatus {
    Resumed,
    Rejected,
}

/// Payload returned when a decision clears a pending approval.
///
/// Clients pass it back as `resume` on the next turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub decision: String,
    pub tool: String,
    pub status: ResolutionStatus,
    /// The input the tool should run with: the edited input for `edit`,
    /// otherwise the originally requested input.
    pub input: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_input: Option<serde_json::Value>,
}

impl Resolution {
    /// Resolve a pending approval with a decision.
    pub fn from_decision(pending: PendingApproval, decision: Decision) -> Self {
        let decision_name = decision.as_str().to_string();
        match decision {
            Decision::Approve => Self {
                decision: decision_name,
                tool: pending.tool,
                status: ResolutionStatus::Resumed,
                input: pending.input,
                edited_input: None,
            },
            Decision::Edit { input } => Self {
                decision: decision_name,
                tool: pending.tool,
                status: ResolutionStatus::Resumed,
                input: input.clone(),
                edited_input: Some(input),
            },
            Decision::Reject => Self {
                decision: decision_name,
                tool: pending.tool,
                status: ResolutionStatus::Rejected,
                input: pending.input,
                edited_input: None,
            },
        }
    }

    pub fn is_resumed(&self) -> bool {
        self.status == ResolutionStatus::Resumed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pending() -> PendingApproval {
        PendingApproval {
            session_id: "s1".into(),
            tool: "delete_file".into(),
            input: json!({"path": "/tmp/a"}),
            reason: "destructive".into(),
            requested_at: Utc::now(),
        }
    }

    #[test]
    fn parse_recognizes_three_decisions() {
        assert_eq!(Decision::parse("approve", None).unwrap(), Decision::Approve);
        assert_eq!(Decision::parse(" REJECT ", None).unwrap(), Decision::Reject);
        assert!(matches!(
            Decision::parse("edit", Some(json!({"path": "/tmp/b"}))).unwrap(),
            Decision::Edit { .. }
        ));
    }

    #[test]
    fn parse_rejects_unknown_decision() {
        assert_eq!(
            Decision::parse("maybe", None),
            Err(ApprovalError::InvalidDecision("maybe".into()))
        );
    }

    #[test]
    fn edit_without_input_is_rejected() {
        assert_eq!(
            Decision::parse("edit", None),
            Err(ApprovalError::MissingEditedInput)
        );
    }

    #[test]
    fn edit_resolution_carries_edited_input() {
        let edited = json!({"path": "/tmp/b"});
        let resolution = Resolution::from_decision(
            pending(),
            Decision::Edit {
                input: edited.clone(),
            },
        );
        assert_eq!(resolution.status, ResolutionStatus::Resumed);
        assert_eq!(resolution.edited_input, Some(edited.clone()));
        assert_eq!(resolution.input, edited);
    }

    #[test]
    fn reject_resolution_status() {
        let resolution = Resolution::from_decision(pending(), Decision::Reject);
        assert_eq!(resolution.status, ResolutionStatus::Rejected);
        assert_eq!(resolution.tool, "delete_file");
        let json = serde_json::to_string(&resolution).unwrap();
        assert!(json.contains(r#""status":"rejected""#));
        assert!(!json.contains("edited_input"));
    }
}
