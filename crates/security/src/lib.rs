//! Security module for agentgate: audit logging.
//!
//! Every human-in-the-loop decision is security relevant: an approval lets
//! an agent perform a sensitive action. The gateway records approval
//! requests, decisions, refused turns and session evictions as structured
//! [`AuditEntry`] values and forwards them to one or more [`AuditSink`]s.

pub mod audit;

pub use audit::{AuditEntry, AuditEvent, AuditLogger, AuditOutcome, AuditSink, TracingSink};
