//! Per-session state for the agentgate gateway.
//!
//! - [`SessionStore`]: todos, workspace files, delegation results and token
//!   counters per session, read by polling clients.
//! - [`ApprovalGate`]: the single pending human decision per session.
//! - [`TurnGuard`]: at most one in-flight turn per session.
//! - [`SessionHub`]: all three under one [`RetentionPolicy`].
//!
//! Everything is in-process. Nothing survives a restart.

pub mod approval;
pub mod retention;
pub mod store;
pub mod turn_guard;

pub use approval::ApprovalGate;
pub use retention::{RetentionPolicy, SessionHub, TurnAdmission};
pub use store::SessionStore;
pub use turn_guard::{TurnGuard, TurnPermit};
