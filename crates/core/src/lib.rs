//! # agentgate Core
//!
//! Domain types, traits, and error definitions for the agentgate streaming
//! and approval gateway. This crate has **zero framework dependencies**: it
//! defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is defined as a trait here. Implementations
//! live in their respective crates. This enables:
//! - Swapping the agent backend (simulated vs. live) via configuration
//! - Easy testing with scripted/in-memory implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod approval;
pub mod artifact;
pub mod backend;
pub mod context;
pub mod error;
pub mod memory;
pub mod message;
pub mod session;

// Re-export key types at crate root for ergonomics
pub use approval::{Decision, PendingApproval, Resolution, ResolutionStatus};
pub use artifact::{Artifact, ArtifactKind, ArtifactStore, StoredRecord};
pub use backend::{AgentBackend, BackendConfig, BackendEvent, BackendEventStream, BackendReply};
pub use context::{ProjectFile, PromptContextSource};
pub use error::{Error, Result};
pub use memory::{MemoryCandidate, MemoryEntry, MemoryStore};
pub use message::{Message, Role, SessionId};
pub use session::{
    SessionPatch, SessionState, SubagentResult, TodoItem, TodoStatus, TokenUsage, WorkspaceFile,
};
