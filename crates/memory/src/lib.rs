//! In-process collaborator implementations for agentgate.
//!
//! Production deployments back these traits with a relational store; the
//! implementations here keep everything in memory.

pub mod in_memory;
pub mod noop;
pub mod static_context;

pub use in_memory::{InMemoryStore, SavedArtifact};
pub use noop::NoopStore;
pub use static_context::StaticContext;
