//! The turn runner: the heart of agentgate.
//!
//! A turn follows a **Compose → Stream → Post-process** cycle:
//!
//! 1. **Admit** the turn for its session (one in flight, none while an
//!    approval is pending)
//! 2. **Compose** the system prompt from instructions, project files,
//!    memories and content guidelines
//! 3. **Stream** backend events, translating each into one wire event
//! 4. **Pause** on an interrupt, parking the action for a human decision
//! 5. **Finish** by extracting artifacts and a memory candidate
//!
//! Turns whose backend is not configured still complete, with a labeled
//! fallback reply.

pub mod composer;
pub mod fallback;
pub mod subagents;
pub mod turn;
pub mod wire_event;

pub use composer::{ContextComposer, ContextLimits, FilterLevel};
pub use fallback::{fallback_reply, FALLBACK_LABEL};
pub use subagents::{catalog, SubagentDescriptor};
pub use turn::{TurnRequest, TurnResult, TurnRunner, TurnSettings, TurnStatus};
pub use wire_event::WireEvent;
