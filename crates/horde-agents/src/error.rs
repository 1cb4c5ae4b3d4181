//! Error types for the horde-agents crate.
//!
//! Roster operations that can fail return typed errors rather than
//! panicking. Reading a channel for an agent that is no longer registered
//! is a contract violation; callers propagate it and abort the game.

use horde_types::AgentId;

/// Errors that can occur during roster and channel operations.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Agent with the given ID is not registered in the roster.
    #[error("agent not registered: {0}")]
    AgentNotFound(AgentId),

    /// An agent with the given ID is already registered.
    #[error("duplicate agent: {0}")]
    DuplicateAgent(AgentId),
}
