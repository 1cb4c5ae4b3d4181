//! Shared type definitions for the Horde combat simulation.
//!
//! This crate is the single source of truth for the values that cross
//! crate boundaries: agent identities, per-agent combat state, the fight
//! actions agents commit to, and the read-only snapshot handed to every
//! decision task at the start of a round.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrapper for agent identities
//! - [`state`] -- Agent combat state, monster stats, and round snapshots
//! - [`actions`] -- Fight actions and the decision envelope

pub mod actions;
pub mod ids;
pub mod state;

// Re-export all public types at crate root for convenience.
pub use actions::{AgentMessage, Decision, FightAction};
pub use ids::AgentId;
pub use state::{AgentState, GameSnapshot, MonsterStats};
