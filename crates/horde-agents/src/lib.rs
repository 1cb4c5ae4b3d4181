//! Agent state, fight resolution, monster scaling, and sanctions for the
//! Horde simulation.
//!
//! This crate contains the logic layer of the round resolution engine --
//! everything that operates on agent state without owning the round loop.
//! It sits between `horde-types` (the data structures) and `horde-core`
//! (decision collection and orchestration).
//!
//! # Modules
//!
//! - [`error`] -- Error types for roster operations ([`AgentError`])
//! - [`fight`] -- The fight resolver: tallies, cower healing, split damage, elimination
//! - [`leader`] -- Leader-role state: personality, reputation, sanction rounds
//! - [`roster`] -- The arena holding agent state, population, and channels ([`Roster`])
//! - [`sanctions`] -- Sanction ledger, duration policies, participation pruning
//! - [`scaling`] -- Monster health/damage and loot formulas
//! - [`stats`] -- Population statistics used by dynamic sanctions
//! - [`strategy`] -- The [`FightStrategy`] seam and per-agent handles

pub mod error;
pub mod fight;
pub mod leader;
pub mod roster;
pub mod sanctions;
pub mod scaling;
pub mod stats;
pub mod strategy;

// Re-export primary types at crate root for convenience.
pub use error::AgentError;
pub use fight::{FightOutcome, FightTally, cower_bonus, resolve_fight_round, tally_decisions};
pub use leader::{LeaderState, Personality};
pub use roster::Roster;
pub use sanctions::{SanctionActivity, SanctionLedger, SanctionPolicy, willingness_to_sanction};
pub use scaling::{DropSplit, ResilienceDelta, ScalingParams};
pub use stats::HpStats;
pub use strategy::{Agent, AgentHandle, DecisionReceiver, DecisionSender, FightStrategy, Population};
