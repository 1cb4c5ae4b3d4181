//! Decision collection, round orchestration, and the game loop for the Horde
//! simulation.
//!
//! Each round runs in four phases: Prune, Collect, Resolve, and Feedback.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `horde-config.yaml` into
//!   strongly-typed structs.
//! - [`decision`] -- The per-agent task dispatcher and channel collector.
//! - [`round`] -- One round: sanctions, collection, resolution, monster damage.
//! - [`runner`] -- Levels, leadership, loot, and the end-of-game outcome.

pub mod config;
pub mod decision;
pub mod round;
pub mod runner;
