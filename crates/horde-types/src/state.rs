//! Per-agent combat state, monster stats, and the round snapshot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::AgentId;

/// Mutable combat state for a single live agent.
///
/// One entry exists per live agent. The fight resolver is the only writer;
/// an entry is removed the moment `hp` reaches exactly 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AgentState {
    /// Current health points. Never negative; damage saturates at 0.
    pub hp: u32,
    /// Base attack rating.
    pub attack: u32,
    /// Base defense rating.
    pub defense: u32,
    /// Attack granted by equipped weapons.
    pub bonus_attack: u32,
    /// Defense granted by equipped shields.
    pub bonus_defense: u32,
}

impl AgentState {
    /// Create a fresh state with no equipment bonuses.
    pub const fn new(hp: u32, attack: u32, defense: u32) -> Self {
        Self {
            hp,
            attack,
            defense,
            bonus_attack: 0,
            bonus_defense: 0,
        }
    }

    /// Base attack plus weapon bonus.
    pub const fn total_attack(&self) -> u32 {
        self.attack.saturating_add(self.bonus_attack)
    }

    /// Base defense plus shield bonus.
    pub const fn total_defense(&self) -> u32 {
        self.defense.saturating_add(self.bonus_defense)
    }
}

/// The monster guarding one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonsterStats {
    /// The level (1-based) this monster guards.
    pub level: u32,
    /// Remaining resilience. Reduced by each round's total attack; the level
    /// is cleared when it reaches 0.
    pub health: u32,
    /// Damage dealt to the population every round, split evenly.
    pub damage: u32,
}

/// Read-only view of the game handed to every decision task.
///
/// Built once at round start and shared behind an `Arc`, so every agent
/// decides against the same state regardless of scheduling order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSnapshot {
    /// Current level (1-based).
    pub level: u32,
    /// Round within the current level (1-based).
    pub round: u32,
    /// The monster as it stands at round start.
    pub monster: MonsterStats,
    /// Combat state of every live agent.
    pub agent_states: BTreeMap<AgentId, AgentState>,
}

impl GameSnapshot {
    /// Look up one agent's state in the snapshot.
    pub fn agent(&self, id: AgentId) -> Option<&AgentState> {
        self.agent_states.get(&id)
    }

    /// Number of live agents at round start.
    pub fn live_count(&self) -> usize {
        self.agent_states.len()
    }
}
