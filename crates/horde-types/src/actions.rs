//! Fight actions and the decision envelope agents send to the orchestrator.
//!
//! Every decision task writes [`Decision`] values into its own channel. Only
//! [`Decision::Fight`] is terminal; [`Decision::Message`] carries chatter that
//! the collector reads past without acting on it.

use serde::{Deserialize, Serialize};

use crate::ids::AgentId;
use crate::state::AgentState;

/// The committed outcome of one agent's decision for the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FightAction {
    /// Commit attack and shield points to the collective fight.
    Attack {
        /// Points added to the round's total attack.
        attack: u32,
        /// Points added to the round's total defense.
        defend: u32,
    },
    /// Hold position without committing stats to the round totals.
    Defend,
    /// Sit the round out in exchange for a healing bonus.
    Cower,
}

impl FightAction {
    /// Full-strength strike: all of the agent's attack, no shield.
    pub const fn strike(state: &AgentState) -> Self {
        Self::Attack {
            attack: state.total_attack(),
            defend: 0,
        }
    }

    /// Shield wall: all of the agent's defense, no attack.
    pub const fn shield(state: &AgentState) -> Self {
        Self::Attack {
            attack: 0,
            defend: state.total_defense(),
        }
    }

    /// Whether this action opts out of combat.
    pub const fn is_cower(&self) -> bool {
        matches!(self, Self::Cower)
    }
}

impl core::fmt::Display for FightAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Attack { attack, defend } => write!(f, "attack({attack}/{defend})"),
            Self::Defend => write!(f, "defend"),
            Self::Cower => write!(f, "cower"),
        }
    }
}

/// Non-terminal traffic an agent may emit before committing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentMessage {
    /// An opinion about another agent, in the range -5..=5.
    Gossip {
        /// The agent being talked about.
        about: AgentId,
        /// Positive for praise, negative for blame.
        sentiment: i8,
    },
    /// A suggestion of what the group should do this round.
    Proposal {
        /// The proposed action.
        action: FightAction,
    },
}

/// Envelope carried on an agent's decision channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// The agent's terminal decision for the round.
    Fight(FightAction),
    /// Anything else; skipped by the collector.
    Message(AgentMessage),
}
