//! The roster: one arena for everything keyed by a live agent's identity.
//!
//! Three maps describe a live agent -- its [`AgentState`], its [`Agent`]
//! entry in the population, and the two ends of its decision channel. They
//! live together here so that [`Roster::eliminate`] is the only way to drop
//! an agent, and it drops all three at once. No later dispatch can reach an
//! eliminated agent and no stale send can land in a registry slot.
//!
//! The roster keeps its own clone of every sender. A decision task that
//! returns without committing therefore leaves the channel open, and the
//! collector keeps waiting instead of mistaking a dropped sender for a
//! decision.

use std::collections::BTreeMap;

use horde_types::{AgentId, AgentState, GameSnapshot, MonsterStats};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::AgentError;
use crate::strategy::{Agent, DecisionReceiver, DecisionSender, Population};

/// Both ends of one agent's decision channel.
#[derive(Debug)]
struct ChannelPair {
    outbox: DecisionSender,
    inbox: DecisionReceiver,
}

/// Agent state, population, and channel registry for all live agents.
#[derive(Debug, Default)]
pub struct Roster {
    states: BTreeMap<AgentId, AgentState>,
    population: Population,
    channels: BTreeMap<AgentId, ChannelPair>,
}

impl Roster {
    /// Create an empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new agent with its starting state and a fresh channel.
    pub fn enlist(&mut self, agent: Agent, state: AgentState) -> Result<(), AgentError> {
        let id = agent.id;
        if self.population.contains_key(&id) {
            return Err(AgentError::DuplicateAgent(id));
        }
        let (outbox, inbox) = mpsc::unbounded_channel();
        self.states.insert(id, state);
        self.population.insert(id, agent);
        self.channels.insert(id, ChannelPair { outbox, inbox });
        Ok(())
    }

    /// Remove an agent's state, population entry, and both channel handles.
    ///
    /// Returns `false` if the agent was not registered.
    pub fn eliminate(&mut self, id: AgentId) -> bool {
        let state = self.states.remove(&id);
        let agent = self.population.remove(&id);
        let channel = self.channels.remove(&id);
        let removed = state.is_some() || agent.is_some() || channel.is_some();
        if removed {
            debug!(agent_id = %id, "agent removed from roster");
        }
        removed
    }

    /// Number of live agents.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether no agent is alive.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Whether the agent is registered.
    pub fn contains(&self, id: AgentId) -> bool {
        self.population.contains_key(&id)
    }

    /// Identities of every live agent, in identity order.
    pub fn ids(&self) -> Vec<AgentId> {
        self.population.keys().copied().collect()
    }

    /// Read-only view of the state map.
    pub const fn states(&self) -> &BTreeMap<AgentId, AgentState> {
        &self.states
    }

    /// One agent's state.
    pub fn state(&self, id: AgentId) -> Option<&AgentState> {
        self.states.get(&id)
    }

    /// Mutable state map. Only the fight resolver writes through this.
    pub(crate) const fn states_mut(&mut self) -> &mut BTreeMap<AgentId, AgentState> {
        &mut self.states
    }

    /// Read-only view of the population map.
    pub const fn population(&self) -> &Population {
        &self.population
    }

    /// One agent's population entry.
    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.population.get(&id)
    }

    /// A new sender for the agent's decision channel.
    pub fn outbox(&self, id: AgentId) -> Result<DecisionSender, AgentError> {
        self.channels
            .get(&id)
            .map(|pair| pair.outbox.clone())
            .ok_or(AgentError::AgentNotFound(id))
    }

    /// The receiving end of the agent's decision channel.
    pub fn inbox_mut(&mut self, id: AgentId) -> Result<&mut DecisionReceiver, AgentError> {
        self.channels
            .get_mut(&id)
            .map(|pair| &mut pair.inbox)
            .ok_or(AgentError::AgentNotFound(id))
    }

    /// Discard anything left in the decision channels.
    ///
    /// Called before each dispatch so that messages sent after last round's
    /// terminal decision are never read as this round's. Returns how many
    /// envelopes were dropped.
    pub fn drain_stale(&mut self) -> usize {
        let mut drained: usize = 0;
        for (id, pair) in &mut self.channels {
            while let Ok(stale) = pair.inbox.try_recv() {
                debug!(agent_id = %id, ?stale, "discarding stale decision envelope");
                drained = drained.saturating_add(1);
            }
        }
        drained
    }

    /// Snapshot of the game as every decision task will see it this round.
    pub fn snapshot(&self, level: u32, round: u32, monster: MonsterStats) -> GameSnapshot {
        GameSnapshot {
            level,
            round,
            monster,
            agent_states: self.states.clone(),
        }
    }
}
