//! The seam between the round engine and agent behavior.
//!
//! A [`FightStrategy`] is invoked once per live agent per round, on its own
//! task, with a shared [`GameSnapshot`] and an [`AgentHandle`]. The handle
//! wraps the sending half of the agent's decision channel; the receiving
//! half stays in the [`Roster`](crate::roster::Roster).

use std::collections::BTreeMap;
use std::sync::Arc;

use horde_types::{AgentId, AgentMessage, Decision, FightAction, GameSnapshot};
use tokio::sync::mpsc;
use tracing::warn;

use crate::leader::Personality;

/// Sending half of an agent's decision channel.
pub type DecisionSender = mpsc::UnboundedSender<Decision>;

/// Receiving half of an agent's decision channel.
pub type DecisionReceiver = mpsc::UnboundedReceiver<Decision>;

/// Identity map of every live agent.
pub type Population = BTreeMap<AgentId, Agent>;

/// Agent behavior for the fight phase.
///
/// Implementations must eventually commit exactly one terminal decision per
/// invocation through [`AgentHandle::commit`]; they may [`inform`] any number
/// of times before that. An implementation that never commits stalls the
/// round unless the orchestrator runs with a decision deadline.
///
/// Strategies run concurrently with each other. Any state they mutate must
/// be guarded by a lock scoped to the strategy instance.
///
/// [`inform`]: AgentHandle::inform
pub trait FightStrategy: Send + Sync + 'static {
    /// Decide this round's action for the agent behind `me`.
    fn handle_fight(&self, snapshot: &GameSnapshot, me: &AgentHandle);

    /// Personality preset the agent brings to the leader role.
    fn personality(&self) -> Personality {
        Personality::Collective
    }

    /// Short label for logs.
    fn label(&self) -> &'static str {
        "strategy"
    }
}

/// An agent: identity plus a shared handle to its behavior.
#[derive(Clone)]
pub struct Agent {
    /// The agent's identity.
    pub id: AgentId,
    /// The agent's behavior.
    pub strategy: Arc<dyn FightStrategy>,
}

impl Agent {
    /// Pair an identity with a strategy.
    pub fn new(id: AgentId, strategy: Arc<dyn FightStrategy>) -> Self {
        Self { id, strategy }
    }
}

impl core::fmt::Debug for Agent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("strategy", &self.strategy.label())
            .finish()
    }
}

/// What a decision task knows about itself: its identity and its outbox.
#[derive(Debug, Clone)]
pub struct AgentHandle {
    id: AgentId,
    outbox: DecisionSender,
}

impl AgentHandle {
    /// Build a handle around an agent's decision sender.
    pub const fn new(id: AgentId, outbox: DecisionSender) -> Self {
        Self { id, outbox }
    }

    /// The agent's identity.
    pub const fn id(&self) -> AgentId {
        self.id
    }

    /// Send a non-terminal message.
    ///
    /// Returns `false` if the orchestrator has dropped the channel (the agent
    /// was eliminated).
    pub fn inform(&self, message: AgentMessage) -> bool {
        self.send(Decision::Message(message))
    }

    /// Commit the terminal decision for this round.
    ///
    /// Returns `false` if the orchestrator has dropped the channel.
    pub fn commit(&self, action: FightAction) -> bool {
        self.send(Decision::Fight(action))
    }

    fn send(&self, decision: Decision) -> bool {
        if self.outbox.send(decision).is_err() {
            warn!(agent_id = %self.id, "decision channel closed, message dropped");
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_reaches_receiver_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = AgentId::new();
        let handle = AgentHandle::new(id, tx);

        assert!(handle.inform(AgentMessage::Proposal {
            action: FightAction::Defend
        }));
        assert!(handle.commit(FightAction::Cower));

        assert!(matches!(rx.try_recv(), Ok(Decision::Message(_))));
        assert_eq!(rx.try_recv().ok(), Some(Decision::Fight(FightAction::Cower)));
    }

    #[test]
    fn send_after_receiver_dropped_reports_false() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let handle = AgentHandle::new(AgentId::new(), tx);
        assert!(!handle.commit(FightAction::Cower));
    }
}
