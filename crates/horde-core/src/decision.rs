//! Decision dispatch and collection.
//!
//! During the Collect phase the orchestrator spawns one task per
//! participating agent. Each task runs the agent's
//! [`FightStrategy`](horde_agents::FightStrategy) against a shared snapshot
//! and writes into the agent's own channel. The collector then reads every
//! channel in turn, passing over [`Decision::Message`] envelopes until it
//! reaches the agent's terminal [`Decision::Fight`].
//!
//! Tasks never talk to each other and the resulting map is keyed by
//! identity, so the order in which tasks finish has no effect on the result.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use horde_agents::{AgentError, AgentHandle, Roster};
use horde_types::{AgentId, AgentMessage, Decision, FightAction, GameSnapshot};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Errors that can occur during the decision phase.
#[derive(Debug, thiserror::Error)]
pub enum DecisionError {
    /// The agent did not commit within the deadline.
    #[error("agent {agent_id} timed out (deadline: {deadline_ms}ms)")]
    Timeout {
        /// The agent that timed out.
        agent_id: AgentId,
        /// The deadline in milliseconds.
        deadline_ms: u64,
    },

    /// Every sender for the agent's channel is gone.
    #[error("decision channel for agent {agent_id} closed before a decision arrived")]
    ChannelClosed {
        /// The agent whose channel closed.
        agent_id: AgentId,
    },

    /// The orchestrator asked for an agent the roster does not hold.
    #[error("roster error: {source}")]
    Roster {
        /// The underlying roster error.
        #[from]
        source: AgentError,
    },
}

/// What the collector read this round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedDecisions {
    /// One terminal action per participating agent.
    pub actions: BTreeMap<AgentId, FightAction>,
    /// Non-terminal messages, in the order each agent sent them.
    pub messages: BTreeMap<AgentId, Vec<AgentMessage>>,
    /// Envelopes left over from earlier rounds and discarded unread.
    pub stale_discarded: usize,
}

impl CollectedDecisions {
    /// Total number of non-terminal messages read.
    pub fn message_count(&self) -> usize {
        self.messages.values().map(Vec::len).sum()
    }
}

/// Dispatch one decision task per participant and gather their actions.
///
/// Stale envelopes from previous rounds are discarded first. With a
/// `deadline`, the whole collection shares a single cut-off: an agent that
/// has not committed by then aborts the round with
/// [`DecisionError::Timeout`]. Without one, the collector waits
/// indefinitely.
///
/// # Errors
///
/// Returns [`DecisionError::Roster`] if a participant is not registered,
/// [`DecisionError::ChannelClosed`] if its channel is gone, or
/// [`DecisionError::Timeout`] if the deadline passes.
pub async fn collect_decisions(
    roster: &mut Roster,
    participants: &[AgentId],
    snapshot: GameSnapshot,
    deadline: Option<Duration>,
) -> Result<CollectedDecisions, DecisionError> {
    let stale_discarded = roster.drain_stale();
    let snapshot = Arc::new(snapshot);

    for &agent_id in participants {
        let agent = roster
            .agent(agent_id)
            .ok_or(AgentError::AgentNotFound(agent_id))?;
        let strategy = Arc::clone(&agent.strategy);
        let handle = AgentHandle::new(agent_id, roster.outbox(agent_id)?);
        let snapshot = Arc::clone(&snapshot);
        tokio::spawn(async move {
            strategy.handle_fight(&snapshot, &handle);
        });
    }

    let cutoff = deadline.and_then(|d| Instant::now().checked_add(d).map(|at| (at, d)));
    let mut collected = CollectedDecisions {
        stale_discarded,
        ..CollectedDecisions::default()
    };

    for &agent_id in participants {
        let inbox = roster.inbox_mut(agent_id)?;
        let action = loop {
            let received = match cutoff {
                Some((at, limit)) => tokio::time::timeout_at(at, inbox.recv())
                    .await
                    .map_err(|elapsed| {
                        warn!(agent_id = %agent_id, %elapsed, "agent missed the decision deadline");
                        DecisionError::Timeout {
                            agent_id,
                            deadline_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                        }
                    })?,
                None => inbox.recv().await,
            };
            match received {
                Some(Decision::Fight(action)) => break action,
                Some(Decision::Message(message)) => {
                    debug!(agent_id = %agent_id, ?message, "message received");
                    collected
                        .messages
                        .entry(agent_id)
                        .or_default()
                        .push(message);
                }
                None => return Err(DecisionError::ChannelClosed { agent_id }),
            }
        };
        collected.actions.insert(agent_id, action);
    }

    debug!(
        decisions = collected.actions.len(),
        messages = collected.message_count(),
        stale = stale_discarded,
        "decisions collected"
    );
    Ok(collected)
}
