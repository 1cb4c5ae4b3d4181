//! Sanction ledger and participation pruning.
//!
//! Each agent is either unsanctioned or sanctioned with a positive number of
//! rounds remaining. A leader holds one [`SanctionLedger`]; with persistent
//! sanctions the same ledger passes from leader to leader.
//!
//! Per round the ledger is driven in this order:
//!
//! 1. [`SanctionLedger::advance`] decrements every active entry and purges
//!    the ones that reach zero. Released agents are eligible this round and
//!    are not reconsidered until the next one.
//! 2. [`SanctionLedger::consider`] runs for every other unsanctioned agent.
//! 3. [`SanctionLedger::prune_agent_list`] filters the population.

use std::collections::{BTreeMap, BTreeSet};

use horde_types::AgentId;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::stats::{HpBand, HpStats};
use crate::strategy::Population;

/// Weight of the leader's personality in the willingness score.
const PERSONALITY_WEIGHT: f64 = 0.8;

/// Weight of the shifted reputation in the willingness score.
const REPUTATION_WEIGHT: f64 = 0.2;

/// Reputation value that contributes nothing to the willingness score.
const REPUTATION_MIDPOINT: f64 = 50.0;

/// Divisor applied to the shifted reputation.
const REPUTATION_SCALE: f64 = 3.0;

/// An active sanction on one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanctionActivity {
    /// Rounds left before the agent participates again.
    pub remaining: u32,
    /// Whether the sanction still excludes the agent.
    pub active: bool,
}

impl SanctionActivity {
    /// Start a sanction. A zero duration is inactive from the outset.
    pub const fn begin(duration: u32) -> Self {
        Self {
            remaining: duration,
            active: duration > 0,
        }
    }

    /// Count down one round. Deactivates on reaching zero.
    pub const fn tick(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
        self.active = self.remaining > 0;
    }
}

/// How a freshly assigned sanction's duration is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum SanctionPolicy {
    /// Always the same number of rounds.
    Fixed {
        /// Rounds per sanction.
        duration: u32,
    },
    /// One round longer than the previous sanction, up to a cap.
    Graduated {
        /// Longest sanction this policy will assign.
        max: u32,
    },
    /// The previous duration nudged by the agent's Hp relative to the
    /// population.
    Dynamic {
        /// Duration used when the agent has never been sanctioned.
        initial: u32,
    },
}

impl Default for SanctionPolicy {
    fn default() -> Self {
        Self::Fixed { duration: 3 }
    }
}

impl SanctionPolicy {
    /// Duration for an agent whose most recent sanction lasted `previous`.
    pub fn duration(self, previous: Option<u32>, hp: u32, stats: &HpStats) -> u32 {
        match self {
            Self::Fixed { duration } => duration,
            Self::Graduated { max } => previous.map_or(1, |p| p.saturating_add(1)).min(max),
            Self::Dynamic { initial } => previous.map_or(initial, |p| match stats.band(hp) {
                HpBand::Above => p.saturating_add(1),
                HpBand::Below => p.saturating_sub(1),
                HpBand::Within => p,
            }),
        }
    }
}

/// Willingness of a leader to sanction an agent, on the same 0..100 scale as
/// the sanction draw.
///
/// Only defectors can score above zero. Reputation above 50 raises the score
/// and below 50 lowers it.
#[allow(clippy::cast_possible_truncation)]
pub fn willingness_to_sanction(defector: bool, personality: u32, reputation: u32) -> i32 {
    if !defector {
        return 0;
    }
    let shifted = (f64::from(reputation) - REPUTATION_MIDPOINT) / REPUTATION_SCALE;
    let score = PERSONALITY_WEIGHT.mul_add(f64::from(personality), REPUTATION_WEIGHT * shifted);
    score.floor() as i32
}

/// Active sanctions, sanction history and the eligible-population filter.
#[derive(Debug, Clone, Default)]
pub struct SanctionLedger {
    policy: SanctionPolicy,
    active: BTreeMap<AgentId, SanctionActivity>,
    history: BTreeMap<AgentId, u32>,
    issued: u64,
}

impl SanctionLedger {
    /// Create an empty ledger using the given duration policy.
    pub fn new(policy: SanctionPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// The configured duration policy.
    pub const fn policy(&self) -> SanctionPolicy {
        self.policy
    }

    /// Count every active sanction down by one round.
    ///
    /// Returns the agents whose sanction ended this round.
    pub fn advance(&mut self) -> BTreeSet<AgentId> {
        let mut released = BTreeSet::new();
        self.active.retain(|id, activity| {
            activity.tick();
            if !activity.active {
                released.insert(*id);
            }
            activity.active
        });
        for id in &released {
            debug!(agent_id = %id, "sanction expired");
        }
        released
    }

    /// Decide whether to sanction one agent.
    ///
    /// `draw` is a uniform value in `0..100`; the agent is sanctioned when it
    /// does not exceed `score`. Returns the assigned duration, which may be
    /// zero. Agents already under sanction are left alone.
    pub fn consider(
        &mut self,
        id: AgentId,
        score: i32,
        draw: u32,
        hp: u32,
        stats: &HpStats,
    ) -> Option<u32> {
        if self.is_sanctioned(id) || i64::from(draw) > i64::from(score) {
            return None;
        }
        let previous = self.history.get(&id).copied();
        let duration = self.policy.duration(previous, hp, stats);
        self.history.insert(id, duration);
        let activity = SanctionActivity::begin(duration);
        if activity.active {
            self.active.insert(id, activity);
            self.issued = self.issued.saturating_add(1);
        }
        debug!(agent_id = %id, score, draw, duration, "sanction assigned");
        Some(duration)
    }

    /// Whether the agent is currently excluded.
    pub fn is_sanctioned(&self, id: AgentId) -> bool {
        self.active.contains_key(&id)
    }

    /// Whether the agent stays excluded once the coming round's
    /// [`advance`](Self::advance) has run.
    pub fn excluded_after_advance(&self, id: AgentId) -> bool {
        self.active.get(&id).is_some_and(|activity| activity.remaining > 1)
    }

    /// The agent's active sanction, if any.
    pub fn activity(&self, id: AgentId) -> Option<SanctionActivity> {
        self.active.get(&id).copied()
    }

    /// Duration of the agent's most recent sanction, including zero-length
    /// ones.
    pub fn last_duration(&self, id: AgentId) -> Option<u32> {
        self.history.get(&id).copied()
    }

    /// Number of sanctions that excluded an agent for at least one round.
    pub const fn issued(&self) -> u64 {
        self.issued
    }

    /// Number of agents currently excluded.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// The agents with no active sanction.
    ///
    /// Leaves both the ledger and `population` untouched; calling it twice
    /// gives the same answer.
    pub fn prune_agent_list(&self, population: &Population) -> Population {
        population
            .iter()
            .filter(|(id, _)| !self.is_sanctioned(**id))
            .map(|(id, agent)| (*id, agent.clone()))
            .collect()
    }

    /// Drop every record of eliminated agents.
    pub fn forget(&mut self, ids: &[AgentId]) {
        for id in ids {
            self.active.remove(id);
            self.history.remove(id);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use horde_types::GameSnapshot;

    use super::*;
    use crate::strategy::{Agent, AgentHandle, FightStrategy};

    struct Idle;

    impl FightStrategy for Idle {
        fn handle_fight(&self, _snapshot: &GameSnapshot, _me: &AgentHandle) {}
    }

    fn population(n: usize) -> Population {
        (0..n)
            .map(|_| {
                let agent = Agent::new(AgentId::new(), Arc::new(Idle));
                (agent.id, agent)
            })
            .collect()
    }

    fn flat() -> HpStats {
        HpStats::from_values(&[100, 100])
    }

    #[test]
    fn willingness_needs_a_defector() {
        assert_eq!(willingness_to_sanction(false, 100, 100), 0);
        assert_eq!(willingness_to_sanction(true, 50, 50), 40);
        // 0.8*25 + 0.2*(80-50)/3 = 22
        assert_eq!(willingness_to_sanction(true, 25, 80), 22);
        // 0.8*0 + 0.2*(0-50)/3 = -3.33 floors to -4
        assert_eq!(willingness_to_sanction(true, 0, 0), -4);
    }

    #[test]
    fn draw_above_score_spares_the_agent() {
        let mut ledger = SanctionLedger::new(SanctionPolicy::Fixed { duration: 3 });
        let id = AgentId::new();
        assert_eq!(ledger.consider(id, 40, 41, 100, &flat()), None);
        assert!(!ledger.is_sanctioned(id));
        assert_eq!(ledger.consider(id, 40, 40, 100, &flat()), Some(3));
        assert!(ledger.is_sanctioned(id));
        assert_eq!(ledger.issued(), 1);
    }

    #[test]
    fn fixed_three_excludes_for_three_rounds() {
        let pop = population(2);
        let target = *pop.keys().next().unwrap();
        let mut ledger = SanctionLedger::new(SanctionPolicy::Fixed { duration: 3 });

        // round r
        assert!(ledger.advance().is_empty());
        ledger.consider(target, 100, 0, 100, &flat());
        assert!(!ledger.prune_agent_list(&pop).contains_key(&target));

        // rounds r+1, r+2
        for _ in 0..2 {
            assert!(ledger.advance().is_empty());
            assert!(!ledger.prune_agent_list(&pop).contains_key(&target));
        }

        // round r+3
        let released = ledger.advance();
        assert!(released.contains(&target));
        assert!(ledger.prune_agent_list(&pop).contains_key(&target));
    }

    #[test]
    fn last_sanctioned_round_is_not_carried_past_advance() {
        let mut ledger = SanctionLedger::new(SanctionPolicy::Fixed { duration: 3 });
        let id = AgentId::new();
        ledger.consider(id, 100, 0, 100, &flat());
        assert!(ledger.excluded_after_advance(id));

        ledger.advance();
        assert!(ledger.excluded_after_advance(id));
        ledger.advance();
        assert!(ledger.is_sanctioned(id));
        assert!(!ledger.excluded_after_advance(id));

        ledger.advance();
        assert!(!ledger.is_sanctioned(id));
        assert!(!ledger.excluded_after_advance(id));
    }

    #[test]
    fn zero_duration_is_recorded_but_not_active() {
        let mut ledger = SanctionLedger::new(SanctionPolicy::Fixed { duration: 0 });
        let id = AgentId::new();
        assert_eq!(ledger.consider(id, 100, 0, 100, &flat()), Some(0));
        assert!(!ledger.is_sanctioned(id));
        assert_eq!(ledger.last_duration(id), Some(0));
        assert_eq!(ledger.issued(), 0);
    }

    #[test]
    fn sanctioned_agent_is_not_reconsidered() {
        let mut ledger = SanctionLedger::new(SanctionPolicy::Fixed { duration: 2 });
        let id = AgentId::new();
        ledger.consider(id, 100, 0, 100, &flat());
        assert_eq!(ledger.consider(id, 100, 0, 100, &flat()), None);
        assert_eq!(ledger.activity(id).unwrap().remaining, 2);
    }

    #[test]
    fn graduated_grows_to_cap() {
        let policy = SanctionPolicy::Graduated { max: 3 };
        let stats = flat();
        assert_eq!(policy.duration(None, 100, &stats), 1);
        assert_eq!(policy.duration(Some(1), 100, &stats), 2);
        assert_eq!(policy.duration(Some(3), 100, &stats), 3);
        assert_eq!(policy.duration(Some(7), 100, &stats), 3);
    }

    #[test]
    fn dynamic_follows_hp_band() {
        let policy = SanctionPolicy::Dynamic { initial: 4 };
        // mean 5, std dev 2
        let stats = HpStats::from_values(&[2, 4, 4, 4, 5, 5, 7, 9]);
        assert_eq!(policy.duration(None, 9, &stats), 4);
        assert_eq!(policy.duration(Some(2), 7, &stats), 3);
        assert_eq!(policy.duration(Some(2), 3, &stats), 1);
        assert_eq!(policy.duration(Some(2), 5, &stats), 2);
        assert_eq!(policy.duration(Some(0), 1, &stats), 0);
    }

    #[test]
    fn prune_is_pure_and_repeatable() {
        let pop = population(5);
        let target = *pop.keys().nth(2).unwrap();
        let mut ledger = SanctionLedger::new(SanctionPolicy::Fixed { duration: 5 });
        ledger.consider(target, 100, 0, 100, &flat());

        let before: Vec<AgentId> = pop.keys().copied().collect();
        let first = ledger.prune_agent_list(&pop);
        let second = ledger.prune_agent_list(&pop);

        assert_eq!(pop.keys().copied().collect::<Vec<_>>(), before);
        assert_eq!(
            first.keys().collect::<Vec<_>>(),
            second.keys().collect::<Vec<_>>()
        );
        assert_eq!(first.len(), 4);
        assert_eq!(ledger.activity(target).unwrap().remaining, 5);
    }

    #[test]
    fn forget_clears_eliminated_agents() {
        let mut ledger = SanctionLedger::new(SanctionPolicy::Fixed { duration: 5 });
        let id = AgentId::new();
        ledger.consider(id, 100, 0, 100, &flat());
        ledger.forget(&[id]);
        assert!(!ledger.is_sanctioned(id));
        assert_eq!(ledger.last_duration(id), None);
    }

    #[test]
    fn policy_parses_from_tagged_json() {
        let policy: SanctionPolicy =
            serde_json::from_str(r#"{"policy":"graduated","max":4}"#).unwrap();
        assert_eq!(policy, SanctionPolicy::Graduated { max: 4 });
    }
}
