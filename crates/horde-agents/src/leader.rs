//! Leader-role state: personality, reputation, defectors, and the sanction
//! ledger the leader enforces.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Mutex, PoisonError};

use horde_types::{AgentId, AgentState, FightAction};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::sanctions::{SanctionLedger, willingness_to_sanction};
use crate::stats::HpStats;
use crate::strategy::Population;

/// Upper bound of the personality and reputation scales.
pub const SCALE_MAX: u32 = 100;

/// Reputation every agent starts with.
pub const REPUTATION_START: u32 = 50;

/// Reputation gained for contributing attack in a round.
const REPUTATION_GAIN: u32 = 2;

/// Reputation lost for cowering in a round.
const REPUTATION_LOSS: u32 = 5;

/// Rounds of the leader's own Hp kept for the personality trend.
const HP_WINDOW: usize = 3;

/// Scale applied to the percentage change in average Hp.
const PERSONALITY_ALPHA: f64 = 5.0;

/// Largest personality change in one round.
const PERSONALITY_SWING: f64 = 5.0;

/// Starting personality presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Personality {
    /// Rarely sanctions.
    Selfish,
    /// The neutral preset.
    Collective,
    /// Sanctions defectors readily.
    Selfless,
}

impl Personality {
    /// Default score for the preset.
    pub const fn default_score(self) -> u32 {
        match self {
            Self::Selfish => 25,
            Self::Collective => 50,
            Self::Selfless => 75,
        }
    }
}

/// Everything the current leader tracks across rounds.
///
/// The game loop is the only writer and holds `&mut LeaderState`. The
/// personality score is the one aggregate other threads may read through a
/// shared reference, so it sits behind its own lock.
#[derive(Debug)]
pub struct LeaderState {
    id: AgentId,
    /// Running personality score, readable through `&self` from any thread.
    personality: Mutex<u32>,
    personality_updates: bool,
    reputation: BTreeMap<AgentId, u32>,
    defectors: BTreeSet<AgentId>,
    hp_window: VecDeque<u32>,
    last_change: f64,
    ledger: SanctionLedger,
}

impl LeaderState {
    /// Install `id` as leader with a starting personality score.
    ///
    /// `reference_hp` seeds the Hp trend window so the first rounds compare
    /// against a full-health baseline.
    pub fn new(id: AgentId, personality: u32, reference_hp: u32, ledger: SanctionLedger) -> Self {
        Self {
            id,
            personality: Mutex::new(personality.min(SCALE_MAX)),
            personality_updates: true,
            reputation: BTreeMap::new(),
            defectors: BTreeSet::new(),
            hp_window: std::iter::repeat_n(reference_hp, HP_WINDOW).collect(),
            last_change: 0.0,
            ledger,
        }
    }

    /// Enable or disable the personality drift.
    #[must_use]
    pub const fn with_personality_updates(mut self, enabled: bool) -> Self {
        self.personality_updates = enabled;
        self
    }

    /// The leader's identity.
    pub const fn id(&self) -> AgentId {
        self.id
    }

    /// Current personality score in `0..=100`.
    pub fn personality(&self) -> u32 {
        *self.personality.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The leader's view of an agent's reputation.
    pub fn reputation(&self, id: AgentId) -> u32 {
        self.reputation.get(&id).copied().unwrap_or(REPUTATION_START)
    }

    /// Whether the agent cowered in the last observed round.
    pub fn is_defector(&self, id: AgentId) -> bool {
        self.defectors.contains(&id)
    }

    /// The sanction ledger this leader enforces.
    pub const fn ledger(&self) -> &SanctionLedger {
        &self.ledger
    }

    /// Step down, handing the ledger back.
    pub fn into_ledger(self) -> SanctionLedger {
        self.ledger
    }

    /// Expire finished sanctions and decide new ones for this round.
    ///
    /// Agents released this round and the leader itself are not considered.
    /// Returns the newly assigned durations, zero-length ones included.
    pub fn run_sanctions<R: Rng + ?Sized>(
        &mut self,
        states: &BTreeMap<AgentId, AgentState>,
        rng: &mut R,
    ) -> Vec<(AgentId, u32)> {
        let released = self.ledger.advance();
        let stats = HpStats::from_states(states);
        let personality = self.personality();

        let mut assigned = Vec::new();
        for (id, state) in states {
            if *id == self.id || released.contains(id) || self.ledger.is_sanctioned(*id) {
                continue;
            }
            let score =
                willingness_to_sanction(self.is_defector(*id), personality, self.reputation(*id));
            let draw = rng.random_range(0..SCALE_MAX);
            if let Some(duration) = self.ledger.consider(*id, score, draw, state.hp, &stats) {
                assigned.push((*id, duration));
            }
        }
        if !assigned.is_empty() {
            info!(
                leader = %self.id,
                count = assigned.len(),
                released = released.len(),
                "sanctions assigned"
            );
        }
        assigned
    }

    /// Agents the leader lets take part this round.
    pub fn prune(&self, population: &Population) -> Population {
        self.ledger.prune_agent_list(population)
    }

    /// Fold a round's committed actions into reputation and defector flags.
    pub fn observe_round(&mut self, actions: &BTreeMap<AgentId, FightAction>) {
        self.defectors.clear();
        for (id, action) in actions {
            let current = self.reputation(*id);
            let next = match action {
                FightAction::Cower => {
                    self.defectors.insert(*id);
                    current.saturating_sub(REPUTATION_LOSS)
                }
                FightAction::Attack { attack, .. } if *attack > 0 => {
                    current.saturating_add(REPUTATION_GAIN).min(SCALE_MAX)
                }
                FightAction::Attack { .. } | FightAction::Defend => current,
            };
            self.reputation.insert(*id, next);
        }
        debug!(leader = %self.id, defectors = self.defectors.len(), "round observed");
    }

    /// Drift the personality with the trend in the leader's own Hp.
    ///
    /// A rising average pushes the score up, a falling one pulls it down.
    /// Degenerate ratios count as no change.
    #[allow(clippy::cast_possible_truncation)]
    pub fn update_personality(&mut self, own_hp: u32) {
        if !self.personality_updates {
            return;
        }
        let before = window_mean(&self.hp_window);
        self.hp_window.push_back(own_hp);
        while self.hp_window.len() > HP_WINDOW {
            self.hp_window.pop_front();
        }
        let change = window_mean(&self.hp_window) - before;

        let mut increment = (change - self.last_change) / change.abs() * PERSONALITY_ALPHA;
        if increment.is_nan() {
            increment = 0.0;
        }
        let step = increment.clamp(-PERSONALITY_SWING, PERSONALITY_SWING).ceil() as i64;
        self.last_change = change;

        let mut personality = self.personality.lock().unwrap_or_else(PoisonError::into_inner);
        let next = i64::from(*personality).saturating_add(step).clamp(0, i64::from(SCALE_MAX));
        *personality = u32::try_from(next).unwrap_or(*personality);
    }

    /// Eligible agents ordered by descending reputation, ties by identity.
    pub fn ranking(&self, eligible: &Population) -> Vec<AgentId> {
        let mut ids: Vec<AgentId> = eligible.keys().copied().collect();
        ids.sort_by(|a, b| self.reputation(*b).cmp(&self.reputation(*a)).then(a.cmp(b)));
        ids
    }

    /// Drop everything known about eliminated agents.
    pub fn forget(&mut self, ids: &[AgentId]) {
        for id in ids {
            self.reputation.remove(id);
            self.defectors.remove(id);
        }
        self.ledger.forget(ids);
    }
}

#[allow(clippy::cast_precision_loss)]
fn window_mean(window: &VecDeque<u32>) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    window.iter().map(|hp| f64::from(*hp)).sum::<f64>() / window.len() as f64
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use std::sync::Arc;

    use horde_types::GameSnapshot;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;
    use crate::sanctions::SanctionPolicy;
    use crate::strategy::{Agent, AgentHandle, FightStrategy};

    struct Idle;

    impl FightStrategy for Idle {
        fn handle_fight(&self, _snapshot: &GameSnapshot, _me: &AgentHandle) {}
    }

    fn leader(personality: u32) -> LeaderState {
        LeaderState::new(
            AgentId::new(),
            personality,
            1000,
            SanctionLedger::new(SanctionPolicy::Fixed { duration: 3 }),
        )
    }

    fn states(n: usize) -> BTreeMap<AgentId, AgentState> {
        (0..n).map(|_| (AgentId::new(), AgentState::new(100, 5, 5))).collect()
    }

    #[test]
    fn presets_match_scores() {
        assert_eq!(Personality::Selfish.default_score(), 25);
        assert_eq!(Personality::Collective.default_score(), 50);
        assert_eq!(Personality::Selfless.default_score(), 75);
    }

    #[test]
    fn cowering_marks_defector_and_costs_reputation() {
        let mut leader = leader(50);
        let coward = AgentId::new();
        let fighter = AgentId::new();
        let actions = BTreeMap::from([
            (coward, FightAction::Cower),
            (fighter, FightAction::Attack { attack: 4, defend: 0 }),
        ]);
        leader.observe_round(&actions);

        assert!(leader.is_defector(coward));
        assert!(!leader.is_defector(fighter));
        assert_eq!(leader.reputation(coward), 45);
        assert_eq!(leader.reputation(fighter), 52);

        leader.observe_round(&BTreeMap::from([(coward, FightAction::Defend)]));
        assert!(!leader.is_defector(coward));
    }

    #[test]
    fn reputation_stays_on_scale() {
        let mut leader = leader(50);
        let id = AgentId::new();
        for _ in 0..40 {
            leader.observe_round(&BTreeMap::from([(
                id,
                FightAction::Attack {
                    attack: 1,
                    defend: 0,
                },
            )]));
        }
        assert_eq!(leader.reputation(id), SCALE_MAX);
        for _ in 0..40 {
            leader.observe_round(&BTreeMap::from([(id, FightAction::Cower)]));
        }
        assert_eq!(leader.reputation(id), 0);
    }

    #[test]
    fn non_defectors_rarely_sanctioned() {
        let mut leader = leader(100);
        let states = states(50);
        let mut rng = SmallRng::seed_from_u64(42);
        let assigned = leader.run_sanctions(&states, &mut rng);
        // score 0 only fires on a draw of exactly 0
        assert!(assigned.len() < 10);
    }

    #[test]
    fn defectors_under_strict_leader_are_sanctioned() {
        let mut leader = leader(100);
        let states = states(20);
        let coward_round: BTreeMap<AgentId, FightAction> =
            states.keys().map(|id| (*id, FightAction::Cower)).collect();
        leader.observe_round(&coward_round);

        let mut rng = SmallRng::seed_from_u64(42);
        let assigned = leader.run_sanctions(&states, &mut rng);
        // score is 0.8*100 + 0.2*(45-50)/3 floored to 79
        assert!(assigned.len() >= 10);
        assert_eq!(leader.ledger().active_count(), assigned.len());
    }

    #[test]
    fn leader_never_sanctions_itself() {
        let mut leader = leader(100);
        let me = leader.id();
        let states = BTreeMap::from([(me, AgentState::new(100, 5, 5))]);
        leader.observe_round(&BTreeMap::from([(me, FightAction::Cower)]));
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..20 {
            assert!(leader.run_sanctions(&states, &mut rng).is_empty());
        }
    }

    #[test]
    fn prune_excludes_sanctioned() {
        let mut leader = leader(100);
        let pop: Population = (0..6)
            .map(|_| {
                let agent = Agent::new(AgentId::new(), Arc::new(Idle));
                (agent.id, agent)
            })
            .collect();
        let states: BTreeMap<AgentId, AgentState> =
            pop.keys().map(|id| (*id, AgentState::new(100, 5, 5))).collect();
        let cowering: BTreeMap<AgentId, FightAction> =
            pop.keys().map(|id| (*id, FightAction::Cower)).collect();
        leader.observe_round(&cowering);
        let mut rng = SmallRng::seed_from_u64(3);
        let assigned = leader.run_sanctions(&states, &mut rng);

        let eligible = leader.prune(&pop);
        let excluded = assigned.iter().filter(|(_, d)| *d > 0).count();
        assert_eq!(eligible.len(), pop.len() - excluded);
        assert!(assigned.iter().all(|(id, _)| !eligible.contains_key(id)));
    }

    #[test]
    fn falling_hp_lowers_personality() {
        let mut leader = leader(50);
        leader.update_personality(400);
        assert!(leader.personality() < 50);
    }

    #[test]
    fn flat_hp_leaves_personality() {
        let mut leader = leader(50);
        leader.update_personality(1000);
        leader.update_personality(1000);
        assert_eq!(leader.personality(), 50);
    }

    #[test]
    fn personality_is_clamped() {
        let mut low = leader(2);
        low.update_personality(10);
        assert_eq!(low.personality(), 0);

        let mut high = leader(99);
        high.update_personality(5000);
        assert_eq!(high.personality(), SCALE_MAX);
    }

    #[test]
    fn disabled_updates_freeze_personality() {
        let mut leader = leader(50).with_personality_updates(false);
        leader.update_personality(1);
        assert_eq!(leader.personality(), 50);
    }

    #[test]
    fn ranking_orders_by_reputation() {
        let mut leader = leader(50);
        let pop: Population = (0..3)
            .map(|_| {
                let agent = Agent::new(AgentId::new(), Arc::new(Idle));
                (agent.id, agent)
            })
            .collect();
        let ids: Vec<AgentId> = pop.keys().copied().collect();
        leader.observe_round(&BTreeMap::from([
            (ids[0], FightAction::Cower),
            (ids[2], FightAction::Attack { attack: 3, defend: 0 }),
        ]));

        let ranking = leader.ranking(&pop);
        assert_eq!(ranking, vec![ids[2], ids[1], ids[0]]);
    }

    #[test]
    fn personality_is_readable_from_other_threads() {
        let mut leader = leader(70);
        leader.update_personality(1000);
        let expected = leader.personality();

        let seen: Vec<u32> = std::thread::scope(|scope| {
            let readers: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| leader.personality()))
                .collect();
            readers.into_iter().map(|r| r.join().unwrap()).collect()
        });
        assert_eq!(seen, vec![expected; 4]);
    }

    #[test]
    fn ledger_survives_handover() {
        let mut leader = leader(100);
        let states = states(10);
        let cowering: BTreeMap<AgentId, FightAction> =
            states.keys().map(|id| (*id, FightAction::Cower)).collect();
        leader.observe_round(&cowering);
        let mut rng = SmallRng::seed_from_u64(11);
        leader.run_sanctions(&states, &mut rng);
        let issued = leader.ledger().issued();

        let next = LeaderState::new(AgentId::new(), 50, 1000, leader.into_ledger());
        assert_eq!(next.ledger().issued(), issued);
    }
}
