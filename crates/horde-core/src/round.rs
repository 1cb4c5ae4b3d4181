//! One fight round.
//!
//! A round runs four phases in order:
//!
//! 1. **Prune** -- the leader expires and assigns sanctions and computes the
//!    eligible population.
//! 2. **Collect** -- every live agent decides concurrently.
//! 3. **Resolve** -- cower healing, split monster damage, eliminations; the
//!    monster loses the round's total attack.
//! 4. **Feedback** -- the leader folds the round into reputation,
//!    defector flags, and its own personality.

use std::time::Duration;

use horde_agents::{FightOutcome, LeaderState, Roster, resolve_fight_round};
use horde_types::{AgentId, MonsterStats};
use rand::Rng;
use serde::Serialize;
use tracing::info;

use crate::decision::{DecisionError, collect_decisions};

/// Errors that can occur during a round.
#[derive(Debug, thiserror::Error)]
pub enum RoundError {
    /// Decision collection failed.
    #[error("decision error: {source}")]
    Decision {
        /// The underlying decision error.
        #[from]
        source: DecisionError,
    },
}

/// Fixed inputs for one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundParams {
    /// Current level, starting at 1.
    pub level: u32,
    /// Round number within the level, starting at 1.
    pub round: u32,
    /// Configured starting Hp, the base for cower healing.
    pub base_health: u32,
    /// Optional decision deadline.
    pub deadline: Option<Duration>,
}

/// Summary of a completed round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundSummary {
    /// Level the round belonged to.
    pub level: u32,
    /// Round number within the level.
    pub round: u32,
    /// Agents that were not under sanction this round.
    pub eligible: usize,
    /// Agents newly sanctioned this round for at least one round.
    pub sanctioned: Vec<AgentId>,
    /// Live agents kept out of the eligible set this round.
    pub excluded: Vec<AgentId>,
    /// Non-terminal messages read during collection.
    pub messages: usize,
    /// What the resolver did.
    pub outcome: FightOutcome,
    /// Monster health after this round's attack.
    pub monster_health: u32,
    /// Agents alive at the end of the round.
    pub agents_alive: usize,
    /// Leader's personality after feedback.
    pub leader_personality: u32,
}

/// Run one round against `monster`, mutating the roster and the leader.
///
/// # Errors
///
/// Returns [`RoundError::Decision`] if decision collection fails.
pub async fn run_round<R: Rng + ?Sized>(
    roster: &mut Roster,
    leader: &mut LeaderState,
    monster: &mut MonsterStats,
    params: RoundParams,
    rng: &mut R,
) -> Result<RoundSummary, RoundError> {
    // --- Phase 1: Prune ---
    let assigned = leader.run_sanctions(roster.states(), rng);
    let sanctioned: Vec<AgentId> = assigned
        .iter()
        .filter(|(_, duration)| *duration > 0)
        .map(|(id, _)| *id)
        .collect();
    let eligible = leader.prune(roster.population());
    let excluded: Vec<AgentId> = roster
        .ids()
        .into_iter()
        .filter(|id| !eligible.contains_key(id))
        .collect();
    let ranking = leader.ranking(&eligible);
    info!(
        level = params.level,
        round = params.round,
        eligible = eligible.len(),
        excluded = excluded.len(),
        live = roster.len(),
        top_ranked = ?ranking.first(),
        "participants pruned"
    );

    // --- Phase 2: Collect ---
    let snapshot = roster.snapshot(params.level, params.round, *monster);
    let participants = roster.ids();
    let collected = collect_decisions(roster, &participants, snapshot, params.deadline).await?;

    // --- Phase 3: Resolve ---
    let outcome = resolve_fight_round(
        roster,
        &collected.actions,
        monster.damage,
        params.base_health,
    );
    monster.health = monster.health.saturating_sub(outcome.tally.total_attack);

    // --- Phase 4: Feedback ---
    leader.observe_round(&collected.actions);
    leader.forget(&outcome.eliminated);
    if let Some(state) = roster.state(leader.id()) {
        leader.update_personality(state.hp);
    }

    info!(
        level = params.level,
        round = params.round,
        total_attack = outcome.tally.total_attack,
        total_defense = outcome.tally.total_defense,
        cowering = outcome.tally.cowering,
        eliminated = outcome.eliminated.len(),
        monster_health = monster.health,
        "round complete"
    );

    Ok(RoundSummary {
        level: params.level,
        round: params.round,
        eligible: eligible.len(),
        sanctioned,
        excluded,
        messages: collected.message_count(),
        monster_health: monster.health,
        agents_alive: roster.len(),
        leader_personality: leader.personality(),
        outcome,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use horde_agents::{Agent, AgentHandle, FightStrategy, SanctionLedger, SanctionPolicy};
    use horde_types::{AgentState, FightAction, GameSnapshot};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    struct Always(FightAction);

    impl FightStrategy for Always {
        fn handle_fight(&self, _snapshot: &GameSnapshot, me: &AgentHandle) {
            me.commit(self.0);
        }
    }

    fn params() -> RoundParams {
        RoundParams {
            level: 1,
            round: 1,
            base_health: 1000,
            deadline: None,
        }
    }

    fn setup(n: usize, action: FightAction, hp: u32) -> (Roster, LeaderState) {
        let mut roster = Roster::new();
        for _ in 0..n {
            roster
                .enlist(
                    Agent::new(AgentId::new(), Arc::new(Always(action))),
                    AgentState::new(hp, 5, 5),
                )
                .unwrap();
        }
        let leader_id = roster.ids().first().copied().unwrap();
        let leader = LeaderState::new(
            leader_id,
            50,
            1000,
            SanctionLedger::new(SanctionPolicy::Fixed { duration: 2 }),
        );
        (roster, leader)
    }

    #[tokio::test]
    async fn attack_round_damages_monster_and_agents() {
        let (mut roster, mut leader) = setup(
            4,
            FightAction::Attack {
                attack: 5,
                defend: 0,
            },
            100,
        );
        let mut monster = MonsterStats {
            level: 1,
            health: 50,
            damage: 40,
        };
        let mut rng = SmallRng::seed_from_u64(42);

        let summary = run_round(&mut roster, &mut leader, &mut monster, params(), &mut rng)
            .await
            .unwrap();

        assert_eq!(summary.outcome.tally.total_attack, 20);
        assert_eq!(monster.health, 30);
        assert_eq!(summary.monster_health, 30);
        assert_eq!(summary.agents_alive, 4);
        assert!(roster.states().values().all(|s| s.hp == 90));
    }

    #[tokio::test]
    async fn monster_health_saturates_at_zero() {
        let (mut roster, mut leader) = setup(
            3,
            FightAction::Attack {
                attack: 50,
                defend: 0,
            },
            100,
        );
        let mut monster = MonsterStats {
            level: 1,
            health: 20,
            damage: 3,
        };
        let mut rng = SmallRng::seed_from_u64(1);

        run_round(&mut roster, &mut leader, &mut monster, params(), &mut rng)
            .await
            .unwrap();
        assert_eq!(monster.health, 0);
    }

    #[tokio::test]
    async fn cowards_become_defectors() {
        let (mut roster, mut leader) = setup(3, FightAction::Cower, 100);
        let mut monster = MonsterStats {
            level: 1,
            health: 100,
            damage: 30,
        };
        let mut rng = SmallRng::seed_from_u64(5);

        let summary = run_round(&mut roster, &mut leader, &mut monster, params(), &mut rng)
            .await
            .unwrap();

        assert_eq!(summary.outcome.tally.cowering, 3);
        assert_eq!(monster.health, 100);
        for id in roster.ids() {
            assert!(leader.is_defector(id));
            // 100 + 50 heal - 10 split
            assert_eq!(roster.state(id).unwrap().hp, 140);
        }
    }

    #[tokio::test]
    async fn eliminated_agents_leave_the_round() {
        let (mut roster, mut leader) = setup(2, FightAction::Defend, 10);
        let mut monster = MonsterStats {
            level: 1,
            health: 100,
            damage: 40,
        };
        let mut rng = SmallRng::seed_from_u64(9);

        let summary = run_round(&mut roster, &mut leader, &mut monster, params(), &mut rng)
            .await
            .unwrap();
        assert_eq!(summary.outcome.eliminated.len(), 2);
        assert!(summary.outcome.population_exhausted);
        assert!(roster.is_empty());
    }
}
