//! Game loop: levels, leadership, loot, and the final outcome.
//!
//! [`run_game`] drives levels in order. Each level spawns a monster from the
//! scaling formulas, elects a leader, and runs rounds until the monster
//! falls, the population dies out, or the round budget runs out.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use horde_agents::scaling::{LevelLoot, monster_for_level, roll_level_loot};
use horde_agents::{LeaderState, Personality, Roster, SanctionLedger, SanctionPolicy};
use horde_types::AgentId;
use rand::Rng;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::HordeConfig;
use crate::round::{RoundError, RoundParams, RoundSummary, run_round};

/// Errors that can occur during the game.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// A round failed.
    #[error("round error: {source}")]
    Round {
        /// The underlying round error.
        #[from]
        source: RoundError,
    },
}

/// How the game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GameOutcome {
    /// Every level was cleared.
    Victory,
    /// No agent is left alive.
    Extinction {
        /// Level on which the last agent fell.
        level: u32,
    },
    /// A level ran out of rounds with the monster still standing.
    Stalemate {
        /// The level that could not be cleared.
        level: u32,
    },
}

/// Loot rolled for one cleared level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelDrop {
    /// The cleared level.
    pub level: u32,
    /// What it yielded.
    pub loot: LevelLoot,
}

/// Everything the game produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameReport {
    /// How the game ended.
    pub outcome: GameOutcome,
    /// Levels whose monster was defeated.
    pub levels_cleared: u32,
    /// Rounds played across all levels.
    pub total_rounds: u64,
    /// Agents alive at the end.
    pub survivors: usize,
    /// Sanctions that excluded an agent for at least one round.
    pub sanctions_issued: u64,
    /// Number of leader elections.
    pub leader_elections: u32,
    /// Loot per cleared level.
    pub loot: Vec<LevelDrop>,
    /// Every round played, in order.
    pub rounds: Vec<RoundSummary>,
    /// Wall-clock start.
    pub started_at: DateTime<Utc>,
    /// Wall-clock end.
    pub ended_at: DateTime<Utc>,
}

/// Pick the eligible agent with the most Hp, lowest identity on ties.
///
/// Agents still excluded once the coming round's sanctions count down are
/// passed over; with no ledger in force nobody is. Falls back to the whole
/// roster when every agent is excluded. Returns `None` for an empty roster.
pub fn choose_leader(roster: &Roster, in_force: Option<&SanctionLedger>) -> Option<AgentId> {
    let best = |eligible: &dyn Fn(&AgentId) -> bool| {
        roster
            .states()
            .iter()
            .filter(|(id, _)| eligible(id))
            .min_by(|(a_id, a), (b_id, b)| b.hp.cmp(&a.hp).then(a_id.cmp(b_id)))
            .map(|(id, _)| *id)
    };
    best(&|id| !in_force.is_some_and(|ledger| ledger.excluded_after_advance(*id)))
        .or_else(|| best(&|_| true))
}

/// The leader in office and the ledgers of everyone who has led.
///
/// Each leader keeps its own ledger across terms. With persistent sanctions
/// a single ledger passes from leader to leader instead.
#[derive(Debug)]
struct Leadership {
    current: Option<LeaderState>,
    policy: SanctionPolicy,
    persistent: bool,
    shared: Option<SanctionLedger>,
    retired: BTreeMap<AgentId, SanctionLedger>,
    elections: u32,
}

impl Leadership {
    const fn new(policy: SanctionPolicy, persistent: bool) -> Self {
        Self {
            current: None,
            policy,
            persistent,
            shared: None,
            retired: BTreeMap::new(),
            elections: 0,
        }
    }

    /// The ledger `id` enforces on taking office.
    fn issue(&mut self, id: AgentId) -> SanctionLedger {
        let stored = if self.persistent {
            self.shared.take()
        } else {
            self.retired.remove(&id)
        };
        stored.unwrap_or_else(|| SanctionLedger::new(self.policy))
    }

    /// File away the ledger of a leader leaving office.
    fn retire(&mut self, id: AgentId, ledger: SanctionLedger) {
        if self.persistent {
            self.shared = Some(ledger);
        } else {
            self.retired.insert(id, ledger);
        }
    }

    /// Drop eliminated agents from every ledger out of office.
    fn forget(&mut self, ids: &[AgentId]) {
        for id in ids {
            self.retired.remove(id);
        }
        for ledger in self.retired.values_mut().chain(self.shared.as_mut()) {
            ledger.forget(ids);
        }
    }

    /// Hold an election. A re-elected leader keeps its whole state.
    ///
    /// Returns `false` when nobody is left to lead.
    fn elect(&mut self, roster: &Roster, config: &HordeConfig) -> bool {
        let in_force = self.current.as_ref().map(LeaderState::ledger);
        let Some(id) = choose_leader(roster, in_force) else {
            if let Some(outgoing) = self.current.take() {
                self.retire(outgoing.id(), outgoing.into_ledger());
            }
            return false;
        };
        self.elections = self.elections.saturating_add(1);
        if self.current.as_ref().is_some_and(|leader| leader.id() == id) {
            info!(leader = %id, "leader re-elected");
            return true;
        }

        if let Some(outgoing) = self.current.take() {
            let outgoing_id = outgoing.id();
            self.retire(outgoing_id, outgoing.into_ledger());
            if !roster.contains(outgoing_id) {
                self.forget(&[outgoing_id]);
            }
        }
        let ledger = self.issue(id);
        let personality = roster
            .agent(id)
            .map_or(Personality::Collective, |agent| agent.strategy.personality());
        let score = config.personality.score(personality);
        info!(
            leader = %id,
            ?personality,
            score,
            sanctions_in_force = ledger.active_count(),
            "leader elected"
        );
        self.current = Some(
            LeaderState::new(id, score, config.game.starting_hp, ledger)
                .with_personality_updates(config.personality.update),
        );
        true
    }
}

/// Counters accumulated over the whole game.
#[derive(Debug, Default)]
struct Progress {
    levels_cleared: u32,
    total_rounds: u64,
    sanctions_issued: u64,
    loot: Vec<LevelDrop>,
    rounds: Vec<RoundSummary>,
}

/// Play the whole game with the agents already in `roster`.
///
/// # Errors
///
/// Returns [`RunnerError::Round`] if a round fails; the game is abandoned.
pub async fn run_game<R: Rng + ?Sized>(
    config: &HordeConfig,
    roster: &mut Roster,
    rng: &mut R,
) -> Result<GameReport, RunnerError> {
    let started_at = Utc::now();
    let mut leadership = Leadership::new(config.sanctions.policy(), config.sanctions.persistent);
    let mut progress = Progress::default();

    info!(
        agents = roster.len(),
        levels = config.game.num_levels,
        policy = ?config.sanctions.policy(),
        "Game starting"
    );

    let mut outcome = GameOutcome::Victory;
    for level in 1..=config.game.num_levels {
        if let Some(end) =
            play_level(config, roster, &mut leadership, level, &mut progress, rng).await?
        {
            outcome = end;
            break;
        }
    }

    let report = GameReport {
        outcome,
        levels_cleared: progress.levels_cleared,
        total_rounds: progress.total_rounds,
        survivors: roster.len(),
        sanctions_issued: progress.sanctions_issued,
        leader_elections: leadership.elections,
        loot: progress.loot,
        rounds: progress.rounds,
        started_at,
        ended_at: Utc::now(),
    };
    log_game_end(&report);
    Ok(report)
}

/// Play one level to completion.
///
/// Returns `Some` with the game's outcome when the game ends on this level,
/// or `None` once the monster is down and the loot is rolled.
async fn play_level<R: Rng + ?Sized>(
    config: &HordeConfig,
    roster: &mut Roster,
    leadership: &mut Leadership,
    level: u32,
    progress: &mut Progress,
    rng: &mut R,
) -> Result<Option<GameOutcome>, RunnerError> {
    let spawned = monster_for_level(&config.scaling_params(), level, rng);
    let mut monster = spawned;
    info!(
        level,
        health = monster.health,
        damage = monster.damage,
        "Level started"
    );

    if !leadership.elect(roster, config) {
        return Ok(Some(GameOutcome::Extinction { level }));
    }

    for round in 1..=config.game.max_rounds_per_level {
        let fallen = leadership
            .current
            .as_ref()
            .is_none_or(|leader| !roster.contains(leader.id()));
        if fallen {
            warn!(level, round, "leader fell, electing successor");
            if !leadership.elect(roster, config) {
                return Ok(Some(GameOutcome::Extinction { level }));
            }
        }
        let Some(current) = leadership.current.as_mut() else {
            return Ok(Some(GameOutcome::Extinction { level }));
        };

        let round_params = RoundParams {
            level,
            round,
            base_health: config.game.starting_hp,
            deadline: config.game.decision_timeout(),
        };
        let summary = run_round(roster, current, &mut monster, round_params, rng).await?;
        leadership.forget(&summary.outcome.eliminated);
        progress.total_rounds = progress.total_rounds.saturating_add(1);
        progress.sanctions_issued = progress
            .sanctions_issued
            .saturating_add(u64::try_from(summary.sanctioned.len()).unwrap_or(u64::MAX));
        progress.rounds.push(summary);

        if roster.is_empty() {
            info!(level, round, "All agents dead -- extinction");
            return Ok(Some(GameOutcome::Extinction { level }));
        }
        if monster.health == 0 {
            progress.levels_cleared = progress.levels_cleared.saturating_add(1);
            let survivors = u32::try_from(roster.len()).unwrap_or(u32::MAX);
            let drop = roll_level_loot(
                &spawned,
                survivors,
                config.loot.potion_scarcity,
                config.loot.equipment_scarcity,
                rng,
            );
            info!(
                level,
                health_potions = drop.potions.first,
                stamina_potions = drop.potions.second,
                weapons = drop.equipment.first,
                shields = drop.equipment.second,
                weapon_damage = drop.weapon_damage,
                shield_protection = drop.shield_protection,
                "Level cleared"
            );
            progress.loot.push(LevelDrop { level, loot: drop });
            return Ok(None);
        }
    }

    info!(
        level,
        monster_health = monster.health,
        "Round budget exhausted -- stalemate"
    );
    Ok(Some(GameOutcome::Stalemate { level }))
}

impl GameReport {
    /// The last round played, if any.
    pub fn final_round(&self) -> Option<&RoundSummary> {
        self.rounds.last()
    }
}

/// Log the end-of-game summary.
pub fn log_game_end(report: &GameReport) {
    info!(
        outcome = ?report.outcome,
        levels_cleared = report.levels_cleared,
        total_rounds = report.total_rounds,
        survivors = report.survivors,
        sanctions_issued = report.sanctions_issued,
        "Game ended"
    );
    if report.rounds.is_empty() {
        warn!("Game ended with no rounds played");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use horde_agents::{Agent, AgentHandle, FightStrategy, HpStats};
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

    fn roster_with(hps: &[u32], action: FightAction) -> Roster {
        let mut roster = Roster::new();
        for hp in hps {
            roster
                .enlist(
                    Agent::new(AgentId::new(), Arc::new(Always(action))),
                    AgentState::new(*hp, 5, 5),
                )
                .unwrap();
        }
        roster
    }

    fn fixed_three() -> SanctionLedger {
        SanctionLedger::new(SanctionPolicy::Fixed { duration: 3 })
    }

    fn healthiest(roster: &Roster) -> AgentId {
        choose_leader(roster, None).unwrap()
    }

    #[test]
    fn leader_is_healthiest_eligible_agent() {
        let roster = roster_with(&[50, 80, 80, 10], FightAction::Defend);
        let chosen = choose_leader(&roster, Some(&fixed_three())).unwrap();

        let lowest_80 = roster
            .states()
            .iter()
            .filter(|(_, s)| s.hp == 80)
            .map(|(id, _)| *id)
            .min()
            .unwrap();
        assert_eq!(chosen, lowest_80);
    }

    #[test]
    fn sanctioned_agents_are_passed_over() {
        let roster = roster_with(&[90, 40], FightAction::Defend);
        let strongest = healthiest(&roster);

        let mut ledger = fixed_three();
        ledger.consider(strongest, 100, 0, 90, &HpStats::default());
        let chosen = choose_leader(&roster, Some(&ledger)).unwrap();
        assert_ne!(chosen, strongest);
    }

    #[test]
    fn sanction_ending_this_round_does_not_bar_leadership() {
        let roster = roster_with(&[90, 40], FightAction::Defend);
        let strongest = healthiest(&roster);

        let mut ledger = fixed_three();
        ledger.consider(strongest, 100, 0, 90, &HpStats::default());
        ledger.advance();
        assert_ne!(choose_leader(&roster, Some(&ledger)), Some(strongest));
        ledger.advance();
        assert!(ledger.is_sanctioned(strongest));
        assert_eq!(choose_leader(&roster, Some(&ledger)), Some(strongest));
    }

    #[test]
    fn empty_roster_has_no_leader() {
        let roster = Roster::new();
        assert!(choose_leader(&roster, Some(&SanctionLedger::default())).is_none());
        assert!(choose_leader(&roster, None).is_none());
    }

    fn reweigh(roster: &Roster, target: AgentId, hp: u32) -> Roster {
        let mut out = Roster::new();
        for (id, state) in roster.states() {
            let mut state = *state;
            if *id == target {
                state.hp = hp;
            }
            out.enlist(roster.agent(*id).unwrap().clone(), state).unwrap();
        }
        out
    }

    fn weakest(roster: &Roster) -> AgentId {
        roster
            .states()
            .iter()
            .min_by_key(|(id, s)| (s.hp, **id))
            .map(|(id, _)| *id)
            .unwrap()
    }

    /// A ledger holding one fresh fixed-3 sanction on `target`.
    fn sanctioning(target: AgentId) -> SanctionLedger {
        let mut ledger = fixed_three();
        ledger.consider(target, 100, 0, 40, &HpStats::default());
        ledger
    }

    #[test]
    fn re_election_keeps_sanctions_in_force() {
        let config = HordeConfig::default();
        let roster = roster_with(&[90, 60, 40], FightAction::Defend);
        let first = healthiest(&roster);
        let mut leadership = Leadership::new(fixed_three().policy(), false);
        leadership.retire(first, sanctioning(weakest(&roster)));

        assert!(leadership.elect(&roster, &config));
        assert_eq!(leadership.current.as_ref().unwrap().ledger().active_count(), 1);
        assert!(leadership.retired.is_empty());

        assert!(leadership.elect(&roster, &config));
        let leader = leadership.current.as_ref().unwrap();
        assert_eq!(leader.id(), first);
        assert!(leader.ledger().is_sanctioned(weakest(&roster)));
        assert_eq!(leadership.elections, 2);
    }

    #[test]
    fn returning_leader_resumes_its_own_ledger() {
        let config = HordeConfig::default();
        let roster = roster_with(&[90, 60, 40], FightAction::Defend);
        let first = healthiest(&roster);
        let mut leadership = Leadership::new(fixed_three().policy(), false);
        leadership.retire(first, sanctioning(weakest(&roster)));
        leadership.elect(&roster, &config);

        let weakened = reweigh(&roster, first, 1);
        assert!(leadership.elect(&weakened, &config));
        let successor = leadership.current.as_ref().unwrap();
        assert_ne!(successor.id(), first);
        assert_ne!(successor.id(), weakest(&roster));
        assert_eq!(successor.ledger().issued(), 0);
        assert!(leadership.retired.contains_key(&first));

        assert!(leadership.elect(&roster, &config));
        let returned = leadership.current.as_ref().unwrap();
        assert_eq!(returned.id(), first);
        assert_eq!(returned.ledger().issued(), 1);
        assert!(returned.ledger().is_sanctioned(weakest(&roster)));
    }

    #[test]
    fn persistent_ledger_passes_between_leaders() {
        let config = HordeConfig::default();
        let roster = roster_with(&[90, 60, 40], FightAction::Defend);
        let first = healthiest(&roster);
        let mut leadership = Leadership::new(fixed_three().policy(), true);
        leadership.retire(first, sanctioning(weakest(&roster)));
        leadership.elect(&roster, &config);

        assert!(leadership.elect(&reweigh(&roster, first, 1), &config));
        let successor = leadership.current.as_ref().unwrap();
        assert_ne!(successor.id(), first);
        assert_eq!(successor.ledger().issued(), 1);
        assert!(leadership.retired.is_empty());
        assert!(leadership.shared.is_none());
    }

    #[test]
    fn eliminated_agents_leave_retired_ledgers() {
        let roster = roster_with(&[90, 60], FightAction::Defend);
        let first = healthiest(&roster);
        let other = weakest(&roster);
        let mut leadership = Leadership::new(fixed_three().policy(), false);
        leadership.retire(first, sanctioning(other));
        leadership.retire(other, sanctioning(first));

        leadership.forget(&[other]);
        assert!(!leadership.retired.contains_key(&other));
        assert!(!leadership.retired.get(&first).unwrap().is_sanctioned(other));
    }

    #[tokio::test]
    async fn idle_population_stalemates() {
        let mut config = HordeConfig::default();
        config.game.num_levels = 2;
        config.game.initial_agents = 3;
        config.game.max_rounds_per_level = 3;
        let mut roster = roster_with(&[1_000_000; 3], FightAction::Defend);
        let mut rng = SmallRng::seed_from_u64(42);

        let report = run_game(&config, &mut roster, &mut rng).await.unwrap();
        assert_eq!(report.outcome, GameOutcome::Stalemate { level: 1 });
        assert_eq!(report.total_rounds, 3);
        assert_eq!(report.levels_cleared, 0);
        assert!(report.loot.is_empty());
    }

    #[tokio::test]
    async fn overwhelming_attack_wins() {
        let mut config = HordeConfig::default();
        config.game.num_levels = 3;
        config.game.initial_agents = 4;
        let mut roster = roster_with(
            &[1_000_000; 4],
            FightAction::Attack {
                attack: 1_000_000,
                defend: 0,
            },
        );
        let mut rng = SmallRng::seed_from_u64(42);

        let report = run_game(&config, &mut roster, &mut rng).await.unwrap();
        assert_eq!(report.outcome, GameOutcome::Victory);
        assert_eq!(report.levels_cleared, 3);
        assert_eq!(report.total_rounds, 3);
        assert_eq!(report.loot.len(), 3);
        assert_eq!(report.survivors, 4);
        assert!(report.ended_at >= report.started_at);
    }

    #[tokio::test]
    async fn fragile_population_goes_extinct() {
        let mut config = HordeConfig::default();
        config.game.initial_agents = 2;
        let mut roster = roster_with(&[1, 1], FightAction::Defend);
        let mut rng = SmallRng::seed_from_u64(42);

        let report = run_game(&config, &mut roster, &mut rng).await.unwrap();
        assert_eq!(report.outcome, GameOutcome::Extinction { level: 1 });
        assert_eq!(report.survivors, 0);
        assert_eq!(report.total_rounds, 1);
    }
}
