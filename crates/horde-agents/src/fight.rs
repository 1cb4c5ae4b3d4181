//! Fight resolution: turn one round of collected decisions into healing,
//! damage, and eliminations.
//!
//! ## Round flow
//!
//! 1. Tally decisions: sum `attack`/`defend` over every
//!    [`FightAction::Attack`], count [`FightAction::Cower`].
//! 2. Heal cowering agents by `ceil(0.05 * base_health)`.
//! 3. Split the monster's attack evenly over the live agents (integer
//!    division) and subtract it from every agent, saturating at 0. Healing
//!    from step 2 is already in place.
//! 4. Eliminate every agent left at exactly 0 Hp through
//!    [`Roster::eliminate`].
//!
//! The tally is a sum and a count, so the order decisions arrived in has no
//! effect on the outcome.

use std::collections::BTreeMap;

use horde_types::{AgentId, FightAction};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::roster::Roster;

/// Share of the starting health restored to a cowering agent.
pub const COWER_HEAL_FRACTION: f64 = 0.05;

/// Round aggregates fed to the outer win/loss logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FightTally {
    /// Number of agents that cowered.
    pub cowering: u32,
    /// Sum of `attack` over all attack decisions.
    pub total_attack: u32,
    /// Sum of `defend` over all attack decisions.
    pub total_defense: u32,
}

/// Everything the resolver did to the roster this round.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FightOutcome {
    /// Round aggregates.
    pub tally: FightTally,
    /// Damage subtracted from each live agent.
    pub split_damage: u32,
    /// Agents removed this round.
    pub eliminated: Vec<AgentId>,
    /// True when no agent was alive to take damage.
    pub population_exhausted: bool,
}

/// Hp restored to one cowering agent: `ceil(0.05 * base_health)`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn cower_bonus(base_health: u32) -> u32 {
    let bonus = (COWER_HEAL_FRACTION * f64::from(base_health)).ceil();
    if bonus.is_finite() && bonus > 0.0 {
        bonus as u32
    } else {
        0
    }
}

/// Sum and count the decisions without touching any state.
pub fn tally_decisions(decisions: &BTreeMap<AgentId, FightAction>) -> FightTally {
    decisions
        .values()
        .fold(FightTally::default(), |mut tally, action| {
            match *action {
                FightAction::Attack { attack, defend } => {
                    tally.total_attack = tally.total_attack.saturating_add(attack);
                    tally.total_defense = tally.total_defense.saturating_add(defend);
                }
                FightAction::Cower => tally.cowering = tally.cowering.saturating_add(1),
                FightAction::Defend => {}
            }
            tally
        })
}

/// Resolve one fight round against the roster.
///
/// `decisions` should hold one action per live agent. Entries for agents
/// that are not in the roster are ignored. `monster_attack` is split over
/// the live count at the moment damage is applied; `base_health` is the
/// configured starting Hp, not the current level's value.
///
/// An empty roster is reported through
/// [`FightOutcome::population_exhausted`] and no damage is applied.
pub fn resolve_fight_round(
    roster: &mut Roster,
    decisions: &BTreeMap<AgentId, FightAction>,
    monster_attack: u32,
    base_health: u32,
) -> FightOutcome {
    let tally = tally_decisions(decisions);

    let bonus = cower_bonus(base_health);
    for (id, action) in decisions {
        if !action.is_cower() {
            continue;
        }
        match roster.states_mut().get_mut(id) {
            Some(state) => state.hp = state.hp.saturating_add(bonus),
            None => warn!(agent_id = %id, "cower decision for unregistered agent ignored"),
        }
    }

    let Some((split_damage, eliminated)) = deal_damage(roster, monster_attack) else {
        warn!("no live agents left to take damage");
        return FightOutcome {
            tally,
            split_damage: 0,
            eliminated: Vec::new(),
            population_exhausted: true,
        };
    };

    debug!(
        cowering = tally.cowering,
        total_attack = tally.total_attack,
        total_defense = tally.total_defense,
        split_damage,
        eliminated = eliminated.len(),
        "Fight round resolved"
    );

    FightOutcome {
        tally,
        split_damage,
        population_exhausted: roster.is_empty(),
        eliminated,
    }
}

/// Split `monster_attack` over the live agents and apply it.
///
/// Returns the per-agent split and the eliminated identities, or `None`
/// when the roster is empty.
pub fn deal_damage(roster: &mut Roster, monster_attack: u32) -> Option<(u32, Vec<AgentId>)> {
    let live = u32::try_from(roster.len()).unwrap_or(u32::MAX);
    let split_damage = monster_attack.checked_div(live)?;

    let mut eliminated = Vec::new();
    for (id, state) in roster.states_mut().iter_mut() {
        state.hp = state.hp.saturating_sub(split_damage);
        if state.hp == 0 {
            eliminated.push(*id);
        }
    }

    for id in &eliminated {
        roster.eliminate(*id);
        info!(agent_id = %id, split_damage, "Agent eliminated");
    }

    Some((split_damage, eliminated))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing
)]
mod tests {
    use std::sync::Arc;

    use horde_types::{AgentState, GameSnapshot};
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::strategy::{Agent, AgentHandle, FightStrategy};

    struct Idle;

    impl FightStrategy for Idle {
        fn handle_fight(&self, _snapshot: &GameSnapshot, _me: &AgentHandle) {}
    }

    fn roster_with(hps: &[u32]) -> (Roster, Vec<AgentId>) {
        let mut roster = Roster::new();
        let mut ids = Vec::new();
        for &hp in hps {
            let agent = Agent::new(AgentId::new(), Arc::new(Idle));
            ids.push(agent.id);
            roster.enlist(agent, AgentState::new(hp, 5, 3)).unwrap();
        }
        (roster, ids)
    }

    fn attack(attack: u32) -> FightAction {
        FightAction::Attack { attack, defend: 0 }
    }

    #[test]
    fn cower_bonus_rounds_up() {
        assert_eq!(cower_bonus(1000), 50);
        assert_eq!(cower_bonus(1001), 51);
        assert_eq!(cower_bonus(0), 0);
    }

    #[test]
    fn cower_heal_precedes_damage() {
        let (mut roster, ids) = roster_with(&[10, 100, 100]);
        let mut decisions = BTreeMap::new();
        decisions.insert(ids[0], FightAction::Cower);
        decisions.insert(ids[1], attack(5));
        decisions.insert(ids[2], attack(5));

        let outcome = resolve_fight_round(&mut roster, &decisions, 30, 1000);

        assert_eq!(outcome.split_damage, 10);
        assert_eq!(roster.state(ids[0]).unwrap().hp, 50);
        assert_eq!(roster.state(ids[1]).unwrap().hp, 90);
        assert!(outcome.eliminated.is_empty());
        assert_eq!(outcome.tally.cowering, 1);
    }

    #[test]
    fn all_attack_round() {
        let (mut roster, ids) = roster_with(&[100, 100, 100, 100]);
        let decisions: BTreeMap<_, _> = ids.iter().map(|id| (*id, attack(5))).collect();

        let outcome = resolve_fight_round(&mut roster, &decisions, 40, 1000);

        assert_eq!(outcome.tally.total_attack, 20);
        assert_eq!(outcome.tally.cowering, 0);
        for id in &ids {
            assert_eq!(roster.state(*id).unwrap().hp, 90);
        }
    }

    #[test]
    fn all_cower_is_a_stalemate_not_an_error() {
        for size in [1_usize, 3, 9] {
            let hps = vec![100; size];
            let (mut roster, ids) = roster_with(&hps);
            let decisions: BTreeMap<_, _> =
                ids.iter().map(|id| (*id, FightAction::Cower)).collect();

            let outcome = resolve_fight_round(&mut roster, &decisions, 0, 1000);

            assert_eq!(outcome.tally.total_attack, 0);
            assert_eq!(outcome.tally.total_defense, 0);
            assert_eq!(outcome.tally.cowering as usize, size);
        }
    }

    #[test]
    fn defend_stance_adds_nothing() {
        let decisions: BTreeMap<_, _> = [
            (AgentId::new(), FightAction::Defend),
            (
                AgentId::new(),
                FightAction::Attack {
                    attack: 3,
                    defend: 4,
                },
            ),
        ]
        .into_iter()
        .collect();
        let tally = tally_decisions(&decisions);
        assert_eq!(tally.total_attack, 3);
        assert_eq!(tally.total_defense, 4);
        assert_eq!(tally.cowering, 0);
    }

    #[test]
    fn exact_zero_eliminates_everywhere() {
        let (mut roster, ids) = roster_with(&[10, 11, 30]);
        let decisions: BTreeMap<_, _> = ids.iter().map(|id| (*id, attack(1))).collect();

        // split = 33 / 3 = 11
        let outcome = resolve_fight_round(&mut roster, &decisions, 33, 1000);

        assert_eq!(outcome.split_damage, 11);
        assert_eq!(outcome.eliminated.len(), 2);
        assert_eq!(roster.len(), 1);
        assert!(!roster.contains(ids[0]));
        assert!(!roster.contains(ids[1]));
        assert!(roster.outbox(ids[0]).is_err());
        assert_eq!(roster.state(ids[2]).unwrap().hp, 19);
        assert!(!outcome.population_exhausted);
    }

    #[test]
    fn split_uses_integer_division() {
        let (mut roster, ids) = roster_with(&[100, 100, 100]);
        let decisions: BTreeMap<_, _> = ids.iter().map(|id| (*id, attack(1))).collect();
        let outcome = resolve_fight_round(&mut roster, &decisions, 20, 1000);
        assert_eq!(outcome.split_damage, 6);
    }

    #[test]
    fn empty_roster_reports_exhaustion() {
        let mut roster = Roster::new();
        let outcome = resolve_fight_round(&mut roster, &BTreeMap::new(), 100, 1000);
        assert!(outcome.population_exhausted);
        assert_eq!(outcome.split_damage, 0);
    }

    #[test]
    fn wiping_out_everyone_reports_exhaustion() {
        let (mut roster, ids) = roster_with(&[5, 5]);
        let decisions: BTreeMap<_, _> = ids.iter().map(|id| (*id, attack(1))).collect();
        let outcome = resolve_fight_round(&mut roster, &decisions, 100, 1000);
        assert!(outcome.population_exhausted);
        assert_eq!(outcome.eliminated.len(), 2);
        assert!(roster.is_empty());
    }

    #[test]
    fn hp_loss_is_bounded_and_reconciles() {
        let mut rng = SmallRng::seed_from_u64(2024);
        for _ in 0..200 {
            let size = rng.random_range(1..12_usize);
            let hps: Vec<u32> = (0..size).map(|_| rng.random_range(1..300)).collect();
            let (mut roster, ids) = roster_with(&hps);
            let monster_attack: u32 = rng.random_range(0..2000);
            let decisions: BTreeMap<_, _> = ids
                .iter()
                .map(|id| {
                    let action = if rng.random_bool(0.3) {
                        FightAction::Cower
                    } else {
                        attack(rng.random_range(0..10))
                    };
                    (*id, action)
                })
                .collect();
            let before: BTreeMap<AgentId, u32> = roster
                .states()
                .iter()
                .map(|(id, s)| (*id, s.hp))
                .collect();

            let outcome = resolve_fight_round(&mut roster, &decisions, monster_attack, 1000);

            let split = monster_attack / u32::try_from(size).unwrap();
            assert_eq!(outcome.split_damage, split);

            let total_before: u64 = before.values().map(|hp| u64::from(*hp)).sum();
            let total_after: u64 = roster.states().values().map(|s| u64::from(s.hp)).sum();
            let healed = u64::from(outcome.tally.cowering) * u64::from(cower_bonus(1000));
            assert!(total_before + healed - total_after <= u64::from(monster_attack));

            for (id, hp) in &before {
                let Some(state) = roster.state(*id) else {
                    assert!(outcome.eliminated.contains(id));
                    continue;
                };
                if !decisions[id].is_cower() {
                    assert_eq!(state.hp, hp - split);
                }
            }
        }
    }
}
