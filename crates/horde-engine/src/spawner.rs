//! Agent spawner for seeding the game with its starting population.
//!
//! Each agent gets a personality preset drawn from the configured mix, a
//! [`TeamStrategy`] with its own generator forked from the game seed, and
//! the configured starting stats.

use std::collections::BTreeMap;
use std::sync::Arc;

use horde_agents::{Agent, AgentError, Personality, Roster};
use horde_core::config::{HordeConfig, PersonalityMix};
use horde_types::{AgentId, AgentState};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::strategies::TeamStrategy;

/// Result of spawning the starting population.
#[derive(Debug)]
pub struct SpawnResult {
    /// The populated roster.
    pub roster: Roster,
    /// How many agents received each preset.
    pub personalities: BTreeMap<&'static str, u32>,
}

/// Draw a preset from the mix. An all-zero mix yields the collective preset.
pub fn pick_personality<R: Rng + ?Sized>(mix: &PersonalityMix, rng: &mut R) -> Personality {
    let weighted = mix.weighted();
    let total = weighted
        .iter()
        .fold(0_u32, |acc, (_, weight)| acc.saturating_add(*weight));
    if total == 0 {
        return Personality::Collective;
    }
    let mut roll = rng.random_range(0..total);
    for (personality, weight) in weighted {
        if roll < weight {
            return personality;
        }
        roll = roll.saturating_sub(weight);
    }
    Personality::Collective
}

const fn preset_name(personality: Personality) -> &'static str {
    match personality {
        Personality::Selfish => "selfish",
        Personality::Collective => "collective",
        Personality::Selfless => "selfless",
    }
}

/// Spawn `game.initial_agents` agents into a fresh roster.
pub fn spawn_population<R: Rng + ?Sized>(
    config: &HordeConfig,
    rng: &mut R,
) -> Result<SpawnResult, AgentError> {
    let mut roster = Roster::new();
    let mut personalities: BTreeMap<&'static str, u32> = BTreeMap::new();

    for _ in 0..config.game.initial_agents {
        let personality = pick_personality(&config.personality.mix, rng);
        let strategy = TeamStrategy::new(personality, SmallRng::seed_from_u64(rng.random()));
        let id = AgentId::new();
        let state = AgentState::new(
            config.game.starting_hp,
            config.game.base_attack,
            config.game.base_defense,
        );
        roster.enlist(Agent::new(id, Arc::new(strategy)), state)?;
        let count = personalities.entry(preset_name(personality)).or_insert(0);
        *count = count.saturating_add(1);
        debug!(agent_id = %id, ?personality, "agent spawned");
    }

    info!(
        agents = roster.len(),
        ?personalities,
        "Population spawned"
    );
    Ok(SpawnResult {
        roster,
        personalities,
    })
}
