//! Monster scaling and loot formulas.
//!
//! Every formula is a pure function of its inputs plus a [`ResilienceDelta`],
//! a random toughness factor drawn uniformly from `[0.8, 1.2)`. Callers that
//! want production behavior sample a fresh delta per call from an injected
//! generator; tests pin the delta to make results exact.
//!
//! ## Formulas
//!
//! With population `N`, stamina `S`, starting health `HP0`, level count `L`
//! and current level `l`:
//!
//! - health = floor(delta * (N / L * S) * (l / L + 0.5) * 1.3)
//! - damage = floor(delta * (N / L) * (HP0 + S) * (l / L + 0.5) * 2.5)
//!
//! Results are truncated toward zero, never rounded. Item values are the
//! exception and round up.

use horde_types::MonsterStats;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Multiplier applied to monster health after level scaling.
const HEALTH_BOOST: f64 = 1.3;

/// Multiplier applied to monster damage after level scaling.
const DAMAGE_BOOST: f64 = 2.5;

/// Offset added to the level ratio so level 0 is not free.
const LEVEL_OFFSET: f64 = 0.5;

/// Multiplier for weapon damage relative to monster health.
const WEAPON_FACTOR: f64 = 2.0;

/// Multiplier for potion strength relative to the monster stat it offsets.
const POTION_FACTOR: f64 = 5.0;

/// Random toughness factor applied to a single formula evaluation.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct ResilienceDelta(f64);

impl ResilienceDelta {
    /// Inclusive lower bound of the sampled range.
    pub const MIN: f64 = 0.8;

    /// Exclusive upper bound of the sampled range.
    pub const MAX: f64 = 1.2;

    /// A delta of exactly 1.0; formulas evaluate to their nominal value.
    pub const NEUTRAL: Self = Self(1.0);

    /// Draw a delta uniformly from `[MIN, MAX)`.
    pub fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(rng.random_range(Self::MIN..Self::MAX))
    }

    /// Use a fixed value. Intended for deterministic scenarios.
    pub const fn pinned(value: f64) -> Self {
        Self(value)
    }

    /// The raw multiplier.
    pub const fn value(self) -> f64 {
        self.0
    }
}

/// Game-wide inputs to the monster formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingParams {
    /// Population size the monsters are tuned against (initial agent count).
    pub population: u32,
    /// Base stamina per agent.
    pub stamina: u32,
    /// Starting health per agent.
    pub base_health: u32,
    /// Total number of levels in the game.
    pub level_count: u32,
}

/// A drop total split into two sub-categories.
///
/// The two halves are truncated independently, so `first + second` may be
/// one less than the total they were split from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DropSplit {
    /// Share `tau * total` (health potions, or weapons).
    pub first: u32,
    /// Share `(1 - tau) * total` (stamina potions, or shields).
    pub second: u32,
}

/// Everything a cleared level yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LevelLoot {
    /// Health potions (`first`) and stamina potions (`second`).
    pub potions: DropSplit,
    /// Weapons (`first`) and shields (`second`).
    pub equipment: DropSplit,
    /// Attack bonus granted by each weapon.
    pub weapon_damage: u32,
    /// Defense bonus granted by each shield.
    pub shield_protection: u32,
    /// Hp restored by each health potion.
    pub health_potion: u32,
    /// Stamina restored by each stamina potion.
    pub stamina_potion: u32,
}

/// Truncate toward zero into `u32`. Non-finite and negative inputs map to 0.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn truncate(value: f64) -> u32 {
    if value.is_finite() && value > 0.0 {
        value as u32
    } else {
        0
    }
}

/// `l / L + 0.5`, or `None` when there are no levels.
fn level_ratio(level_count: u32, level: u32) -> Option<f64> {
    if level_count == 0 {
        return None;
    }
    Some(f64::from(level) / f64::from(level_count) + LEVEL_OFFSET)
}

/// Monster resilience for `level`.
///
/// Returns 0 when `level_count` is 0 rather than dividing by zero.
pub fn monster_health(params: &ScalingParams, level: u32, delta: ResilienceDelta) -> u32 {
    let Some(ratio) = level_ratio(params.level_count, level) else {
        return 0;
    };
    let agent_stamina_ratio =
        f64::from(params.population) / f64::from(params.level_count) * f64::from(params.stamina);
    truncate(delta.value() * agent_stamina_ratio * ratio * HEALTH_BOOST)
}

/// Monster damage rating for `level`.
///
/// Returns 0 when `level_count` is 0 rather than dividing by zero.
pub fn monster_damage(params: &ScalingParams, level: u32, delta: ResilienceDelta) -> u32 {
    let Some(ratio) = level_ratio(params.level_count, level) else {
        return 0;
    };
    let agent_ratio = f64::from(params.population) / f64::from(params.level_count);
    let hp_stamina_sum = f64::from(params.base_health) + f64::from(params.stamina);
    truncate(delta.value() * agent_ratio * hp_stamina_sum * ratio * DAMAGE_BOOST)
}

/// Build the monster for `level`, drawing an independent delta for health
/// and for damage.
pub fn monster_for_level<R: Rng + ?Sized>(
    params: &ScalingParams,
    level: u32,
    rng: &mut R,
) -> MonsterStats {
    let health = monster_health(params, level, ResilienceDelta::sample(rng));
    let damage = monster_damage(params, level, ResilienceDelta::sample(rng));
    MonsterStats {
        level,
        health,
        damage,
    }
}

/// The monster guarding the level after `current_level`.
pub fn next_level_monster<R: Rng + ?Sized>(
    params: &ScalingParams,
    current_level: u32,
    rng: &mut R,
) -> MonsterStats {
    monster_for_level(params, current_level.saturating_add(1), rng)
}

/// Number of items dropped for a scarcity fraction and population.
pub fn drop_total(scarcity: f64, population: u32, delta: ResilienceDelta) -> u32 {
    truncate(delta.value() * scarcity * f64::from(population))
}

/// Split `total` into `(tau * total, (1 - tau) * total)`, each truncated.
pub fn split_drop(total: u32, tau: f64) -> DropSplit {
    let total = f64::from(total);
    DropSplit {
        first: truncate(tau * total),
        second: truncate((1.0 - tau) * total),
    }
}

/// Potion drop: health potions first, stamina potions second.
pub fn potion_distribution<R: Rng + ?Sized>(
    scarcity: f64,
    population: u32,
    rng: &mut R,
) -> DropSplit {
    let tau: f64 = rng.random();
    let total = drop_total(scarcity, population, ResilienceDelta::sample(rng));
    split_drop(total, tau)
}

/// Equipment drop: weapons first, shields second.
///
/// Uses its own `tau`, independent of the potion split.
pub fn equipment_distribution<R: Rng + ?Sized>(
    scarcity: f64,
    population: u32,
    rng: &mut R,
) -> DropSplit {
    let tau: f64 = rng.random();
    let total = drop_total(scarcity, population, ResilienceDelta::sample(rng));
    split_drop(total, tau)
}

/// `ceil(delta * numerator * factor / population)`, 0 for an empty population.
fn per_agent_value(numerator: u32, factor: f64, population: u32, delta: ResilienceDelta) -> u32 {
    if population == 0 {
        return 0;
    }
    truncate((delta.value() * f64::from(numerator) * factor / f64::from(population)).ceil())
}

/// Attack bonus of one weapon, from monster health `x`.
pub fn weapon_damage(x: u32, population: u32, delta: ResilienceDelta) -> u32 {
    per_agent_value(x, WEAPON_FACTOR, population, delta)
}

/// Defense bonus of one shield, from monster damage `y`.
pub fn shield_protection(y: u32, population: u32, delta: ResilienceDelta) -> u32 {
    per_agent_value(y, 1.0, population, delta)
}

/// Hp restored by one health potion, from monster damage `y`.
pub fn health_potion_value(y: u32, population: u32, delta: ResilienceDelta) -> u32 {
    per_agent_value(y, POTION_FACTOR, population, delta)
}

/// Stamina restored by one stamina potion, from monster health `x`.
pub fn stamina_potion_value(x: u32, population: u32, delta: ResilienceDelta) -> u32 {
    per_agent_value(x, POTION_FACTOR, population, delta)
}

/// Roll the loot for a cleared level.
///
/// `monster` is the monster as generated for the level (full health), and
/// `population` the number of agents still alive to share the drop.
pub fn roll_level_loot<R: Rng + ?Sized>(
    monster: &MonsterStats,
    population: u32,
    potion_scarcity: f64,
    equipment_scarcity: f64,
    rng: &mut R,
) -> LevelLoot {
    let potions = potion_distribution(potion_scarcity, population, rng);
    let equipment = equipment_distribution(equipment_scarcity, population, rng);
    LevelLoot {
        potions,
        equipment,
        weapon_damage: weapon_damage(monster.health, population, ResilienceDelta::sample(rng)),
        shield_protection: shield_protection(
            monster.damage,
            population,
            ResilienceDelta::sample(rng),
        ),
        health_potion: health_potion_value(monster.damage, population, ResilienceDelta::sample(rng)),
        stamina_potion: stamina_potion_value(
            monster.health,
            population,
            ResilienceDelta::sample(rng),
        ),
    }
}
