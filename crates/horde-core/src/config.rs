//! Configuration loading and typed config structures for the Horde
//! simulation.
//!
//! The canonical configuration lives in `horde-config.yaml` at the project
//! root. Every field has a default, so an empty file is a valid
//! configuration. A handful of environment variables override the file
//! when it is loaded; see [`HordeConfig::apply_overrides`].
//! [`HordeConfig::parse`] never reads the environment.

use std::path::Path;
use std::time::Duration;

use horde_agents::{Personality, SanctionPolicy, ScalingParams};
use serde::Deserialize;
use tracing::warn;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but describes an unplayable game.
    #[error("invalid config: {message}")]
    Invalid {
        /// What is wrong with it.
        message: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level simulation configuration.
///
/// Mirrors the structure of `horde-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HordeConfig {
    /// Game shape: seed, levels, population, starting stats.
    #[serde(default)]
    pub game: GameConfig,

    /// Sanction duration policy.
    #[serde(default)]
    pub sanctions: SanctionsConfig,

    /// Loot scarcity.
    #[serde(default)]
    pub loot: LootConfig,

    /// Personality presets and population mix.
    #[serde(default)]
    pub personality: PersonalityConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl HordeConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Process environment overrides are applied before validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if the result fails [`Self::validate`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_with(&contents, |key| std::env::var(key).ok())
    }

    /// Defaults with process environment overrides applied, for runs
    /// without a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the overrides fail
    /// [`Self::validate`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::parse_with("", |key| std::env::var(key).ok())
    }

    /// Parse configuration from a YAML string. The environment is not
    /// consulted.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if the result fails [`Self::validate`].
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        Self::parse_with(yaml, |_| None)
    }

    /// Parse configuration from a YAML string, then apply overrides from
    /// `lookup` before validating.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if the result fails [`Self::validate`].
    pub fn parse_with(
        yaml: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.apply_overrides(lookup);
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from any key lookup. Unparseable values are logged
    /// and skipped.
    ///
    /// - `STARTING_HP` overrides `game.starting_hp`
    /// - `BASE_STAMINA` overrides `game.base_stamina`
    /// - `POTION_SCARCITY_PCT` overrides `loot.potion_scarcity`
    /// - `EQUIPMENT_SCARCITY_PCT` overrides `loot.equipment_scarcity`
    /// - `SELFISH_PER`, `COLLECTIVE_PER`, `SELFLESS_PER` override the
    ///   personality presets
    /// - `UPDATE_PERSONALITY` overrides `personality.update`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        override_with(&lookup, "STARTING_HP", &mut self.game.starting_hp);
        override_with(&lookup, "BASE_STAMINA", &mut self.game.base_stamina);
        override_with(&lookup, "POTION_SCARCITY_PCT", &mut self.loot.potion_scarcity);
        override_with(
            &lookup,
            "EQUIPMENT_SCARCITY_PCT",
            &mut self.loot.equipment_scarcity,
        );
        override_with(&lookup, "SELFISH_PER", &mut self.personality.selfish);
        override_with(&lookup, "COLLECTIVE_PER", &mut self.personality.collective);
        override_with(&lookup, "SELFLESS_PER", &mut self.personality.selfless);
        override_with(&lookup, "UPDATE_PERSONALITY", &mut self.personality.update);
    }

    /// Reject configurations that cannot produce a game.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for zero levels, an empty starting
    /// population, zero starting Hp, a scarcity outside `0..=1`, or a
    /// personality preset above 100.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| -> Result<(), ConfigError> {
            Err(ConfigError::Invalid {
                message: message.to_owned(),
            })
        };
        if self.game.num_levels == 0 {
            return invalid("game.num_levels must be at least 1");
        }
        if self.game.initial_agents == 0 {
            return invalid("game.initial_agents must be at least 1");
        }
        if self.game.starting_hp == 0 {
            return invalid("game.starting_hp must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.loot.potion_scarcity)
            || !(0.0..=1.0).contains(&self.loot.equipment_scarcity)
        {
            return invalid("loot scarcity must lie in 0..=1");
        }
        let presets = [
            self.personality.selfish,
            self.personality.collective,
            self.personality.selfless,
        ];
        if presets.iter().any(|p| *p > 100) {
            return invalid("personality presets must lie in 0..=100");
        }
        Ok(())
    }

    /// Inputs to the monster formulas.
    pub const fn scaling_params(&self) -> ScalingParams {
        ScalingParams {
            population: self.game.initial_agents,
            stamina: self.game.base_stamina,
            base_health: self.game.starting_hp,
            level_count: self.game.num_levels,
        }
    }
}

fn override_with<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *target = value,
        Err(_) => warn!(key, value = %raw, "ignoring unparseable config override"),
    }
}

/// Game shape.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GameConfig {
    /// Random seed for reproducibility.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Number of levels to clear for a victory.
    #[serde(default = "default_num_levels")]
    pub num_levels: u32,

    /// Agents spawned at the start of the game.
    #[serde(default = "default_initial_agents")]
    pub initial_agents: u32,

    /// Starting Hp per agent; also the base for cower healing.
    #[serde(default = "default_starting_hp")]
    pub starting_hp: u32,

    /// Base stamina per agent, used by the monster formulas.
    #[serde(default = "default_base_stamina")]
    pub base_stamina: u32,

    /// Starting attack per agent.
    #[serde(default = "default_base_attack")]
    pub base_attack: u32,

    /// Starting defense per agent.
    #[serde(default = "default_base_defense")]
    pub base_defense: u32,

    /// Rounds allowed per level before the game ends in a stalemate.
    #[serde(default = "default_max_rounds_per_level")]
    pub max_rounds_per_level: u32,

    /// Milliseconds to wait for each agent's decision (0 = wait forever).
    #[serde(default)]
    pub decision_timeout_ms: u64,
}

impl GameConfig {
    /// The decision deadline, if one is configured.
    pub const fn decision_timeout(&self) -> Option<Duration> {
        if self.decision_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.decision_timeout_ms))
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            num_levels: default_num_levels(),
            initial_agents: default_initial_agents(),
            starting_hp: default_starting_hp(),
            base_stamina: default_base_stamina(),
            base_attack: default_base_attack(),
            base_defense: default_base_defense(),
            max_rounds_per_level: default_max_rounds_per_level(),
            decision_timeout_ms: 0,
        }
    }
}

/// Which duration policy new sanctions follow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanctionPolicyKind {
    /// Always `fixed_duration` rounds.
    #[default]
    Fixed,
    /// One round more than the last sanction, capped at
    /// `max_graduated_duration`.
    Graduated,
    /// Nudged by the agent's Hp, starting from `fixed_duration`.
    Dynamic,
}

/// Sanction configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SanctionsConfig {
    /// Duration policy.
    #[serde(default)]
    pub policy: SanctionPolicyKind,

    /// Rounds per sanction under the fixed policy, and the first sanction
    /// under the dynamic one.
    #[serde(default = "default_fixed_duration")]
    pub fixed_duration: u32,

    /// Cap for the graduated policy.
    #[serde(default = "default_max_graduated_duration")]
    pub max_graduated_duration: u32,

    /// Share one sanction ledger across successive leaders.
    #[serde(default)]
    pub persistent: bool,
}

impl SanctionsConfig {
    /// The configured policy with its parameter filled in.
    pub const fn policy(&self) -> SanctionPolicy {
        match self.policy {
            SanctionPolicyKind::Fixed => SanctionPolicy::Fixed {
                duration: self.fixed_duration,
            },
            SanctionPolicyKind::Graduated => SanctionPolicy::Graduated {
                max: self.max_graduated_duration,
            },
            SanctionPolicyKind::Dynamic => SanctionPolicy::Dynamic {
                initial: self.fixed_duration,
            },
        }
    }
}

impl Default for SanctionsConfig {
    fn default() -> Self {
        Self {
            policy: SanctionPolicyKind::Fixed,
            fixed_duration: default_fixed_duration(),
            max_graduated_duration: default_max_graduated_duration(),
            persistent: false,
        }
    }
}

/// Loot scarcity configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LootConfig {
    /// Potions dropped per agent, as a fraction.
    #[serde(default = "default_potion_scarcity")]
    pub potion_scarcity: f64,

    /// Equipment dropped per agent, as a fraction.
    #[serde(default = "default_equipment_scarcity")]
    pub equipment_scarcity: f64,
}

impl Default for LootConfig {
    fn default() -> Self {
        Self {
            potion_scarcity: default_potion_scarcity(),
            equipment_scarcity: default_equipment_scarcity(),
        }
    }
}

/// Personality presets, population mix, and drift toggle.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PersonalityConfig {
    /// Score of the selfish preset.
    #[serde(default = "default_selfish")]
    pub selfish: u32,

    /// Score of the collective preset.
    #[serde(default = "default_collective")]
    pub collective: u32,

    /// Score of the selfless preset.
    #[serde(default = "default_selfless")]
    pub selfless: u32,

    /// Relative weights used when spawning the population.
    #[serde(default)]
    pub mix: PersonalityMix,

    /// Let leaders' personalities drift with their health.
    #[serde(default = "default_true")]
    pub update: bool,
}

impl PersonalityConfig {
    /// Configured score for a preset.
    pub const fn score(&self, personality: Personality) -> u32 {
        match personality {
            Personality::Selfish => self.selfish,
            Personality::Collective => self.collective,
            Personality::Selfless => self.selfless,
        }
    }
}

impl Default for PersonalityConfig {
    fn default() -> Self {
        Self {
            selfish: default_selfish(),
            collective: default_collective(),
            selfless: default_selfless(),
            mix: PersonalityMix::default(),
            update: true,
        }
    }
}

/// Spawn weights per personality preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PersonalityMix {
    /// Weight of selfish agents.
    #[serde(default = "default_weight")]
    pub selfish: u32,

    /// Weight of collective agents.
    #[serde(default = "default_weight")]
    pub collective: u32,

    /// Weight of selfless agents.
    #[serde(default = "default_weight")]
    pub selfless: u32,
}

impl PersonalityMix {
    /// Preset and weight pairs, in a fixed order.
    pub const fn weighted(&self) -> [(Personality, u32); 3] {
        [
            (Personality::Selfish, self.selfish),
            (Personality::Collective, self.collective),
            (Personality::Selfless, self.selfless),
        ]
    }
}

impl Default for PersonalityMix {
    fn default() -> Self {
        Self {
            selfish: default_weight(),
            collective: default_weight(),
            selfless: default_weight(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

const fn default_seed() -> u64 {
    42
}

const fn default_num_levels() -> u32 {
    10
}

const fn default_initial_agents() -> u32 {
    30
}

const fn default_starting_hp() -> u32 {
    1000
}

const fn default_base_stamina() -> u32 {
    2000
}

const fn default_base_attack() -> u32 {
    20
}

const fn default_base_defense() -> u32 {
    20
}

const fn default_max_rounds_per_level() -> u32 {
    100
}

const fn default_fixed_duration() -> u32 {
    3
}

const fn default_max_graduated_duration() -> u32 {
    5
}

const fn default_potion_scarcity() -> f64 {
    0.2
}

const fn default_equipment_scarcity() -> f64 {
    0.15
}

const fn default_selfish() -> u32 {
    Personality::Selfish.default_score()
}

const fn default_collective() -> u32 {
    Personality::Collective.default_score()
}

const fn default_selfless() -> u32 {
    Personality::Selfless.default_score()
}

const fn default_weight() -> u32 {
    1
}

const fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_values() {
        let config = HordeConfig::default();
        assert_eq!(config.game.seed, 42);
        assert_eq!(config.game.starting_hp, 1000);
        assert_eq!(config.game.base_stamina, 2000);
        assert_eq!(config.sanctions.policy(), SanctionPolicy::Fixed { duration: 3 });
        assert!((config.loot.potion_scarcity - 0.2).abs() < f64::EPSILON);
        assert!((config.loot.equipment_scarcity - 0.15).abs() < f64::EPSILON);
        assert_eq!(config.personality.collective, 50);
        assert!(config.personality.update);
        assert!(config.game.decision_timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
game:
  seed: 7
  num_levels: 4
  initial_agents: 8
  starting_hp: 100
  base_stamina: 1000
  base_attack: 10
  base_defense: 6
  max_rounds_per_level: 50
  decision_timeout_ms: 250

sanctions:
  policy: graduated
  fixed_duration: 2
  max_graduated_duration: 6
  persistent: true

loot:
  potion_scarcity: 0.3
  equipment_scarcity: 0.1

personality:
  selfish: 10
  collective: 40
  selfless: 90
  mix:
    selfish: 0
    collective: 3
    selfless: 1
  update: false

logging:
  level: "debug"
  json: true
"#;
        let config = HordeConfig::parse(yaml).unwrap();

        assert_eq!(config.game.num_levels, 4);
        assert_eq!(config.game.decision_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.sanctions.policy(), SanctionPolicy::Graduated { max: 6 });
        assert!(config.sanctions.persistent);
        assert_eq!(config.personality.score(Personality::Selfless), 90);
        assert_eq!(config.personality.mix.weighted()[0], (Personality::Selfish, 0));
        assert!(!config.personality.update);
        assert!(config.logging.json);
        assert_eq!(
            config.scaling_params(),
            ScalingParams {
                population: 8,
                stamina: 1000,
                base_health: 100,
                level_count: 4,
            }
        );
    }

    #[test]
    fn parse_minimal_yaml() {
        let config = HordeConfig::parse("game:\n  seed: 9\n").unwrap();
        assert_eq!(config.game.seed, 9);
        assert_eq!(config.game.initial_agents, 30);
        assert_eq!(config.sanctions.fixed_duration, 3);
    }

    #[test]
    fn parse_empty_yaml() {
        assert!(HordeConfig::parse("").is_ok());
    }

    #[test]
    fn dynamic_policy_starts_from_fixed_duration() {
        let yaml = "sanctions:\n  policy: dynamic\n  fixed_duration: 4\n";
        let config = HordeConfig::parse(yaml).unwrap();
        assert_eq!(config.sanctions.policy(), SanctionPolicy::Dynamic { initial: 4 });
    }

    #[test]
    fn overrides_replace_values() {
        let mut config = HordeConfig::default();
        config.apply_overrides(lookup(&[
            ("STARTING_HP", "500"),
            ("POTION_SCARCITY_PCT", "0.5"),
            ("UPDATE_PERSONALITY", "false"),
            ("SELFLESS_PER", "80"),
        ]));
        assert_eq!(config.game.starting_hp, 500);
        assert!((config.loot.potion_scarcity - 0.5).abs() < f64::EPSILON);
        assert!(!config.personality.update);
        assert_eq!(config.personality.selfless, 80);
    }

    #[test]
    fn parse_ignores_overrides_that_parse_with_applies() {
        let yaml = "game:\n  starting_hp: 700\n";
        let overrides = lookup(&[("STARTING_HP", "300"), ("BASE_STAMINA", "900")]);

        let plain = HordeConfig::parse(yaml).unwrap();
        let overridden = HordeConfig::parse_with(yaml, overrides).unwrap();

        assert_eq!(plain.game.starting_hp, 700);
        assert_eq!(plain.game.base_stamina, 2000);
        assert_eq!(overridden.game.starting_hp, 300);
        assert_eq!(overridden.game.base_stamina, 900);
    }

    #[test]
    fn overrides_are_validated() {
        let result = HordeConfig::parse_with("", lookup(&[("STARTING_HP", "0")]));
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn bad_override_is_ignored() {
        let mut config = HordeConfig::default();
        config.apply_overrides(lookup(&[("BASE_STAMINA", "lots")]));
        assert_eq!(config.game.base_stamina, 2000);
    }

    #[test]
    fn validate_rejects_unplayable_games() {
        for yaml in [
            "game:\n  num_levels: 0\n",
            "game:\n  initial_agents: 0\n",
            "game:\n  starting_hp: 0\n",
            "loot:\n  potion_scarcity: 1.5\n",
            "personality:\n  selfless: 101\n",
        ] {
            let result = HordeConfig::parse(yaml);
            assert!(
                matches!(result, Err(ConfigError::Invalid { .. })),
                "accepted {yaml:?}"
            );
        }
    }

    #[test]
    fn malformed_yaml_is_a_yaml_error() {
        let result = HordeConfig::parse("game: [unclosed");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }

    #[test]
    fn load_project_config_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("horde-config.yaml");
        if path.exists() {
            let config = HordeConfig::from_file(&path);
            assert!(config.is_ok(), "failed to load project config: {config:?}");
        }
    }
}
