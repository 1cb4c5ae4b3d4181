//! Game engine binary for the Horde simulation.
//!
//! Wires configuration, the agent spawner, and the game loop together and
//! prints the final report as JSON.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from the path given as the first argument, or
//!    `horde-config.yaml` in the working directory
//! 2. Initialize structured logging (tracing)
//! 3. Seed the game generator from `game.seed`
//! 4. Spawn the starting population
//! 5. Run the game
//! 6. Log and print the report

mod error;
mod spawner;
mod strategies;

use std::path::{Path, PathBuf};

use horde_core::config::{HordeConfig, LoggingConfig};
use horde_core::runner;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "horde-config.yaml";

/// Application entry point for the game engine.
///
/// # Errors
///
/// Returns an error if configuration, spawning, or the game itself fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config_path = std::env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let (config, loaded_from_file) = load_config(&config_path)?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!("horde-engine starting");
    if loaded_from_file {
        info!(path = %config_path.display(), "Configuration loaded");
    } else {
        info!(path = %config_path.display(), "Config file not found, using defaults");
    }
    info!(
        seed = config.game.seed,
        levels = config.game.num_levels,
        initial_agents = config.game.initial_agents,
        starting_hp = config.game.starting_hp,
        decision_timeout_ms = config.game.decision_timeout_ms,
        "Game configuration"
    );

    // 3. Seed the game generator.
    let mut rng = SmallRng::seed_from_u64(config.game.seed);

    // 4. Spawn the starting population.
    let spawn_result = spawner::spawn_population(&config, &mut rng).map_err(EngineError::from)?;
    info!(
        agents_spawned = spawn_result.roster.len(),
        personalities = ?spawn_result.personalities,
        "Starting population ready"
    );
    let mut roster = spawn_result.roster;

    // 5. Run the game.
    let report = runner::run_game(&config, &mut roster, &mut rng)
        .await
        .map_err(EngineError::from)?;

    // 6. Report.
    let json = serde_json::to_string_pretty(&report).map_err(EngineError::from)?;
    info!(
        outcome = ?report.outcome,
        total_rounds = report.total_rounds,
        "horde-engine shutdown complete"
    );
    println!("{json}");

    Ok(())
}

/// Install the tracing subscriber. `RUST_LOG` takes precedence over the
/// configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

/// Load the game configuration, falling back to defaults when the file is
/// missing.
///
/// Returns the configuration and whether it came from disk.
fn load_config(path: &Path) -> Result<(HordeConfig, bool), EngineError> {
    if path.exists() {
        Ok((HordeConfig::from_file(path)?, true))
    } else {
        Ok((HordeConfig::from_env()?, false))
    }
}
