//! Population health statistics.
//!
//! Dynamic sanctions compare one agent's Hp against a band of one standard
//! deviation around the population mean.

use std::collections::BTreeMap;

use horde_types::{AgentId, AgentState};

/// Mean and population standard deviation of live agents' Hp.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HpStats {
    /// Arithmetic mean Hp.
    pub mean: f64,
    /// Population standard deviation of Hp.
    pub std_dev: f64,
}

/// Where an Hp value sits relative to the one-deviation band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HpBand {
    /// At or above `mean + std_dev`.
    Above,
    /// Strictly inside the band.
    Within,
    /// At or below `mean - std_dev`.
    Below,
}

impl HpStats {
    /// Compute statistics over a set of Hp values.
    ///
    /// An empty set yields zeros rather than NaN.
    #[allow(clippy::cast_precision_loss)]
    pub fn from_values(values: &[u32]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let count = values.len() as f64;
        let mean = values.iter().map(|v| f64::from(*v)).sum::<f64>() / count;
        let variance = values
            .iter()
            .map(|v| {
                let diff = f64::from(*v) - mean;
                diff * diff
            })
            .sum::<f64>()
            / count;
        Self {
            mean,
            std_dev: variance.sqrt(),
        }
    }

    /// Compute statistics over every agent in a state map.
    pub fn from_states(states: &BTreeMap<AgentId, AgentState>) -> Self {
        let values: Vec<u32> = states.values().map(|s| s.hp).collect();
        Self::from_values(&values)
    }

    /// Classify an Hp value against `mean ± std_dev`.
    pub fn band(&self, hp: u32) -> HpBand {
        let hp = f64::from(hp);
        if hp >= self.mean + self.std_dev {
            HpBand::Above
        } else if hp <= self.mean - self.std_dev {
            HpBand::Below
        } else {
            HpBand::Within
        }
    }
}
