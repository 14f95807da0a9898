use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Job backlog replenishment
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BacklogConfig {
    /// Minimum number of Waiting jobs kept available regardless of fleet size
    #[serde(default = "default_floor")]
    pub floor: usize,

    /// Waiting jobs kept per drone
    #[serde(default = "default_overcommit_factor")]
    pub overcommit_factor: f64,

    /// Chance that a delivered job is parked OnHold instead of Waiting
    #[serde(default = "default_hold_probability")]
    pub hold_probability: f64,
}

impl Default for BacklogConfig {
    fn default() -> Self {
        Self {
            floor: default_floor(),
            overcommit_factor: default_overcommit_factor(),
            hold_probability: default_hold_probability(),
        }
    }
}

impl BacklogConfig {
    pub fn validate(&self) -> Result<()> {
        if self.overcommit_factor < 1.0 {
            return Err(Error::Config(ConfigError::Message(format!(
                "overcommit_factor must be at least 1.0, got {}",
                self.overcommit_factor
            ))));
        }

        if !(0.0..=1.0).contains(&self.hold_probability) {
            return Err(Error::Config(ConfigError::Message(format!(
                "hold_probability must be within [0, 1], got {}",
                self.hold_probability
            ))));
        }

        Ok(())
    }
}

fn default_floor() -> usize {
    30
}
fn default_overcommit_factor() -> f64 {
    1.1
}
fn default_hold_probability() -> f64 {
    0.0
}
