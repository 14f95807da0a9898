use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Which drones write the advisory `candidate` mark on search results.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CandidateMarking {
    /// Only example drones mark their candidates.
    #[default]
    Examples,
    /// Every searching drone marks its candidates.
    All,
    Off,
}

impl CandidateMarking {
    pub fn applies_to(
        self,
        is_example: bool,
    ) -> bool {
        match self {
            CandidateMarking::Examples => is_example,
            CandidateMarking::All => true,
            CandidateMarking::Off => false,
        }
    }
}

/// Expanding-radius search parameters
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MatchingConfig {
    /// Radius of the first search after start-up or a successful claim
    #[serde(default = "default_min_radius")]
    pub min_radius: f64,

    /// Multiplier applied to the radius after each failed search
    #[serde(default = "default_enlargement_factor")]
    pub enlargement_factor: f64,

    /// Upper bound of the radius; the unit map diagonal is ~1.42
    #[serde(default = "default_max_radius")]
    pub max_radius: f64,

    #[serde(default)]
    pub candidate_marking: CandidateMarking,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            min_radius: default_min_radius(),
            enlargement_factor: default_enlargement_factor(),
            max_radius: default_max_radius(),
            candidate_marking: CandidateMarking::default(),
        }
    }
}

impl MatchingConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.min_radius > 0.0) {
            return Err(Error::Config(ConfigError::Message(format!(
                "min_radius must be positive, got {}",
                self.min_radius
            ))));
        }

        if !(self.enlargement_factor > 1.0) {
            return Err(Error::Config(ConfigError::Message(format!(
                "enlargement_factor must be greater than 1.0, got {}",
                self.enlargement_factor
            ))));
        }

        if self.max_radius < self.min_radius {
            return Err(Error::Config(ConfigError::Message(format!(
                "max_radius {} should not be less than min_radius {}",
                self.max_radius, self.min_radius
            ))));
        }

        Ok(())
    }
}

fn default_min_radius() -> f64 {
    0.05
}
fn default_enlargement_factor() -> f64 {
    2.0
}
fn default_max_radius() -> f64 {
    2.0
}
