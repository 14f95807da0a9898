use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Map geometry, movement and pacing
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MotionConfig {
    /// Distance covered by one motion step at full speed (map units)
    #[serde(default = "default_step_distance")]
    pub step_distance: f64,

    /// Motion steps needed to reach full speed at the start of a leg
    #[serde(default = "default_speed_steps")]
    pub speed_steps: u32,

    /// Delay multiplier applied to example drones so they can be followed
    #[serde(default = "default_example_slowdown")]
    pub example_slowdown: u32,

    /// Random locations are quantised to this pixel grid
    #[serde(default = "default_map_px")]
    pub map_width_px: u32,

    #[serde(default = "default_map_px")]
    pub map_height_px: u32,

    /// Fixed RNG seed for repeatable runs
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            step_distance: default_step_distance(),
            speed_steps: default_speed_steps(),
            example_slowdown: default_example_slowdown(),
            map_width_px: default_map_px(),
            map_height_px: default_map_px(),
            seed: None,
        }
    }
}

impl MotionConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.step_distance > 0.0) {
            return Err(Error::Config(ConfigError::Message(format!(
                "step_distance must be positive, got {}",
                self.step_distance
            ))));
        }

        if self.speed_steps == 0 {
            return Err(Error::Config(ConfigError::Message("speed_steps must be > 0".into())));
        }

        if self.example_slowdown == 0 {
            return Err(Error::Config(ConfigError::Message(
                "example_slowdown must be > 0".into(),
            )));
        }

        if self.map_width_px == 0 || self.map_height_px == 0 {
            return Err(Error::Config(ConfigError::Message(format!(
                "map size {}x{} must be non-zero",
                self.map_width_px, self.map_height_px
            ))));
        }

        Ok(())
    }
}

fn default_step_distance() -> f64 {
    0.01
}
fn default_speed_steps() -> u32 {
    5
}
fn default_example_slowdown() -> u32 {
    10
}
fn default_map_px() -> u32 {
    800
}
