use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// When a drone that reached its trip quota may go off duty.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetirementPolicy {
    /// Drones keep delivering until a lead drone (an example drone or drone
    /// #1) has finished its own quota.
    #[default]
    LeadCutoff,
    /// Drones retire as soon as their own quota is reached.
    Quota,
}

/// Wave activation and runtime sizing
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WaveConfig {
    #[serde(default)]
    pub retirement_policy: RetirementPolicy,

    /// Worker threads of the step runtime; 0 means one per core
    #[serde(default)]
    pub worker_threads: usize,

    /// Periodically log the drones a wave is still waiting for
    #[serde(default)]
    pub barrier_diagnostics: bool,

    #[serde(default = "default_diagnostics_interval_ms")]
    pub diagnostics_interval_ms: u64,
}

impl Default for WaveConfig {
    fn default() -> Self {
        Self {
            retirement_policy: RetirementPolicy::default(),
            worker_threads: 0,
            barrier_diagnostics: false,
            diagnostics_interval_ms: default_diagnostics_interval_ms(),
        }
    }
}

impl WaveConfig {
    pub fn validate(&self) -> Result<()> {
        if self.barrier_diagnostics && self.diagnostics_interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "diagnostics_interval_ms must be > 0 when barrier_diagnostics is enabled".into(),
            )));
        }
        Ok(())
    }

    pub fn diagnostics_interval(&self) -> Duration {
        Duration::from_millis(self.diagnostics_interval_ms)
    }
}

fn default_diagnostics_interval_ms() -> u64 {
    1000
}
