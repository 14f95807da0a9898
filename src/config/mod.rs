//! Configuration management for the dispatch engine.
//!
//! Sources are merged with increasing priority:
//! 1. Default values (hardcoded)
//! 2. Config file named by `FLEET_CONFIG_PATH` (or passed to
//!    [`FleetConfig::with_override_config`])
//! 3. Environment variables with the `FLEET__` prefix

mod backlog;
mod matching;
mod monitoring;
mod motion;
mod storage;
mod wave;
pub use backlog::*;
pub use matching::*;
pub use monitoring::*;
pub use motion::*;
pub use storage::*;
pub use wave::*;


//---
use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::CONFIG_PATH_ENV;
use crate::constants::ENV_PREFIX;
use crate::Result;

/// Main configuration container for the fleet.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct FleetConfig {
    /// Expanding-radius search and candidate marking
    #[serde(default)]
    pub matching: MatchingConfig,
    /// Job backlog replenishment
    #[serde(default)]
    pub backlog: BacklogConfig,
    /// Map geometry, movement and pacing
    #[serde(default)]
    pub motion: MotionConfig,
    /// Wave activation and retirement
    #[serde(default)]
    pub wave: WaveConfig,
    /// Store backend selection
    #[serde(default)]
    pub storage: StorageConfig,
    /// Metering reporter
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl FleetConfig {
    /// Loads configuration from defaults, the `FLEET_CONFIG_PATH` file (if
    /// set) and `FLEET__` environment variables.
    ///
    /// Validation is deferred: call [`FleetConfig::validate`] after all
    /// overrides have been applied.
    ///
    /// ```ignore
    /// let cfg = FleetConfig::new()?
    ///     .with_override_config("fleet.toml")?
    ///     .validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Merges a config file on top of the current values. Environment
    /// variables are re-applied so they keep the highest priority.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every section and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.matching.validate()?;
        self.backlog.validate()?;
        self.motion.validate()?;
        self.wave.validate()?;
        self.storage.validate()?;
        self.monitoring.validate()?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}
