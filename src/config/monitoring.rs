use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitoringConfig {
    /// Log per-interval store and claim rates while waves run
    #[serde(default = "default_metering_enabled")]
    pub metering_enabled: bool,

    #[serde(default = "default_metering_interval_secs")]
    pub metering_interval_secs: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metering_enabled: default_metering_enabled(),
            metering_interval_secs: default_metering_interval_secs(),
        }
    }
}

impl MonitoringConfig {
    pub fn validate(&self) -> Result<()> {
        if self.metering_enabled && self.metering_interval_secs == 0 {
            return Err(Error::Config(ConfigError::Message(
                "metering_interval_secs cannot be 0 when metering is enabled".into(),
            )));
        }
        Ok(())
    }

    pub fn metering_interval(&self) -> Duration {
        Duration::from_secs(self.metering_interval_secs)
    }
}

fn default_metering_enabled() -> bool {
    false
}

fn default_metering_interval_secs() -> u64 {
    3
}
