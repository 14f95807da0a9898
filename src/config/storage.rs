use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sled,
}

/// Store backend selection
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Directory of the sled database, used by the sled backend only
    #[serde(default = "default_sled_path")]
    pub sled_path: PathBuf,

    /// Purge both stores when the controller starts
    #[serde(default = "default_reset_on_start")]
    pub reset_on_start: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            sled_path: default_sled_path(),
            reset_on_start: default_reset_on_start(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<()> {
        if self.backend == StoreBackend::Sled && self.sled_path.as_os_str().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "sled_path cannot be empty when the sled backend is selected".into(),
            )));
        }
        Ok(())
    }
}

fn default_sled_path() -> PathBuf {
    PathBuf::from("./db/fleet")
}
fn default_reset_on_start() -> bool {
    true
}
