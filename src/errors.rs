//! Fleet Dispatch Error Hierarchy
//!
//! Errors are layered by concern: store access, configuration and wave
//! coordination. Programming errors (illegal transitions, double barrier
//! signals) are not represented here; they panic at the call site.

use config::ConfigError;

use crate::EntityId;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Store access failures (conflicts, missing records, backend faults)
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Wave coordination failures
    #[error(transparent)]
    Wave(#[from] WaveError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Optimistic write lost the race: the persisted version moved on.
    #[error("{kind} {id} version conflict: expected {expected}, found {actual:?}")]
    Conflict {
        kind: &'static str,
        id: EntityId,
        expected: u64,
        actual: Option<u64>,
    },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: EntityId },

    /// Backend fault (I/O, injected failure)
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Codec(#[from] bincode::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum WaveError {
    /// Diagnostic only: the barrier did not settle within the wait window.
    #[error("Wave barrier stalled with {} outstanding drones: {outstanding:?}", outstanding.len())]
    BarrierStall { outstanding: Vec<EntityId> },

    #[error("Scheduler is shutting down")]
    ShuttingDown,

    #[error("Invalid wave: {0}")]
    InvalidSpec(String),
}

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

impl Error {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Store(e) if e.is_conflict())
    }
}
