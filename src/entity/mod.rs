//! Drones, jobs and the locked cells they are mutated through.
//!
//! Every persisted record carries a store-managed version. Local copies are
//! held in a [`Tracked`] cell; mutators and `put` calls only exist on the
//! [`WriteScope`] handed out by [`Tracked::write`], so a record cannot be
//! changed or persisted without holding its exclusive lock.

mod drone;
mod job;
mod location;
mod scope;
pub use drone::*;
pub use job::*;
pub use location::*;
pub use scope::*;

#[cfg(test)]
mod job_test;

//---
use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub type EntityId = u64;
pub type DroneId = EntityId;
pub type JobId = EntityId;

/// A record kept in an [`EntityStore`](crate::EntityStore).
///
/// `assign_id` and `set_version` are owned by the store; everything else
/// treats both as read-only.
pub trait Entity: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static {
    type State: Copy + Eq + Debug + Send + Sync + 'static;

    /// Human readable record kind, used in errors and logs.
    const KIND: &'static str;

    fn id(&self) -> EntityId;

    fn version(&self) -> u64;

    fn state(&self) -> Self::State;

    /// Position used by proximity queries.
    fn anchor(&self) -> Location;

    #[doc(hidden)]
    fn assign_id(
        &mut self,
        id: EntityId,
    );

    #[doc(hidden)]
    fn set_version(
        &mut self,
        version: u64,
    );
}
