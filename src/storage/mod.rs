//! Record stores with optimistic, version-checked writes.
//!
//! Stores offer no transactions and no locks: every write is a
//! compare-and-swap on the record version, and proximity is answered by a
//! filtered scan.

mod adaptors;
pub use adaptors::*;


use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::Drone;
use crate::Entity;
use crate::EntityId;
use crate::Job;
use crate::Location;
use crate::Result;
use crate::StorageConfig;
use crate::StoreBackend;
use crate::StoreResult;

/// Lazy result of a scan. Dropping it cancels the scan; each call to
/// [`EntityStore::scan_all`] starts a fresh one.
pub type EntityIter<E> = Box<dyn Iterator<Item = StoreResult<E>>>;

pub type Predicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Per-entity-type store capability.
pub trait EntityStore<E: Entity>: Send + Sync {
    /// Persists a new record. The store assigns the id (from its own
    /// monotonic sequence) and the initial version; the stored record is
    /// returned.
    fn create(
        &self,
        entity: E,
    ) -> StoreResult<E>;

    fn get(
        &self,
        id: EntityId,
    ) -> StoreResult<E>;

    /// Replaces the record iff its persisted version equals
    /// `expected_version`, returning the new version. Any other outcome
    /// leaves the store untouched.
    fn put(
        &self,
        entity: &E,
        expected_version: u64,
    ) -> StoreResult<u64>;

    fn scan_all(
        &self,
        predicate: Predicate<E>,
    ) -> StoreResult<EntityIter<E>>;

    /// Records in `state` whose anchor lies within `radius` of `center`.
    fn proximity_query(
        &self,
        center: Location,
        radius: f64,
        state: E::State,
    ) -> StoreResult<EntityIter<E>> {
        self.scan_all(Arc::new(move |e: &E| {
            e.state() == state && e.anchor().distance_to(&center) <= radius
        }))
    }

    /// Purges every record and restarts the id sequence.
    fn clear(&self) -> StoreResult<()>;
}

/// Counts records in `state`, failing on the first backend fault.
pub fn count_in_state<E: Entity>(
    store: &dyn EntityStore<E>,
    state: E::State,
) -> StoreResult<usize> {
    let mut count = 0;
    for entity in store.scan_all(Arc::new(move |e: &E| e.state() == state))? {
        entity?;
        count += 1;
    }
    Ok(count)
}

/// Collects a scan into a vector ordered by id.
pub fn collect_sorted<E: Entity>(iter: EntityIter<E>) -> StoreResult<Vec<E>> {
    let mut entities = iter.collect::<StoreResult<Vec<E>>>()?;
    entities.sort_by_key(|e| e.id());
    Ok(entities)
}

/// Drone and job stores of one fleet, backed by the same backend.
#[derive(Clone)]
pub struct FleetStores {
    pub drones: Arc<dyn EntityStore<Drone>>,
    pub jobs: Arc<dyn EntityStore<Job>>,
}

impl FleetStores {
    pub fn new(
        drones: Arc<dyn EntityStore<Drone>>,
        jobs: Arc<dyn EntityStore<Job>>,
    ) -> Self {
        Self { drones, jobs }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemStore::<Drone>::new()), Arc::new(MemStore::<Job>::new()))
    }

    pub fn sled(db: &sled::Db) -> StoreResult<Self> {
        Ok(Self::new(
            Arc::new(SledStore::<Drone>::open(db, crate::constants::DRONE_TREE)?),
            Arc::new(SledStore::<Job>::open(db, crate::constants::JOB_TREE)?),
        ))
    }

    /// Opens the configured backend.
    pub fn open(config: &StorageConfig) -> Result<Self> {
        let stores = match config.backend {
            StoreBackend::Memory => Self::in_memory(),
            StoreBackend::Sled => {
                let db = init_sled_fleet_db(&config.sled_path)
                    .map_err(|e| crate::Error::Fatal(format!("open sled db: {e}")))?;
                Self::sled(&db)?
            }
        };
        info!("opened {:?} store backend", config.backend);
        if config.reset_on_start {
            stores.clear()?;
        }
        Ok(stores)
    }

    pub fn clear(&self) -> StoreResult<()> {
        self.drones.clear()?;
        self.jobs.clear()
    }
}

pub fn init_sled_fleet_db(
    sled_db_path: impl AsRef<Path> + Debug
) -> std::result::Result<sled::Db, std::io::Error> {
    debug!("init_sled_fleet_db from path: {:?}", &sled_db_path);

    sled::Config::default()
        .path(sled_db_path.as_ref())
        .use_compression(true)
        .compression_factor(1)
        .open()
        .map_err(|e| {
            warn!(
                "Try to open DB at this location: {:?} and failed: {:?}",
                sled_db_path, e
            );
            std::io::Error::other(e)
        })
}
