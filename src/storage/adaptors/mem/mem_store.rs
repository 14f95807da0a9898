use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use crate::constants::FIRST_ID;
use crate::constants::INITIAL_VERSION;
use crate::Entity;
use crate::EntityId;
use crate::EntityIter;
use crate::EntityStore;
use crate::Predicate;
use crate::StoreError;
use crate::StoreResult;

/// In-process store.
///
/// `put` checks and replaces the version while holding the shard lock of
/// the record, which makes it an exact compare-and-swap.
pub struct MemStore<E: Entity> {
    records: Arc<DashMap<EntityId, E>>,
    next_id: AtomicU64,
    /// Pending scans that will fail with `Unavailable`
    query_faults: AtomicUsize,
}

impl<E: Entity> Default for MemStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> MemStore<E> {
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(FIRST_ID),
            query_faults: AtomicUsize::new(0),
        }
    }

    /// Makes the next `count` scans (and proximity queries) fail with
    /// [`StoreError::Unavailable`].
    pub fn inject_query_faults(
        &self,
        count: usize,
    ) {
        self.query_faults.fetch_add(count, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn take_fault(&self) -> bool {
        self.query_faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl<E: Entity> EntityStore<E> for MemStore<E> {
    fn create(
        &self,
        mut entity: E,
    ) -> StoreResult<E> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        entity.assign_id(id);
        entity.set_version(INITIAL_VERSION);
        self.records.insert(id, entity.clone());
        trace!("created {} {}", E::KIND, id);
        Ok(entity)
    }

    fn get(
        &self,
        id: EntityId,
    ) -> StoreResult<E> {
        self.records
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or(StoreError::NotFound { kind: E::KIND, id })
    }

    fn put(
        &self,
        entity: &E,
        expected_version: u64,
    ) -> StoreResult<u64> {
        let id = entity.id();
        let mut slot = self
            .records
            .get_mut(&id)
            .ok_or(StoreError::NotFound { kind: E::KIND, id })?;

        let actual = slot.version();
        if actual != expected_version {
            return Err(StoreError::Conflict {
                kind: E::KIND,
                id,
                expected: expected_version,
                actual: Some(actual),
            });
        }

        let version = expected_version + 1;
        let mut next = entity.clone();
        next.set_version(version);
        *slot = next;
        Ok(version)
    }

    fn scan_all(
        &self,
        predicate: Predicate<E>,
    ) -> StoreResult<EntityIter<E>> {
        if self.take_fault() {
            return Err(StoreError::Unavailable(format!("injected {} scan fault", E::KIND)));
        }

        let mut ids: Vec<EntityId> = self.records.iter().map(|r| *r.key()).collect();
        ids.sort_unstable();

        let records = self.records.clone();
        Ok(Box::new(
            ids.into_iter()
                .filter_map(move |id| records.get(&id).map(|r| r.value().clone()))
                .filter(move |e| predicate(e))
                .map(Ok),
        ))
    }

    fn clear(&self) -> StoreResult<()> {
        self.records.clear();
        self.next_id.store(FIRST_ID, Ordering::SeqCst);
        Ok(())
    }
}
