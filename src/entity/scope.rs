use std::ops::Deref;

use parking_lot::RwLock;
use parking_lot::RwLockWriteGuard;

use super::Entity;
use super::EntityId;
use crate::EntityStore;
use crate::StoreResult;

/// Local copy of a persisted record, guarded by a read/write lock.
pub struct Tracked<E: Entity> {
    inner: RwLock<E>,
}

impl<E: Entity> Tracked<E> {
    pub fn new(entity: E) -> Self {
        Self {
            inner: RwLock::new(entity),
        }
    }

    pub fn id(&self) -> EntityId {
        self.inner.read().id()
    }

    /// Provides shared access to the record
    pub fn blocking_read<R>(
        &self,
        f: impl FnOnce(&E) -> R,
    ) -> R {
        let guard = self.inner.read();
        f(&guard)
    }

    pub fn snapshot(&self) -> E {
        self.inner.read().clone()
    }

    /// Opens the exclusive scope every mutation and persistence call goes
    /// through.
    pub fn write(&self) -> WriteScope<'_, E> {
        WriteScope {
            guard: self.inner.write(),
        }
    }
}

/// Exclusive access to a [`Tracked`] record.
///
/// Entity-specific mutators are implemented on `WriteScope<'_, Job>` and
/// `WriteScope<'_, Drone>`; they all funnel into [`WriteScope::modify_and_put`].
pub struct WriteScope<'a, E: Entity> {
    guard: RwLockWriteGuard<'a, E>,
}

impl<E: Entity> Deref for WriteScope<'_, E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.guard
    }
}

impl<E: Entity> WriteScope<'_, E> {
    /// Applies `mutate` to the local copy and persists it with the local
    /// version as the expected one.
    ///
    /// On failure the local copy is restored, so a rejected write leaves no
    /// trace on either side.
    pub fn modify_and_put(
        &mut self,
        store: &dyn EntityStore<E>,
        mutate: impl FnOnce(&mut E),
    ) -> StoreResult<()> {
        let before = self.guard.clone();
        mutate(&mut self.guard);
        match store.put(&self.guard, before.version()) {
            Ok(version) => {
                self.guard.set_version(version);
                Ok(())
            }
            Err(e) => {
                *self.guard = before;
                Err(e)
            }
        }
    }

    /// Stages a change on the local copy without persisting it. Only used by
    /// owners that persist through a later call in the same scope.
    pub(crate) fn record_mut(&mut self) -> &mut E {
        &mut self.guard
    }

    /// Persists the local copy unchanged.
    pub fn put(
        &mut self,
        store: &dyn EntityStore<E>,
    ) -> StoreResult<()> {
        self.modify_and_put(store, |_| {})
    }

    /// Replaces the local copy with the persisted record.
    pub fn refresh(
        &mut self,
        store: &dyn EntityStore<E>,
    ) -> StoreResult<()> {
        *self.guard = store.get(self.guard.id())?;
        Ok(())
    }

    /// Adopts the persisted version while keeping local field values, for
    /// records only their owner writes to.
    pub(crate) fn adopt_version(
        &mut self,
        store: &dyn EntityStore<E>,
    ) -> StoreResult<()> {
        let persisted = store.get(self.guard.id())?;
        self.guard.set_version(persisted.version());
        Ok(())
    }
}
