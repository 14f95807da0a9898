use std::marker::PhantomData;

use tracing::trace;

use crate::constants::FIRST_ID;
use crate::constants::INITIAL_VERSION;
use crate::constants::META_TREE;
use crate::Entity;
use crate::EntityId;
use crate::EntityIter;
use crate::EntityStore;
use crate::Predicate;
use crate::StoreError;
use crate::StoreResult;

/// Store backed by one sled tree per entity type.
///
/// Records are bincode-encoded under their big-endian id, so scans run in
/// id order. The id sequence lives in the shared meta tree. `put` verifies
/// the version of the persisted bytes and then swaps them with sled's
/// `compare_and_swap`, so a concurrent writer between the two steps is
/// reported as a conflict.
pub struct SledStore<E: Entity> {
    tree: ::sled::Tree,
    meta: ::sled::Tree,
    seq_key: String,
    _marker: PhantomData<fn() -> E>,
}

impl<E: Entity> SledStore<E> {
    pub fn open(
        db: &::sled::Db,
        tree_name: &str,
    ) -> StoreResult<Self> {
        Ok(Self {
            tree: db.open_tree(tree_name)?,
            meta: db.open_tree(META_TREE)?,
            seq_key: format!("{tree_name}_next_id"),
            _marker: PhantomData,
        })
    }

    pub fn flush(&self) -> StoreResult<()> {
        self.tree.flush()?;
        self.meta.flush()?;
        Ok(())
    }

    fn next_id(&self) -> StoreResult<EntityId> {
        let next = self.meta.update_and_fetch(self.seq_key.as_bytes(), |old| {
            let last = old.map(decode_u64).unwrap_or(FIRST_ID - 1);
            Some((last + 1).to_be_bytes().to_vec())
        })?;
        next.map(|bytes| decode_u64(&bytes))
            .ok_or_else(|| StoreError::Unavailable(format!("{} id sequence vanished", E::KIND)))
    }
}

impl<E: Entity> EntityStore<E> for SledStore<E> {
    fn create(
        &self,
        mut entity: E,
    ) -> StoreResult<E> {
        let id = self.next_id()?;
        entity.assign_id(id);
        entity.set_version(INITIAL_VERSION);
        self.tree.insert(id.to_be_bytes(), bincode::serialize(&entity)?)?;
        trace!("created {} {}", E::KIND, id);
        Ok(entity)
    }

    fn get(
        &self,
        id: EntityId,
    ) -> StoreResult<E> {
        match self.tree.get(id.to_be_bytes())? {
            Some(bytes) => Ok(bincode::deserialize(&bytes)?),
            None => Err(StoreError::NotFound { kind: E::KIND, id }),
        }
    }

    fn put(
        &self,
        entity: &E,
        expected_version: u64,
    ) -> StoreResult<u64> {
        let id = entity.id();
        let key = id.to_be_bytes();
        let current = self
            .tree
            .get(key)?
            .ok_or(StoreError::NotFound { kind: E::KIND, id })?;

        let persisted: E = bincode::deserialize(&current)?;
        if persisted.version() != expected_version {
            return Err(StoreError::Conflict {
                kind: E::KIND,
                id,
                expected: expected_version,
                actual: Some(persisted.version()),
            });
        }

        let version = expected_version + 1;
        let mut next = entity.clone();
        next.set_version(version);
        let bytes = bincode::serialize(&next)?;

        match self.tree.compare_and_swap(key, Some(current), Some(bytes))? {
            Ok(()) => Ok(version),
            Err(_) => Err(StoreError::Conflict {
                kind: E::KIND,
                id,
                expected: expected_version,
                actual: None,
            }),
        }
    }

    fn scan_all(
        &self,
        predicate: Predicate<E>,
    ) -> StoreResult<EntityIter<E>> {
        let iter = self.tree.iter().filter_map(move |item| {
            let decoded = item
                .map_err(StoreError::from)
                .and_then(|(_, bytes)| bincode::deserialize::<E>(&bytes).map_err(StoreError::from));
            match decoded {
                Ok(entity) if !predicate(&entity) => None,
                other => Some(other),
            }
        });
        Ok(Box::new(iter))
    }

    fn clear(&self) -> StoreResult<()> {
        self.tree.clear()?;
        self.meta.remove(self.seq_key.as_bytes())?;
        Ok(())
    }
}

fn decode_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let len = bytes.len().min(8);
    buf[..len].copy_from_slice(&bytes[..len]);
    u64::from_be_bytes(buf)
}
