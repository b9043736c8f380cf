use std::collections::HashMap;

use crate::{
    allocator::{Mutex, MutexGuard},
    record::Entity,
    store::{StoreAdapter, StoreError, VersionToken, Versioned, WriteOutcome},
};

#[derive(Default)]
struct Rows {
    rows: HashMap<(String, String), (Entity, u64)>,
    next_etag: u64,
}

impl Rows {
    fn bump(&mut self) -> u64 {
        self.next_etag += 1;
        self.next_etag
    }
}

fn etag(version: u64) -> VersionToken {
    VersionToken::new(format!("W/\"{version}\""))
}

/// An in-process table with ETag-based optimistic concurrency.
///
/// Every successful write assigns the row a fresh, store-wide unique ETag, so
/// a token read before any later write to the same row never matches again.
///
/// Useful for tests and for deployments where every allocator lives in one
/// process. Several [`HiLoGenerator`]s sharing a `MemoryStore` behave like
/// separate processes sharing a remote table.
///
/// [`HiLoGenerator`]: crate::HiLoGenerator
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Rows>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(&self) -> Result<MutexGuard<'_, Rows>, StoreError> {
        #[cfg(feature = "parking-lot")]
        {
            Ok(self.inner.lock())
        }
        #[cfg(not(feature = "parking-lot"))]
        {
            self.inner
                .lock()
                .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_owned()))
        }
    }

    /// Deletes a row, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Fails only if the internal lock is poisoned.
    pub fn remove(&self, partition_key: &str, row_key: &str) -> Result<bool, StoreError> {
        let mut rows = self.rows()?;
        Ok(rows
            .rows
            .remove(&(partition_key.to_owned(), row_key.to_owned()))
            .is_some())
    }

    /// Number of stored rows.
    ///
    /// # Errors
    ///
    /// Fails only if the internal lock is poisoned.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.rows()?.rows.len())
    }

    /// # Errors
    ///
    /// Fails only if the internal lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.rows()?.rows.is_empty())
    }
}

impl StoreAdapter for MemoryStore {
    async fn get(
        &self,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<Versioned<Entity>>, StoreError> {
        let rows = self.rows()?;
        Ok(rows
            .rows
            .get(&(partition_key.to_owned(), row_key.to_owned()))
            .map(|(entity, version)| Versioned {
                value: entity.clone(),
                version: etag(*version),
            }))
    }

    async fn insert_if_absent(&self, entity: Entity) -> Result<WriteOutcome, StoreError> {
        let mut rows = self.rows()?;
        let key = (entity.partition_key.clone(), entity.row_key.clone());
        if rows.rows.contains_key(&key) {
            return Ok(WriteOutcome::Conflict);
        }
        let version = rows.bump();
        rows.rows.insert(key, (entity, version));
        Ok(WriteOutcome::Success)
    }

    async fn replace_if_unchanged(
        &self,
        entity: Entity,
        version: &VersionToken,
    ) -> Result<WriteOutcome, StoreError> {
        let mut rows = self.rows()?;
        let key = (entity.partition_key.clone(), entity.row_key.clone());
        match rows.rows.get(&key) {
            Some((_, current)) if etag(*current) == *version => {}
            _ => return Ok(WriteOutcome::Conflict),
        }
        let next = rows.bump();
        rows.rows.insert(key, (entity, next));
        Ok(WriteOutcome::Success)
    }
}
