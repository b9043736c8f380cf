//! Fake stores for exercising the reservation protocol.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{
    record::Entity,
    store::{MemoryStore, StoreAdapter, StoreError, VersionToken, Versioned, WriteOutcome},
};

/// Never answers.
pub struct StallingStore;

impl StoreAdapter for StallingStore {
    async fn get(&self, _: &str, _: &str) -> Result<Option<Versioned<Entity>>, StoreError> {
        core::future::pending().await
    }

    async fn insert_if_absent(&self, _: Entity) -> Result<WriteOutcome, StoreError> {
        core::future::pending().await
    }

    async fn replace_if_unchanged(
        &self,
        _: Entity,
        _: &VersionToken,
    ) -> Result<WriteOutcome, StoreError> {
        core::future::pending().await
    }
}

/// Counts every call and forwards it to a [`MemoryStore`], yielding before
/// each call so concurrent tasks interleave between read and write.
#[derive(Default)]
pub struct CountingStore {
    pub inner: MemoryStore,
    pub gets: AtomicUsize,
    pub inserts: AtomicUsize,
    pub replaces: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> usize {
        self.inserts.load(Ordering::SeqCst) + self.replaces.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

impl StoreAdapter for CountingStore {
    async fn get(
        &self,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<Versioned<Entity>>, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.inner.get(partition_key, row_key).await
    }

    async fn insert_if_absent(&self, entity: Entity) -> Result<WriteOutcome, StoreError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.inner.insert_if_absent(entity).await
    }

    async fn replace_if_unchanged(
        &self,
        entity: Entity,
        version: &VersionToken,
    ) -> Result<WriteOutcome, StoreError> {
        self.replaces.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.inner.replace_if_unchanged(entity, version).await
    }
}

/// Reads like an empty table and rejects every write as a conflict.
#[derive(Default)]
pub struct ConflictingStore {
    pub writes: AtomicUsize,
}

impl StoreAdapter for ConflictingStore {
    async fn get(&self, _: &str, _: &str) -> Result<Option<Versioned<Entity>>, StoreError> {
        Ok(None)
    }

    async fn insert_if_absent(&self, _: Entity) -> Result<WriteOutcome, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(WriteOutcome::Conflict)
    }

    async fn replace_if_unchanged(
        &self,
        _: Entity,
        _: &VersionToken,
    ) -> Result<WriteOutcome, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(WriteOutcome::Conflict)
    }
}

/// Wraps a [`MemoryStore`] and turns the first `conflicts` writes into
/// conflicts without applying them. Yields before every call so concurrent
/// reservations race between their read and their write.
pub struct FlakyStore {
    pub inner: MemoryStore,
    remaining: AtomicUsize,
    pub writes: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore, conflicts: usize) -> Self {
        Self {
            inner,
            remaining: AtomicUsize::new(conflicts),
            writes: AtomicUsize::new(0),
        }
    }

    fn inject(&self) -> bool {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl StoreAdapter for FlakyStore {
    async fn get(
        &self,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<Versioned<Entity>>, StoreError> {
        tokio::task::yield_now().await;
        self.inner.get(partition_key, row_key).await
    }

    async fn insert_if_absent(&self, entity: Entity) -> Result<WriteOutcome, StoreError> {
        tokio::task::yield_now().await;
        if self.inject() {
            return Ok(WriteOutcome::Conflict);
        }
        self.inner.insert_if_absent(entity).await
    }

    async fn replace_if_unchanged(
        &self,
        entity: Entity,
        version: &VersionToken,
    ) -> Result<WriteOutcome, StoreError> {
        tokio::task::yield_now().await;
        if self.inject() {
            return Ok(WriteOutcome::Conflict);
        }
        self.inner.replace_if_unchanged(entity, version).await
    }
}

/// Fails every read with [`StoreError::Unavailable`].
#[derive(Default)]
pub struct UnavailableStore {
    pub gets: AtomicUsize,
}

impl StoreAdapter for UnavailableStore {
    async fn get(&self, _: &str, _: &str) -> Result<Option<Versioned<Entity>>, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("connection refused".to_owned()))
    }

    async fn insert_if_absent(&self, _: Entity) -> Result<WriteOutcome, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_owned()))
    }

    async fn replace_if_unchanged(
        &self,
        _: Entity,
        _: &VersionToken,
    ) -> Result<WriteOutcome, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_owned()))
    }
}
