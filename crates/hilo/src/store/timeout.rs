use core::time::Duration;

use crate::{
    record::Entity,
    store::{StoreAdapter, StoreError, VersionToken, Versioned, WriteOutcome},
};

/// Bounds every call of an inner [`StoreAdapter`] by a deadline.
///
/// An elapsed deadline is reported as [`StoreError::Timeout`], which the
/// reservation loop propagates instead of retrying. A write that timed out may
/// still have been applied by the store; the next reservation re-reads the
/// record, so the worst case is a skipped range, never a reused one.
pub struct TimeoutStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S> TimeoutStore<S> {
    pub const fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    pub const fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: StoreAdapter> StoreAdapter for TimeoutStore<S> {
    async fn get(
        &self,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<Versioned<Entity>>, StoreError> {
        tokio::time::timeout(self.timeout, self.inner.get(partition_key, row_key))
            .await
            .map_err(|_| StoreError::Timeout)?
    }

    async fn insert_if_absent(&self, entity: Entity) -> Result<WriteOutcome, StoreError> {
        tokio::time::timeout(self.timeout, self.inner.insert_if_absent(entity))
            .await
            .map_err(|_| StoreError::Timeout)?
    }

    async fn replace_if_unchanged(
        &self,
        entity: Entity,
        version: &VersionToken,
    ) -> Result<WriteOutcome, StoreError> {
        tokio::time::timeout(self.timeout, self.inner.replace_if_unchanged(entity, version))
            .await
            .map_err(|_| StoreError::Timeout)?
    }
}
