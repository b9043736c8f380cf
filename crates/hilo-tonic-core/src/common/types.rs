//! Concrete store and registry types served over gRPC.
//!
//! The server opens one [`Store`] from a connection descriptor and shares a
//! single [`Registry`] across all requests, so every key has exactly one
//! generator per process.

use core::time::Duration;
use hilo::{
    AllocatorRegistry,
    connection::StoreDescriptor,
    store::{ConfiguredStore, TimeoutStore},
};
use std::sync::Arc;

/// The backing store: chosen at runtime and bounded by a per-call deadline.
pub type Store = TimeoutStore<ConfiguredStore>;

/// Per-key generators over the shared [`Store`].
pub type Registry = AllocatorRegistry<Store>;

/// Largest `count` a `NextIds` request may ask for by default.
pub const DEFAULT_MAX_BATCH: u32 = 10_000;

/// Ids reserved per store round-trip by default.
pub const DEFAULT_CHUNK_SIZE: u64 = 1_000;

/// Opens the store `descriptor` names and builds a registry over it.
///
/// # Errors
///
/// Returns [`hilo::Error::Misconfigured`] if the descriptor names a backend
/// that is unavailable, [`hilo::Error::Store`] if it fails to open and
/// [`hilo::Error::InvalidChunkSize`] for a zero chunk size.
pub async fn open_registry(
    descriptor: &StoreDescriptor,
    store_timeout: Duration,
    chunk_size: u64,
) -> hilo::Result<Registry> {
    let store = ConfiguredStore::open(descriptor).await?;
    AllocatorRegistry::new(Arc::new(TimeoutStore::new(store, store_timeout)), chunk_size)
}
