//! One [`HiLoGenerator`] per key, created on first use.

use std::{collections::HashMap, sync::Arc};

use crate::{
    allocator::{HiLoGenerator, Mutex, MutexGuard},
    chunk::is_valid_chunk_size,
    error::{Error, Result},
    store::StoreAdapter,
};

type Generators<S> = HashMap<String, Arc<HiLoGenerator<S>>>;

/// Hands out a shared generator per key over one store.
///
/// Every key gets exactly one generator for the lifetime of the registry, so
/// the single-flight guarantee of [`HiLoGenerator`] holds for all callers that
/// go through the same registry. Keys use the registry's default chunk size
/// unless one was set with [`Self::with_chunk_size`].
pub struct AllocatorRegistry<S> {
    store: Arc<S>,
    chunk_size: u64,
    overrides: HashMap<String, u64>,
    generators: Mutex<Generators<S>>,
}

impl<S: StoreAdapter> AllocatorRegistry<S> {
    /// # Errors
    ///
    /// Returns [`Error::InvalidChunkSize`] if `chunk_size` is zero or larger
    /// than `i64::MAX`.
    pub fn new(store: Arc<S>, chunk_size: u64) -> Result<Self> {
        if !is_valid_chunk_size(chunk_size) {
            return Err(Error::InvalidChunkSize);
        }
        Ok(Self {
            store,
            chunk_size,
            overrides: HashMap::new(),
            generators: Mutex::new(HashMap::new()),
        })
    }

    /// Uses `chunk_size` for `key` instead of the default.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] for an empty key and
    /// [`Error::InvalidChunkSize`] for a chunk size [`Self::new`] would reject.
    pub fn with_chunk_size(mut self, key: impl Into<String>, chunk_size: u64) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(Error::InvalidKey);
        }
        if !is_valid_chunk_size(chunk_size) {
            return Err(Error::InvalidChunkSize);
        }
        self.overrides.insert(key, chunk_size);
        Ok(self)
    }

    pub const fn default_chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Chunk size generators for `key` are created with.
    pub fn chunk_size_for(&self, key: &str) -> u64 {
        self.overrides.get(key).copied().unwrap_or(self.chunk_size)
    }

    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn generators(&self) -> Result<MutexGuard<'_, Generators<S>>> {
        #[cfg(feature = "parking-lot")]
        {
            Ok(self.generators.lock())
        }
        #[cfg(not(feature = "parking-lot"))]
        {
            Ok(self.generators.lock()?)
        }
    }

    /// Returns the generator for `key`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] for an empty key.
    pub fn get(&self, key: &str) -> Result<Arc<HiLoGenerator<S>>> {
        let mut generators = self.generators()?;
        if let Some(generator) = generators.get(key) {
            return Ok(Arc::clone(generator));
        }

        let generator = Arc::new(HiLoGenerator::new(
            key,
            self.chunk_size_for(key),
            Arc::clone(&self.store),
        )?);
        generators.insert(key.to_owned(), Arc::clone(&generator));

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Created generator for '{key}' (chunk_size={})",
            generator.chunk_size()
        );

        Ok(generator)
    }

    /// Returns the next id for `key`.
    ///
    /// # Errors
    ///
    /// See [`HiLoGenerator::next_id`]; additionally [`Error::InvalidKey`] for
    /// an empty key.
    pub async fn next_id(&self, key: &str) -> Result<u64> {
        self.get(key)?.next_id().await
    }

    /// Returns `count` ids for `key`.
    ///
    /// # Errors
    ///
    /// See [`HiLoGenerator::next_ids`].
    pub async fn next_ids(&self, key: &str, count: usize) -> Result<Vec<u64>> {
        self.get(key)?.next_ids(count).await
    }

    /// Keys that have a generator, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockPoisoned`] if the registry lock is poisoned.
    pub fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<_> = self.generators()?.keys().cloned().collect();
        keys.sort_unstable();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use futures::future::try_join_all;

    use super::*;
    use crate::store::{MemoryStore, testing::CountingStore};

    #[test]
    fn zero_default_chunk_size_is_rejected() {
        assert!(matches!(
            AllocatorRegistry::new(Arc::new(MemoryStore::new()), 0),
            Err(Error::InvalidChunkSize)
        ));
    }

    #[test]
    fn invalid_overrides_are_rejected() {
        let registry = AllocatorRegistry::new(Arc::new(MemoryStore::new()), 10).unwrap();
        assert!(matches!(
            registry.with_chunk_size("", 5),
            Err(Error::InvalidKey)
        ));

        let registry = AllocatorRegistry::new(Arc::new(MemoryStore::new()), 10).unwrap();
        assert!(matches!(
            registry.with_chunk_size("orders", 0),
            Err(Error::InvalidChunkSize)
        ));

        let registry = AllocatorRegistry::new(Arc::new(MemoryStore::new()), 10).unwrap();
        assert!(matches!(
            registry.with_chunk_size("orders", u64::MAX),
            Err(Error::InvalidChunkSize)
        ));
    }

    #[test]
    fn default_chunk_size_beyond_id_space_is_rejected() {
        assert!(matches!(
            AllocatorRegistry::new(Arc::new(MemoryStore::new()), i64::MAX as u64 + 1),
            Err(Error::InvalidChunkSize)
        ));
        assert!(AllocatorRegistry::new(Arc::new(MemoryStore::new()), i64::MAX as u64).is_ok());
    }

    #[test]
    fn empty_key_is_rejected() {
        let registry = AllocatorRegistry::new(Arc::new(MemoryStore::new()), 10).unwrap();
        assert!(matches!(registry.get(""), Err(Error::InvalidKey)));
        assert!(registry.keys().unwrap().is_empty());
    }

    #[test]
    fn same_key_same_generator() {
        let registry = AllocatorRegistry::new(Arc::new(MemoryStore::new()), 10)
            .unwrap()
            .with_chunk_size("orders", 500)
            .unwrap();

        let a = registry.get("orders").unwrap();
        let b = registry.get("orders").unwrap();
        let users = registry.get("users").unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.chunk_size(), 500);
        assert_eq!(users.chunk_size(), 10);
        assert_eq!(registry.keys().unwrap(), vec!["orders", "users"]);
    }

    #[tokio::test]
    async fn keys_allocate_independently() {
        let registry = AllocatorRegistry::new(Arc::new(MemoryStore::new()), 10).unwrap();

        assert_eq!(registry.next_ids("orders", 3).await.unwrap(), vec![1, 2, 3]);
        assert_eq!(registry.next_id("users").await.unwrap(), 1);
        assert_eq!(registry.next_id("orders").await.unwrap(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_lookups_share_one_generator() {
        let store = Arc::new(CountingStore::new());
        let registry = Arc::new(AllocatorRegistry::new(Arc::clone(&store), 100).unwrap());

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.next_id("orders").await })
            })
            .collect();

        let ids: HashSet<u64> = try_join_all(tasks)
            .await
            .unwrap()
            .into_iter()
            .map(|id| id.unwrap())
            .collect();

        assert_eq!(ids, (1..=32).collect::<HashSet<_>>());
        assert_eq!(store.writes(), 1);
        assert_eq!(registry.keys().unwrap(), vec!["orders"]);
    }
}
