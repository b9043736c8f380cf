use std::sync::Arc;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    allocator::{Mutex, MutexGuard},
    chunk::{ChunkAllocator, Reservation, is_valid_chunk_size},
    error::{Error, Result},
    store::{StoreAdapter, StoreError},
};

/// The held id range. Ids start at 1, so `(0, 0)` means no range is held.
#[derive(Clone, Copy, Debug, Default)]
struct Range {
    /// Most recently issued id.
    last: u64,
    /// Inclusive upper bound of the held range.
    max: u64,
}

/// A Hi-Lo id generator for one key.
///
/// Ids are handed out from a block reserved in the backing store. While the
/// block lasts, [`Self::next_id`] is a compare and increment under a short-held
/// mutex. When it runs out, exactly one caller reserves the next block while
/// the others wait on a single-flight permit and then continue from the new
/// block.
///
/// ## Guarantees
///
/// - Ids returned by one generator are unique and strictly increasing, across
///   all tasks and threads sharing it.
/// - Generators in different processes (or several generators over the same
///   store) never return the same id for a key, but their ids interleave in no
///   particular order.
/// - A failed reservation leaves the held range untouched.
///
/// ## Example
///
/// ```
/// use std::sync::Arc;
/// use hilo::{HiLoGenerator, store::MemoryStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> hilo::Result<()> {
/// let generator = HiLoGenerator::new("invoices", 100, Arc::new(MemoryStore::new()))?;
///
/// let first = generator.next_id().await?;
/// let second = generator.next_id().await?;
/// assert_eq!((first, second), (1, 2));
/// assert_eq!(generator.remaining()?, 98);
/// # Ok(())
/// # }
/// ```
pub struct HiLoGenerator<S> {
    key: String,
    chunk_size: u64,
    range: Mutex<Range>,
    permit: tokio::sync::Mutex<()>,
    chunks: ChunkAllocator<S>,
}

impl<S: StoreAdapter> HiLoGenerator<S> {
    /// Creates a generator for `key` holding no range.
    ///
    /// Nothing is read from the store until the first call to
    /// [`Self::next_id`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] for an empty key and
    /// [`Error::InvalidChunkSize`] for a chunk size of zero or one larger than
    /// `i64::MAX`.
    pub fn new(key: impl Into<String>, chunk_size: u64, store: Arc<S>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(Error::InvalidKey);
        }
        if !is_valid_chunk_size(chunk_size) {
            return Err(Error::InvalidChunkSize);
        }
        Ok(Self {
            key,
            chunk_size,
            range: Mutex::new(Range::default()),
            permit: tokio::sync::Mutex::new(()),
            chunks: ChunkAllocator::new(store),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub const fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub const fn store(&self) -> &Arc<S> {
        self.chunks.store()
    }

    fn range(&self) -> Result<MutexGuard<'_, Range>> {
        #[cfg(feature = "parking-lot")]
        {
            Ok(self.range.lock())
        }
        #[cfg(not(feature = "parking-lot"))]
        {
            Ok(self.range.lock()?)
        }
    }

    /// Number of ids left in the held range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockPoisoned`] if the range lock is poisoned.
    pub fn remaining(&self) -> Result<u64> {
        let range = self.range()?;
        Ok(range.max - range.last)
    }

    /// Issues an id from the held range without touching the store.
    ///
    /// Returns `Ok(None)` when the range is exhausted (or none was ever
    /// reserved).
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockPoisoned`] if the range lock is poisoned.
    pub fn try_next_id_local(&self) -> Result<Option<u64>> {
        let mut range = self.range()?;
        if range.last < range.max {
            range.last += 1;
            Ok(Some(range.last))
        } else {
            Ok(None)
        }
    }

    /// Returns the next id for this key.
    ///
    /// Completes without suspending while the held range lasts. Otherwise
    /// waits for the key's reservation permit, re-checks the range (another
    /// caller may have refilled it meanwhile) and, if still exhausted,
    /// reserves the next chunk from the store.
    ///
    /// Dropping the returned future releases the permit. A reservation that
    /// completed in the store but was not installed only leaves a gap.
    ///
    /// # Errors
    ///
    /// - [`Error::Contention`] if every reservation attempt lost a race.
    /// - [`Error::Store`] if the store failed, including timeouts.
    /// - [`Error::Marshal`] or [`Error::Overflow`] if the counter record is
    ///   unusable.
    /// - [`Error::Store`] with [`StoreError::Malformed`] if the counter record
    ///   now holds less than this generator already reserved, which happens
    ///   when the record was deleted. The held range is kept.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self), fields(key = %self.key)))]
    pub async fn next_id(&self) -> Result<u64> {
        if let Some(id) = self.try_next_id_local()? {
            return Ok(id);
        }
        self.refill_and_next().await
    }

    /// Returns `count` ids, each obtained as by [`Self::next_id`].
    ///
    /// The ids are strictly increasing but only contiguous if no other caller
    /// shares the generator and no chunk boundary is crossed.
    ///
    /// # Errors
    ///
    /// Fails with the first error [`Self::next_id`] reports. Ids issued before
    /// the failure are not returned and will not be issued again.
    pub async fn next_ids(&self, count: usize) -> Result<Vec<u64>> {
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            ids.push(self.next_id().await?);
        }
        Ok(ids)
    }

    async fn refill_and_next(&self) -> Result<u64> {
        let _permit = self.permit.lock().await;

        if let Some(id) = self.try_next_id_local()? {
            return Ok(id);
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Range for '{}' exhausted, reserving {}", self.key, self.chunk_size);

        let Reservation { old_max, new_max } =
            self.chunks.reserve(&self.key, self.chunk_size).await?;

        let mut range = self.range()?;
        // A counter below the held range was deleted or rewritten behind our
        // back; installing it would reissue ids.
        if old_max < range.max {
            return Err(Error::Store(StoreError::Malformed(format!(
                "counter for '{}' moved backwards from {} to {old_max}",
                self.key, range.max
            ))));
        }
        range.last = old_max + 1;
        range.max = new_max;
        Ok(range.last)
    }
}
