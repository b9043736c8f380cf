use crate::{record::MarshalError, store::StoreError};

/// A result type defaulting to the crate [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All error variants that `hilo` can emit.
///
/// Only [`Error::Contention`] is the product of a retry loop. Every other
/// variant is surfaced the first time it happens.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Every reservation attempt lost an optimistic-concurrency race.
    ///
    /// The counter record for `key` is being grown by other writers faster
    /// than this process can read and replace it. A larger chunk size lowers
    /// the write rate against the record.
    #[error(
        "could not allocate an id range for key '{key}' with chunk_size={chunk_size} due to \
         high contention ({attempts} attempts); consider increasing the chunk size"
    )]
    Contention {
        key: String,
        chunk_size: u64,
        attempts: u32,
    },

    /// The backing store failed for a reason other than a write conflict.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The counter record exists but could not be decoded.
    #[error("malformed counter record: {0}")]
    Marshal(#[from] MarshalError),

    /// Growing the counter would exceed the id space.
    #[error("id space exhausted for key '{key}'")]
    Overflow { key: String },

    /// The chunk size is zero or larger than the id space (`i64::MAX`).
    #[error("chunk size must be between 1 and {}", i64::MAX)]
    InvalidChunkSize,

    /// Keys name a counter record and must not be empty.
    #[error("key must not be empty")]
    InvalidKey,

    /// The store connection could not be resolved or parsed.
    #[error("misconfigured: {reason}")]
    Misconfigured { reason: String },

    /// The range lock was **poisoned** by a panicking holder.
    ///
    /// When the `parking-lot` feature is enabled, mutexes do not poison, so
    /// this variant is not available.
    #[cfg_attr(docsrs, doc(cfg(not(feature = "parking-lot"))))]
    #[cfg(not(feature = "parking-lot"))]
    #[error("range lock poisoned")]
    LockPoisoned,
}

impl Error {
    /// Returns `true` if the error came from losing every reservation race.
    pub const fn is_contention(&self) -> bool {
        matches!(self, Self::Contention { .. })
    }
}

#[cfg(not(feature = "parking-lot"))]
use crate::allocator::{MutexGuard, PoisonError};
#[cfg(not(feature = "parking-lot"))]
impl<T> From<PoisonError<MutexGuard<'_, T>>> for Error {
    fn from(_: PoisonError<MutexGuard<'_, T>>) -> Self {
        Self::LockPoisoned
    }
}
