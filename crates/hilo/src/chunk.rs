//! Reserving id ranges against the counter record.
//!
//! A reservation reads the key's counter record and tries to advance it by
//! `chunk_size` with a conditional write. Losing the race to another writer is
//! expected under contention and simply restarts the read-modify-write, up to
//! [`MAX_RESERVE_ATTEMPTS`] times. Every other failure is returned at once.

use std::sync::Arc;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    error::{Error, Result},
    record::{COUNTER_ROW_KEY, CounterRecord, TableRecord},
    store::{StoreAdapter, Versioned, WriteOutcome},
};

/// Upper bound on read-modify-write rounds for one reservation.
pub const MAX_RESERVE_ATTEMPTS: u32 = 10;

/// Largest value a counter record can hold; the stored property is an `i64`.
pub const MAX_COUNTER: u64 = i64::MAX as u64;

/// Whether `chunk_size` can ever be reserved: non-zero and no larger than
/// [`MAX_COUNTER`].
pub const fn is_valid_chunk_size(chunk_size: u64) -> bool {
    chunk_size > 0 && chunk_size <= MAX_COUNTER
}

/// A range of ids claimed in the store: `(old_max, new_max]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Reservation {
    pub old_max: u64,
    pub new_max: u64,
}

impl Reservation {
    /// First id of the range.
    pub const fn first(&self) -> u64 {
        self.old_max + 1
    }

    /// Last id of the range, inclusive.
    pub const fn last(&self) -> u64 {
        self.new_max
    }

    pub const fn len(&self) -> u64 {
        self.new_max - self.old_max
    }

    pub const fn is_empty(&self) -> bool {
        self.new_max == self.old_max
    }

    pub const fn contains(&self, id: u64) -> bool {
        id > self.old_max && id <= self.new_max
    }
}

/// Grows counter records by whole chunks using optimistic concurrency.
///
/// The allocator is stateless apart from its store handle. Callers must not
/// run two reservations for the same key concurrently in one process;
/// [`HiLoGenerator`] guarantees this with its single-flight permit. Races with
/// other processes are resolved by the store's conditional writes.
///
/// [`HiLoGenerator`]: crate::HiLoGenerator
pub struct ChunkAllocator<S> {
    store: Arc<S>,
}

impl<S> Clone for ChunkAllocator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: StoreAdapter> ChunkAllocator<S> {
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Claims the next `chunk_size` ids for `key`.
    ///
    /// A missing counter record is created holding `chunk_size`, claiming
    /// `1..=chunk_size`. An existing record holding `m` is replaced with
    /// `m + chunk_size`, claiming `m + 1..=m + chunk_size`.
    ///
    /// # Errors
    ///
    /// - [`Error::Contention`] after [`MAX_RESERVE_ATTEMPTS`] lost races.
    /// - [`Error::Store`] on the first non-conflict store failure.
    /// - [`Error::Marshal`] if the stored record cannot be decoded.
    /// - [`Error::Overflow`] if the counter would leave the `i64` range.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub async fn reserve(&self, key: &str, chunk_size: u64) -> Result<Reservation> {
        for _attempt in 1..=MAX_RESERVE_ATTEMPTS {
            let (reservation, outcome) = match self.store.get(key, COUNTER_ROW_KEY).await? {
                None => {
                    if chunk_size > MAX_COUNTER {
                        return Err(Error::Overflow {
                            key: key.to_owned(),
                        });
                    }
                    let reservation = Reservation {
                        old_max: 0,
                        new_max: chunk_size,
                    };
                    let record = CounterRecord::new(key, reservation.new_max);
                    let outcome = self.store.insert_if_absent(record.write_entity()?).await?;
                    (reservation, outcome)
                }
                Some(Versioned { value, version }) => {
                    let current = CounterRecord::read_entity(&value)?;
                    let new_max = current
                        .current_max
                        .checked_add(chunk_size)
                        .filter(|max| *max <= MAX_COUNTER)
                        .ok_or_else(|| Error::Overflow {
                            key: key.to_owned(),
                        })?;
                    let reservation = Reservation {
                        old_max: current.current_max,
                        new_max,
                    };
                    let record = CounterRecord::new(key, new_max);
                    let outcome = self
                        .store
                        .replace_if_unchanged(record.write_entity()?, &version)
                        .await?;
                    (reservation, outcome)
                }
            };

            match outcome {
                WriteOutcome::Success => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        "Reserved ids {}..={} for '{key}' on attempt {_attempt}",
                        reservation.first(),
                        reservation.last()
                    );
                    return Ok(reservation);
                }
                WriteOutcome::Conflict => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Counter for '{key}' changed concurrently (attempt {_attempt})");
                }
            }
        }

        #[cfg(feature = "tracing")]
        tracing::warn!(
            "Giving up on '{key}' after {MAX_RESERVE_ATTEMPTS} conflicting writes (chunk_size={chunk_size})"
        );

        Err(Error::Contention {
            key: key.to_owned(),
            chunk_size,
            attempts: MAX_RESERVE_ATTEMPTS,
        })
    }
}
