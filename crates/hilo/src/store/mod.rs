//! Backing-store adapters.
//!
//! A [`StoreAdapter`] exposes exactly the three primitives the reservation
//! protocol needs: point lookup, insert-if-absent and
//! replace-if-unchanged. Write results are classified into
//! [`WriteOutcome::Success`] and [`WriteOutcome::Conflict`]; anything else is a
//! [`StoreError`] and is never retried by the reservation loop.
//!
//! ## Adapters
//!
//! - [`MemoryStore`] - in-process rows with ETag versioning.
//! - [`FileStore`] - rows persisted to a JSON file (feature `file-store`).
//! - [`TimeoutStore`] - bounds every call of an inner adapter.
//! - [`ConfiguredStore`] - picks one of the above from a connection
//!   descriptor at runtime.

mod configured;
#[cfg(feature = "file-store")]
mod file;
mod memory;
mod timeout;

pub use configured::*;
#[cfg_attr(docsrs, doc(cfg(feature = "file-store")))]
#[cfg(feature = "file-store")]
pub use file::*;
pub use memory::*;
pub use timeout::*;

#[cfg(test)]
pub(crate) mod testing;

use core::{fmt, future::Future};

use crate::record::Entity;

/// Opaque row version handed out on read and required unchanged on replace.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VersionToken(String);

impl VersionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A value read from the store together with its version.
#[derive(Clone, Debug, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: VersionToken,
}

/// Result of a conditional write that reached the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WriteOutcome {
    /// The row was created or replaced.
    Success,
    /// Another writer got there first: the row already existed on insert, or
    /// its version changed (or it was deleted) before replace.
    Conflict,
}

impl WriteOutcome {
    /// Classifies an HTTP-style status code returned by a table service.
    ///
    /// `201 Created` and `204 No Content` are successes, `409 Conflict` and
    /// `412 Precondition Failed` are conflicts.
    ///
    /// # Errors
    ///
    /// Any other code is returned as [`StoreError::Status`].
    pub fn from_status(code: u16) -> Result<Self, StoreError> {
        match code {
            200 | 201 | 204 => Ok(Self::Success),
            409 | 412 => Ok(Self::Conflict),
            401 | 403 => Err(StoreError::Unauthorized(format!("status {code}"))),
            408 => Err(StoreError::Timeout),
            503 => Err(StoreError::Unavailable(format!("status {code}"))),
            code => Err(StoreError::Status {
                code,
                message: format!("unexpected status {code}"),
            }),
        }
    }
}

/// Any store failure other than a write conflict.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("store call timed out")]
    Timeout,

    #[error("malformed store data: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store returned status {code}: {message}")]
    Status { code: u16, message: String },
}

/// The storage primitives the reservation protocol relies on.
///
/// Implementations must be safe to share across tasks; every method returns a
/// `Send` future so callers can run on a multi-threaded executor.
pub trait StoreAdapter: Send + Sync {
    /// Looks up a row. A missing row is `Ok(None)`.
    fn get(
        &self,
        partition_key: &str,
        row_key: &str,
    ) -> impl Future<Output = Result<Option<Versioned<Entity>>, StoreError>> + Send;

    /// Creates `entity` unless a row with the same keys already exists, in
    /// which case the outcome is [`WriteOutcome::Conflict`].
    fn insert_if_absent(
        &self,
        entity: Entity,
    ) -> impl Future<Output = Result<WriteOutcome, StoreError>> + Send;

    /// Replaces the row addressed by `entity` only if its current version is
    /// still `version`. A changed or deleted row is [`WriteOutcome::Conflict`].
    fn replace_if_unchanged(
        &self,
        entity: Entity,
        version: &VersionToken,
    ) -> impl Future<Output = Result<WriteOutcome, StoreError>> + Send;
}
