//! Error types for the id allocation service.
//!
//! This module defines the central `Error` enum for request handling and
//! implements `From<Error>` for `tonic::Status`, so handlers can return it with
//! `?` and clients receive a status code they can act on.
//!
//! ## Error Cases
//! - `Allocation`: The `hilo` allocator failed (contention, store failure,
//!   malformed counter record, ...).
//! - `InvalidRequest`: The client request was malformed or exceeded bounds.
//! - `ServiceShutdown`: A request arrived while the service was shutting down.

use hilo::StoreError;
use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the id allocation service.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Issuing an id failed inside the allocator.
    #[error("ID error: {0}")]
    Allocation(#[from] hilo::Error),

    /// The client request was invalid or exceeded constraints.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl Error {
    /// Whether the client may retry the same request later.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ServiceShutdown
                | Self::Allocation(hilo::Error::Contention { .. })
                | Self::Allocation(hilo::Error::Store(
                    StoreError::Timeout | StoreError::Unavailable(_)
                ))
        )
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidRequest { reason } => Status::invalid_argument(reason),
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
            Error::Allocation(e) => match e {
                hilo::Error::InvalidKey | hilo::Error::InvalidChunkSize => {
                    Status::invalid_argument(e.to_string())
                }
                hilo::Error::Contention { .. } => Status::resource_exhausted(e.to_string()),
                hilo::Error::Store(StoreError::Timeout | StoreError::Unavailable(_)) => {
                    Status::unavailable(e.to_string())
                }
                hilo::Error::Store(StoreError::Unauthorized(_)) => {
                    Status::permission_denied(e.to_string())
                }
                e => Status::internal(format!("ID allocation error: {e}")),
            },
        }
    }
}
