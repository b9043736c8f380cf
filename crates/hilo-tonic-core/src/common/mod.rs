//! Shared types and error definitions for the `hilo` gRPC service.
//!
//! ## Submodules
//!
//! - [`error`] - Service error type and its mapping onto [`tonic::Status`].
//! - [`types`] - Store and registry aliases plus protocol limits.
//! - [`proto`] - Generated message types, client and server bindings.

pub mod error;
pub mod types;

pub use error::{Error, Result};

pub mod proto {
    tonic::include_proto!("hilo");
    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("hilo_descriptor");
}
