//! Server-side plumbing for the `hilo` gRPC service.
//!
//! - [`config`] - CLI/env configuration and its validation.
//! - [`service`] - The `IdAllocator` implementation.
//! - [`telemetry`] - Logging, tracing and metrics setup.

pub mod config;
pub mod service;
pub mod telemetry;
