#![doc = include_str!("../README.md")]

pub mod common;
pub use common::*;
// Public re-export so downstream crates can access `hilo` via
// `hilo_tonic_core::hilo`
pub use hilo;
