#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod allocator;
pub mod chunk;
pub mod connection;
pub mod error;
pub mod record;
pub mod registry;
pub mod store;

pub use crate::allocator::*;
pub use crate::chunk::*;
pub use crate::error::*;
pub use crate::record::{CounterRecord, Entity, EntityProperty, MarshalError, TableRecord};
pub use crate::registry::*;
pub use crate::store::{StoreAdapter, StoreError, VersionToken, Versioned, WriteOutcome};
