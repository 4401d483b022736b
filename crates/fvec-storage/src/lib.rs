//! S3 object-store adapter.
//!
//! This crate provides:
//! - Raw video download by `{platform}/{code}` with a local short-circuit
//! - Fire-and-forget upload of frame PNGs under a per-video prefix
//! - Signed or unsigned (public) access, selected from the configuration

pub mod client;
pub mod error;

pub use client::{ObjectStore, ObjectStoreConfig};
pub use error::{StorageError, StorageResult};
