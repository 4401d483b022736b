//! Vector-database REST adapter.
//!
//! This crate provides:
//! - Idempotent collection creation with payload indexes
//! - Batched, acknowledged point upserts
//! - Filtered point counts by `video_code`
//! - Scroll-based reads for the legacy-payload migration shim

pub mod client;
pub mod error;
pub mod migrate;
pub mod types;

pub use client::{VectorStore, VectorStoreConfig};
pub use error::{VectorError, VectorResult};
pub use migrate::{migrate_legacy_points, MigrationReport};
pub use types::{Filter, ScrolledPoint};
