//! Per-video processing pipeline and batch driver.
//!
//! This crate provides:
//! - The ordered per-item transform: download, crop, extract, dedup, embed,
//!   upsert, frame upload
//! - A checkpointed, retrying batch driver with bounded intra-batch
//!   parallelism
//! - Progress events and stdout beacons for supervising processes

pub mod config;
pub mod driver;
pub mod error;
pub mod pipeline;
pub mod progress;

pub use config::PipelineConfig;
pub use driver::{BatchDriver, DriverSummary, FailedItem};
pub use error::{PipelineError, PipelineResult};
pub use pipeline::VideoPipeline;
pub use progress::{beacon, parse_beacon, DriverEvent};
