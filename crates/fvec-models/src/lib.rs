//! Shared data models for the framevec pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Work items (one video per `{platform, code}` pair)
//! - Extracted frames and their canonical on-disk names
//! - Vector points with deterministic UUIDv5 identifiers
//! - Jobs, job statuses and per-job log entries
//! - Per-item processing outcomes

pub mod frame;
pub mod item;
pub mod job;
pub mod outcome;
pub mod point;

pub use frame::Frame;
pub use item::WorkItem;
pub use job::{Job, JobId, JobStatus, LogEntry, LogLevel};
pub use outcome::{ItemOutcome, ProcessResult};
pub use point::{frame_key, point_id, FramePayload, VectorPoint};
