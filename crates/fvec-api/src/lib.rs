//! Axum HTTP control plane.
//!
//! This crate provides:
//! - Batch submission, status polling and log tails over REST
//! - An in-process job registry with a bounded per-job log ring
//! - Shared-secret `X-API-Key` authentication
//! - FIFO job scheduling capped at `PIPELINE_MAX_PARALLEL_JOBS`

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod registry;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use registry::JobRegistry;
pub use routes::create_router;
pub use state::AppState;
