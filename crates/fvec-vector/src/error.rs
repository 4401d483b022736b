//! Vector-store error types.

use thiserror::Error;

/// Result type for vector-store operations.
pub type VectorResult<T> = Result<T, VectorError>;

/// Errors that can occur talking to the vector database.
#[derive(Debug, Error)]
pub enum VectorError {
    #[error("Vector store not configured: {0}")]
    ConfigError(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Vector store returned {status}: {body}")]
    RequestFailed { status: u16, body: String },

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Unexpected response shape: {0}")]
    BadResponse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VectorError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn bad_response(msg: impl Into<String>) -> Self {
        Self::BadResponse(msg.into())
    }

    /// Network blips and server-side errors are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            VectorError::Network(_) => true,
            VectorError::RequestFailed { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
