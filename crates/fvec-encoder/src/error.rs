//! Encoder client error types.

use thiserror::Error;

/// Result type for encoder operations.
pub type EncoderResult<T> = Result<T, EncoderError>;

/// Errors that can occur calling the encoder service.
#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("Encoder not configured: {0}")]
    ConfigError(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Encoder returned {status}: {body}")]
    RequestFailed { status: u16, body: String },

    #[error("Encoder returned {got} vectors for {expected} images")]
    CountMismatch { expected: usize, got: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EncoderError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Network blips and server-side errors are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            EncoderError::Network(_) => true,
            EncoderError::RequestFailed { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
