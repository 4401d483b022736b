//! Pipeline error taxonomy with explicit retry disposition.
//!
//! The batch driver pattern-matches on these kinds rather than on error
//! text: retryable kinds land on the retry queue, `NotFound` short-circuits
//! to a skip, `Config` aborts the process.

use thiserror::Error;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that can occur while processing an item or a batch.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing/invalid configuration; fatal at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network blip or throttling; retryable
    #[error("Transient error: {0}")]
    Transient(String),

    /// Source object missing; item is skipped, not failed
    #[error("Source not found: {0}")]
    NotFound(String),

    /// ffmpeg failed; retryable
    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    /// The vector encoder failed; retryable
    #[error("Encoder failed: {0}")]
    EncoderFailed(String),

    /// Vector-store upsert or count failed; retryable
    #[error("Vector store failed: {0}")]
    VectorStoreFailed(String),

    /// Extraction plus dedup produced zero frames; not retryable
    #[error("No frames extracted for {0}")]
    NoFrames(String),

    /// Count-by-code returned zero right after an acknowledged upsert
    #[error("Consistency check failed: {0}")]
    Consistency(String),
}

impl PipelineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Short kind tag recorded in `extraction_errors` and job logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Config(_) => "config",
            PipelineError::Transient(_) => "transient",
            PipelineError::NotFound(_) => "not_found",
            PipelineError::EncodingFailed(_) => "encode_failed",
            PipelineError::EncoderFailed(_) => "encoder_failed",
            PipelineError::VectorStoreFailed(_) => "vector_store",
            PipelineError::NoFrames(_) => "no_frames",
            PipelineError::Consistency(_) => "consistency",
        }
    }

    /// Whether the driver should re-attempt the item.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::Transient(_)
                | PipelineError::EncodingFailed(_)
                | PipelineError::EncoderFailed(_)
                | PipelineError::VectorStoreFailed(_)
        )
    }
}

impl From<fvec_storage::StorageError> for PipelineError {
    fn from(e: fvec_storage::StorageError) -> Self {
        match e {
            fvec_storage::StorageError::NotFound(key) => PipelineError::NotFound(key),
            fvec_storage::StorageError::ConfigError(msg) => PipelineError::Config(msg),
            other => PipelineError::Transient(other.to_string()),
        }
    }
}

impl From<fvec_media::MediaError> for PipelineError {
    fn from(e: fvec_media::MediaError) -> Self {
        match e {
            fvec_media::MediaError::NoFrames => PipelineError::NoFrames(String::new()),
            other => PipelineError::EncodingFailed(other.to_string()),
        }
    }
}

impl From<fvec_encoder::EncoderError> for PipelineError {
    fn from(e: fvec_encoder::EncoderError) -> Self {
        match e {
            fvec_encoder::EncoderError::ConfigError(msg) => PipelineError::Config(msg),
            other => PipelineError::EncoderFailed(other.to_string()),
        }
    }
}

impl From<fvec_vector::VectorError> for PipelineError {
    fn from(e: fvec_vector::VectorError) -> Self {
        match e {
            fvec_vector::VectorError::ConfigError(msg) => PipelineError::Config(msg),
            other => PipelineError::VectorStoreFailed(other.to_string()),
        }
    }
}

impl From<fvec_db::DbError> for PipelineError {
    fn from(e: fvec_db::DbError) -> Self {
        match e {
            fvec_db::DbError::ConfigError(msg) => PipelineError::Config(msg),
            other => PipelineError::Transient(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_disposition() {
        assert!(PipelineError::transient("x").is_retryable());
        assert!(PipelineError::EncodingFailed("x".into()).is_retryable());
        assert!(PipelineError::EncoderFailed("x".into()).is_retryable());
        assert!(PipelineError::VectorStoreFailed("x".into()).is_retryable());

        assert!(!PipelineError::NotFound("x".into()).is_retryable());
        assert!(!PipelineError::NoFrames("x".into()).is_retryable());
        assert!(!PipelineError::config("x").is_retryable());
        assert!(!PipelineError::Consistency("x".into()).is_retryable());
    }

    #[test]
    fn test_kind_tags() {
        assert_eq!(PipelineError::NoFrames("c".into()).kind(), "no_frames");
        assert_eq!(
            PipelineError::VectorStoreFailed("x".into()).kind(),
            "vector_store"
        );
        assert_eq!(
            PipelineError::EncodingFailed("x".into()).kind(),
            "encode_failed"
        );
    }

    #[test]
    fn test_storage_not_found_maps_to_not_found() {
        let err: PipelineError = fvec_storage::StorageError::not_found("k").into();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[test]
    fn test_media_no_frames_maps() {
        let err: PipelineError = fvec_media::MediaError::NoFrames.into();
        assert_eq!(err.kind(), "no_frames");
    }
}
