//! Metadata-store error types.

use thiserror::Error;

/// Result type for metadata-store operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur against the metadata store.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database not configured: {0}")]
    ConfigError(String),

    #[error("Query failed: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl DbError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}

/// Postgres foreign-key violation (SQLSTATE 23503).
pub(crate) fn is_fk_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23503"),
        _ => false,
    }
}
