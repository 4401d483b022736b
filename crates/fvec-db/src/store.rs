//! Metadata store operations.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{is_fk_violation, DbError, DbResult};

/// One pending `content` row awaiting extraction.
#[derive(Debug, Clone)]
pub struct PendingRow {
    pub id: Uuid,
    pub code: String,
    pub created_at: DateTime<Utc>,
}

/// Composite pagination cursor over `(created_at, id)`.
///
/// Ordering by this pair is stable under concurrent insertions, so a resumed
/// run never re-reads or skips rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl PendingRow {
    pub fn cursor(&self) -> Cursor {
        Cursor {
            created_at: self.created_at,
            id: self.id,
        }
    }
}

/// Postgres-backed metadata store.
#[derive(Clone)]
pub struct MetadataStore {
    pool: PgPool,
}

impl MetadataStore {
    /// Connect with a small dedicated pool.
    pub async fn connect(database_url: &str) -> DbResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Connect using `DATABASE_URL`.
    pub async fn from_env() -> DbResult<Self> {
        let url = std::env::var("DATABASE_URL")
            .map_err(|_| DbError::config_error("DATABASE_URL not set"))?;
        Self::connect(&url).await
    }

    /// Wrap an existing pool (tests, shared pools).
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch the next batch of rows with `is_extracted = false`, strictly
    /// after `cursor` in `(created_at, id)` order.
    pub async fn next_pending_batch(
        &self,
        limit: i64,
        cursor: Option<Cursor>,
    ) -> DbResult<Vec<PendingRow>> {
        let rows = match cursor {
            Some(c) => {
                sqlx::query(
                    "SELECT id, code, created_at FROM content \
                     WHERE is_extracted = FALSE AND (created_at, id) > ($1, $2) \
                     ORDER BY created_at ASC, id ASC LIMIT $3",
                )
                .bind(c.created_at)
                .bind(c.id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, code, created_at FROM content \
                     WHERE is_extracted = FALSE \
                     ORDER BY created_at ASC, id ASC LIMIT $1",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows
            .into_iter()
            .map(|row| PendingRow {
                id: row.get("id"),
                code: row.get("code"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    /// Resolve a checkpointed row id back into a pagination cursor.
    ///
    /// Returns `None` when the row has disappeared; the caller then starts
    /// from the beginning of the sort order.
    pub async fn cursor_for(&self, id: Uuid) -> DbResult<Option<Cursor>> {
        let row = sqlx::query("SELECT created_at FROM content WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| Cursor {
            created_at: r.get("created_at"),
            id,
        }))
    }

    /// Flip `is_extracted` and `is_embedded` for one verified code and
    /// record the surviving frame count.
    pub async fn mark_done(&self, code: &str, cropped: bool, frames: i32) -> DbResult<()> {
        sqlx::query(
            "UPDATE content \
             SET is_extracted = TRUE, is_embedded = TRUE, is_cropped = $2, frames = $3 \
             WHERE code = $1",
        )
        .bind(code)
        .bind(cropped)
        .bind(frames)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a final extraction failure.
    ///
    /// Skipped silently when the parent `content` row does not exist yet
    /// (foreign-key violation).
    pub async fn record_error(&self, code: &str, error: &str) -> DbResult<()> {
        let result = sqlx::query("INSERT INTO extraction_errors (code, error) VALUES ($1, $2)")
            .bind(code)
            .bind(error)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_fk_violation(&e) => {
                warn!("could not record error for {}: foreign key violation", code);
                Ok(())
            }
            Err(e) => Err(DbError::Sqlx(e)),
        }
    }

    /// Read the last successfully processed row id.
    pub async fn get_checkpoint(&self) -> DbResult<Option<Uuid>> {
        let row = sqlx::query("SELECT id FROM extraction_checkpoint LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("id")))
    }

    /// Atomically replace the checkpoint (single-row upsert).
    pub async fn update_checkpoint(&self, last_processed_id: Uuid) -> DbResult<()> {
        let updated =
            sqlx::query("UPDATE extraction_checkpoint SET id = $1, updated_at = now()")
                .bind(last_processed_id)
                .execute(&self.pool)
                .await?;

        if updated.rows_affected() == 0 {
            sqlx::query("INSERT INTO extraction_checkpoint (id, updated_at) VALUES ($1, now())")
                .bind(last_processed_id)
                .execute(&self.pool)
                .await?;
        }

        debug!("checkpoint advanced to {}", last_processed_id);
        Ok(())
    }

    /// Connectivity probe for readiness checks.
    pub async fn check_connectivity(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_cursor_mapping() {
        let row = PendingRow {
            id: Uuid::nil(),
            code: "ABC123".into(),
            created_at: Utc::now(),
        };
        let cursor = row.cursor();
        assert_eq!(cursor.id, row.id);
        assert_eq!(cursor.created_at, row.created_at);
    }
}
