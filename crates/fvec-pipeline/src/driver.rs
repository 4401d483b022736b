//! Checkpointed, retrying batch driver.
//!
//! Pulls work either from an explicit item list (API jobs) or from the
//! metadata store's pending backlog, dispatches items to the per-video
//! pipeline under a bounded worker pool, retries failures individually,
//! verifies upserts against the vector store, flips metadata flags, and
//! checkpoints progress between backlog batches.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};

use fvec_db::MetadataStore;
use fvec_models::{ItemOutcome, LogLevel, ProcessResult, WorkItem};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::VideoPipeline;
use crate::progress::DriverEvent;

/// One finally-failed item with its error disposition.
#[derive(Debug, Clone)]
pub struct FailedItem {
    pub item: WorkItem,
    pub kind: &'static str,
    pub message: String,
}

/// Aggregate result of one driver run.
#[derive(Debug, Default)]
pub struct DriverSummary {
    pub processed: usize,
    pub done: usize,
    pub skipped: usize,
    pub failed: Vec<FailedItem>,
}

impl DriverSummary {
    /// CLI exit code: 0 all succeeded or skipped, 1 any final failure.
    pub fn exit_code(&self) -> i32 {
        if self.failed.is_empty() {
            0
        } else {
            1
        }
    }
}

/// The batch driver.
pub struct BatchDriver {
    config: PipelineConfig,
    pipeline: Arc<VideoPipeline>,
    db: Option<MetadataStore>,
    events: Option<mpsc::UnboundedSender<DriverEvent>>,
}

impl BatchDriver {
    pub fn new(config: PipelineConfig, pipeline: VideoPipeline, db: Option<MetadataStore>) -> Self {
        Self {
            config,
            pipeline: Arc::new(pipeline),
            db,
            events: None,
        }
    }

    /// Attach a progress-event channel (consumed by the job registry).
    pub fn with_events(mut self, sender: mpsc::UnboundedSender<DriverEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    fn emit(&self, event: DriverEvent) {
        if let Some(sender) = &self.events {
            let _ = sender.send(event);
        }
    }

    fn emit_log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(DriverEvent::Log {
            level,
            message: message.into(),
        });
    }

    /// Process an explicit list of items (API-submitted job).
    pub async fn run_items(&self, items: Vec<WorkItem>) -> PipelineResult<DriverSummary> {
        self.pipeline.vectors().ensure_collection().await?;

        let mut summary = DriverSummary::default();
        let total = items.len();
        self.emit_log(LogLevel::Info, format!("starting job with {} items", total));

        for chunk in items.chunks(self.config.batch_size as usize) {
            self.run_batch(chunk, &mut summary).await;
            tokio::time::sleep(self.config.sleep_between_batches).await;
        }

        info!(
            "run finished: {} done, {} skipped, {} failed",
            summary.done,
            summary.skipped,
            summary.failed.len()
        );
        Ok(summary)
    }

    /// Drain the metadata store's pending backlog, resuming from the
    /// checkpoint and advancing it after every batch.
    pub async fn run_backlog(&self) -> PipelineResult<DriverSummary> {
        let db = self
            .db
            .as_ref()
            .ok_or_else(|| PipelineError::config("backlog run requires DATABASE_URL"))?;

        self.pipeline.vectors().ensure_collection().await?;

        let mut cursor = match db.get_checkpoint().await? {
            Some(id) => {
                let cursor = db.cursor_for(id).await?;
                if cursor.is_none() {
                    warn!("checkpointed row {} no longer exists, starting over", id);
                }
                cursor
            }
            None => None,
        };

        let mut summary = DriverSummary::default();

        loop {
            let rows = db
                .next_pending_batch(self.config.batch_size, cursor)
                .await?;
            let Some(last) = rows.last() else {
                break;
            };
            let next_cursor = last.cursor();
            let last_id = last.id;

            let items: Vec<WorkItem> = rows
                .iter()
                .map(|row| WorkItem::new(self.config.default_platform.clone(), row.code.clone()))
                .collect();

            info!("processing backlog batch of {} rows", items.len());
            self.run_batch(&items, &mut summary).await;

            db.update_checkpoint(last_id).await?;
            cursor = Some(next_cursor);

            tokio::time::sleep(self.config.sleep_between_batches).await;
        }

        info!(
            "backlog drained: {} done, {} skipped, {} failed",
            summary.done,
            summary.skipped,
            summary.failed.len()
        );
        Ok(summary)
    }

    /// One batch attempt plus its individual retries.
    async fn run_batch(&self, items: &[WorkItem], summary: &mut DriverSummary) {
        let mut retry_queue: Vec<WorkItem> = Vec::new();
        let mut last_errors: HashMap<WorkItem, PipelineError> = HashMap::new();

        let outcomes = self.dispatch(items).await;
        self.settle(outcomes, true, &mut retry_queue, &mut last_errors, summary)
            .await;

        let mut attempt = 0;
        while !retry_queue.is_empty() && attempt < self.config.max_retries {
            attempt += 1;
            self.emit_log(
                LogLevel::Warn,
                format!(
                    "retrying {} items (attempt {}/{})",
                    retry_queue.len(),
                    attempt,
                    self.config.max_retries
                ),
            );

            let retries_remain = attempt < self.config.max_retries;
            let queue = std::mem::take(&mut retry_queue);
            // Retry batch size is 1: items are re-attempted individually.
            for item in queue {
                let outcomes = self.dispatch(std::slice::from_ref(&item)).await;
                self.settle(
                    outcomes,
                    retries_remain,
                    &mut retry_queue,
                    &mut last_errors,
                    summary,
                )
                .await;
            }

            tokio::time::sleep(self.config.sleep_between_batches).await;
        }

        // Anything still queued exhausted its retries.
        for item in retry_queue {
            let error = last_errors
                .remove(&item)
                .unwrap_or_else(|| PipelineError::transient("unknown error"));
            self.fail_item(item, &error, summary).await;
        }
    }

    /// Fan one batch out over the worker pool; order of results is
    /// unspecified.
    async fn dispatch(
        &self,
        items: &[WorkItem],
    ) -> Vec<(WorkItem, PipelineResult<ProcessResult>)> {
        let slots = Arc::new(Semaphore::new(self.config.max_workers));
        let mut tasks = JoinSet::new();

        for item in items.iter().cloned() {
            let pipeline = Arc::clone(&self.pipeline);
            let slots = Arc::clone(&slots);
            tasks.spawn(async move {
                let _permit = slots.acquire_owned().await;
                let result = pipeline.process(&item).await;
                (item, result)
            });
        }

        let mut outcomes = Vec::with_capacity(items.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!("worker task failed to join: {}", e),
            }
        }
        outcomes
    }

    /// Route each outcome: verified success, skip, retry queue, or final
    /// failure.
    async fn settle(
        &self,
        outcomes: Vec<(WorkItem, PipelineResult<ProcessResult>)>,
        retries_remain: bool,
        retry_queue: &mut Vec<WorkItem>,
        last_errors: &mut HashMap<WorkItem, PipelineError>,
        summary: &mut DriverSummary,
    ) {
        for (item, result) in outcomes {
            match result {
                Ok(result) if result.is_done() => match self.verify(&item, &result).await {
                    Ok(()) => {
                        summary.processed += 1;
                        summary.done += 1;
                        self.emit(DriverEvent::ItemDone {
                            processed: summary.processed,
                            item: item.clone(),
                            outcome: ItemOutcome::Done,
                        });
                    }
                    Err(e) => self.fail_item(item, &e, summary).await,
                },
                Ok(_) => {
                    // Skipped: no flag flip, no error row, not a failure.
                    summary.processed += 1;
                    summary.skipped += 1;
                    self.emit(DriverEvent::ItemDone {
                        processed: summary.processed,
                        item: item.clone(),
                        outcome: ItemOutcome::Skipped,
                    });
                }
                Err(e) if e.is_retryable() && retries_remain => {
                    self.emit_log(
                        LogLevel::Warn,
                        format!("{} failed ({}), queued for retry", item, e.kind()),
                    );
                    last_errors.insert(item.clone(), e);
                    retry_queue.push(item);
                }
                Err(e) => self.fail_item(item, &e, summary).await,
            }
        }
    }

    /// Confirm the upsert landed, then flip the metadata flags.
    ///
    /// A zero count immediately after an acknowledged upsert gets one
    /// re-verification attempt before the item is declared failed.
    async fn verify(&self, item: &WorkItem, result: &ProcessResult) -> PipelineResult<()> {
        let vectors = self.pipeline.vectors();

        let mut count = vectors.count_by_code(&item.code).await?;
        if count == 0 {
            warn!("{} verification found 0 points, re-checking", item);
            tokio::time::sleep(Duration::from_secs(1)).await;
            count = vectors.count_by_code(&item.code).await?;
        }
        if count == 0 {
            return Err(PipelineError::VectorStoreFailed(format!(
                "no points visible for {} after upsert",
                item.code
            )));
        }

        if let Some(db) = &self.db {
            db.mark_done(&item.code, result.cropped, result.frame_count as i32)
                .await?;
        }
        Ok(())
    }

    /// Record a final failure and count it.
    async fn fail_item(&self, item: WorkItem, error: &PipelineError, summary: &mut DriverSummary) {
        warn!("{} finally failed: {}", item, error);
        self.emit_log(
            LogLevel::Error,
            format!("{} failed after retries: {}", item, error),
        );

        if let Some(db) = &self.db {
            if let Err(e) = db.record_error(&item.code, &error.to_string()).await {
                warn!("could not record error for {}: {}", item.code, e);
            }
        }

        summary.processed += 1;
        summary.failed.push(FailedItem {
            item: item.clone(),
            kind: error.kind(),
            message: error.to_string(),
        });
        self.emit(DriverEvent::ItemDone {
            processed: summary.processed,
            item,
            outcome: ItemOutcome::Failed,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_exit_codes() {
        let clean = DriverSummary {
            processed: 3,
            done: 2,
            skipped: 1,
            failed: Vec::new(),
        };
        assert_eq!(clean.exit_code(), 0);

        let dirty = DriverSummary {
            processed: 1,
            done: 0,
            skipped: 0,
            failed: vec![FailedItem {
                item: WorkItem::new("instagram", "X"),
                kind: "no_frames",
                message: "no frames".into(),
            }],
        };
        assert_eq!(dirty.exit_code(), 1);
    }
}
