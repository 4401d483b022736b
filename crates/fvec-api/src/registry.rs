//! In-process job registry.
//!
//! The registry is the only mutable structure shared between HTTP handlers
//! and running drivers. Jobs live in a reader/writer-locked map; each job
//! carries a bounded ring of log entries. Scheduling is FIFO through a
//! semaphore sized to `PIPELINE_MAX_PARALLEL_JOBS`; excess submissions
//! queue in `PENDING`.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock, Semaphore};
use tracing::{error, info};

use fvec_models::{ItemOutcome, Job, JobId, JobStatus, LogEntry, LogLevel, WorkItem};
use fvec_pipeline::{beacon, parse_beacon, BatchDriver, DriverEvent, VideoPipeline};

use crate::state::AppState;

/// Default per-job log ring capacity.
pub const LOG_CAPACITY: usize = 10_000;

struct JobEntry {
    job: Job,
    logs: VecDeque<LogEntry>,
    processed: usize,
}

/// Read-only view of a job handed to handlers.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub job: Job,
    pub logs: Vec<LogEntry>,
    pub processed: usize,
}

/// Registry of all jobs known to this process.
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, JobEntry>>,
    slots: Arc<Semaphore>,
    log_capacity: usize,
}

impl JobRegistry {
    pub fn new(max_parallel_jobs: usize) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            slots: Arc::new(Semaphore::new(max_parallel_jobs.max(1))),
            log_capacity: LOG_CAPACITY,
        }
    }

    /// Register a new pending job. Constant-time.
    pub async fn create(&self, items: Vec<WorkItem>) -> JobId {
        let job = Job::new(items);
        let job_id = job.job_id;

        let mut jobs = self.jobs.write().await;
        jobs.insert(
            job_id,
            JobEntry {
                job,
                logs: VecDeque::new(),
                processed: 0,
            },
        );
        job_id
    }

    /// Snapshot a job with its full log buffer.
    pub async fn get(&self, job_id: JobId) -> Option<JobSnapshot> {
        let jobs = self.jobs.read().await;
        jobs.get(&job_id).map(|entry| JobSnapshot {
            job: entry.job.clone(),
            logs: entry.logs.iter().cloned().collect(),
            processed: entry.processed,
        })
    }

    /// Status, progress and the last `k` log lines.
    pub async fn tail(&self, job_id: JobId, k: usize) -> Option<(JobStatus, u8, Vec<String>)> {
        let jobs = self.jobs.read().await;
        jobs.get(&job_id).map(|entry| {
            let tail = entry
                .logs
                .iter()
                .rev()
                .take(k)
                .map(|e| e.message.clone())
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            (entry.job.status, entry.job.progress, tail)
        })
    }

    /// Apply a status transition; terminal statuses are frozen.
    pub async fn transition(&self, job_id: JobId, status: JobStatus) -> bool {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&job_id) {
            Some(entry) => entry.job.transition(status),
            None => false,
        }
    }

    /// Append one log entry, evicting the oldest past capacity.
    pub async fn append_log(&self, job_id: JobId, entry: LogEntry) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(&job_id) {
            if job.logs.len() >= self.log_capacity {
                job.logs.pop_front();
            }
            job.logs.push_back(entry);
        }
    }

    /// Feed one line of driver output through the log pump.
    ///
    /// JSON beacons carrying `item_done` update the processed counter;
    /// lines with the ✅ glyph count as an alternate single completion.
    /// Every line lands in the log ring.
    pub async fn pump_line(&self, job_id: JobId, line: &str) {
        let mut jobs = self.jobs.write().await;
        let Some(entry) = jobs.get_mut(&job_id) else {
            return;
        };

        if let Some(processed) = parse_beacon(line) {
            entry.processed = processed;
            entry.job.set_processed(processed);
        } else if fvec_pipeline::progress::is_checkmark_line(line) {
            entry.processed += 1;
            let processed = entry.processed;
            entry.job.set_processed(processed);
        }

        if entry.logs.len() >= self.log_capacity {
            entry.logs.pop_front();
        }
        entry.logs.push_back(LogEntry::info(line));
    }

    /// Scheduling semaphore; acquisition order is submission order.
    pub fn slots(&self) -> Arc<Semaphore> {
        Arc::clone(&self.slots)
    }

    /// Route one in-process driver event through the pump.
    pub async fn handle_event(&self, job_id: JobId, event: DriverEvent) {
        match event {
            DriverEvent::ItemDone {
                processed,
                item,
                outcome,
            } => {
                self.pump_line(job_id, &beacon(processed)).await;
                let line = match outcome {
                    ItemOutcome::Done => format!("✅ {} done", item),
                    ItemOutcome::Skipped => format!("{} skipped (no source)", item),
                    ItemOutcome::Failed => format!("{} failed", item),
                };
                // Outcome lines bypass the beacon counters on purpose: the
                // beacon above already carried the count.
                self.append_log(
                    job_id,
                    LogEntry::new(
                        match outcome {
                            ItemOutcome::Failed => LogLevel::Error,
                            _ => LogLevel::Info,
                        },
                        line,
                    ),
                )
                .await;
            }
            DriverEvent::Log { level, message } => {
                self.append_log(job_id, LogEntry::new(level, message)).await;
            }
        }
    }
}

/// Run one job to completion under the registry's scheduling cap.
///
/// Spawned fire-and-forget by the submission handler; the handler returns
/// 202 immediately.
pub fn spawn_job(state: AppState, job_id: JobId, items: Vec<WorkItem>) {
    tokio::spawn(async move {
        // FIFO wait for a job slot; the job stays PENDING while queued.
        let permit = state.registry.slots().acquire_owned().await;
        if permit.is_err() {
            error!("job scheduler shut down before {} could start", job_id);
            return;
        }

        state.registry.transition(job_id, JobStatus::Running).await;
        info!("job {} started with {} items", job_id, items.len());

        let (tx, mut rx) = mpsc::unbounded_channel::<DriverEvent>();
        let registry = Arc::clone(&state.registry);
        let pump = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                registry.handle_event(job_id, event).await;
            }
        });

        let pipeline = VideoPipeline::new(
            state.config.pipeline.clone(),
            state.store.clone(),
            state.vectors.clone(),
            state.encoder.clone(),
        );
        let driver = BatchDriver::new(state.config.pipeline.clone(), pipeline, state.db.clone())
            .with_events(tx);

        let total = items.len();
        let result = driver.run_items(items).await;
        drop(driver);
        let _ = pump.await;

        match result {
            Ok(summary) => {
                // A job fails only when every item finally failed.
                let all_failed = total > 0 && summary.failed.len() == total;
                let status = if all_failed {
                    JobStatus::Failed
                } else {
                    JobStatus::Completed
                };

                for failed in &summary.failed {
                    state
                        .registry
                        .append_log(
                            job_id,
                            LogEntry::error(format!(
                                "{} failed: {} ({})",
                                failed.item, failed.message, failed.kind
                            )),
                        )
                        .await;
                }
                state
                    .registry
                    .append_log(
                        job_id,
                        LogEntry::info(format!(
                            "job finished: {} done, {} skipped, {} failed",
                            summary.done,
                            summary.skipped,
                            summary.failed.len()
                        )),
                    )
                    .await;
                state.registry.transition(job_id, status).await;
            }
            Err(e) => {
                error!("job {} aborted: {}", job_id, e);
                state
                    .registry
                    .append_log(job_id, LogEntry::error(format!("job aborted: {}", e)))
                    .await;
                state.registry.transition(job_id, JobStatus::Failed).await;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(n: usize) -> Vec<WorkItem> {
        (0..n)
            .map(|i| WorkItem::new("instagram", format!("code{}", i)))
            .collect()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let registry = JobRegistry::new(2);
        let job_id = registry.create(items(2)).await;

        let snapshot = registry.get(job_id).await.unwrap();
        assert_eq!(snapshot.job.status, JobStatus::Pending);
        assert_eq!(snapshot.job.items.len(), 2);
        assert_eq!(snapshot.processed, 0);
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let registry = JobRegistry::new(2);
        assert!(registry.get(JobId::new()).await.is_none());
        assert!(!registry.transition(JobId::new(), JobStatus::Running).await);
    }

    #[tokio::test]
    async fn test_beacon_pump_updates_progress() {
        let registry = JobRegistry::new(2);
        let job_id = registry.create(items(4)).await;

        registry.pump_line(job_id, "{\"item_done\": 2}").await;

        let snapshot = registry.get(job_id).await.unwrap();
        assert_eq!(snapshot.processed, 2);
        assert_eq!(snapshot.job.progress, 50);
        assert_eq!(snapshot.logs.len(), 1);
    }

    #[tokio::test]
    async fn test_checkmark_counts_as_completion() {
        let registry = JobRegistry::new(2);
        let job_id = registry.create(items(2)).await;

        registry.pump_line(job_id, "✅ instagram/code0 done").await;

        let snapshot = registry.get(job_id).await.unwrap();
        assert_eq!(snapshot.processed, 1);
        assert_eq!(snapshot.job.progress, 50);
    }

    #[tokio::test]
    async fn test_plain_lines_only_logged() {
        let registry = JobRegistry::new(2);
        let job_id = registry.create(items(2)).await;

        registry.pump_line(job_id, "downloading video").await;

        let snapshot = registry.get(job_id).await.unwrap();
        assert_eq!(snapshot.processed, 0);
        assert_eq!(snapshot.logs[0].message, "downloading video");
    }

    #[tokio::test]
    async fn test_log_ring_bounded() {
        let registry = JobRegistry::new(2);
        let job_id = registry.create(items(1)).await;

        for i in 0..(LOG_CAPACITY + 10) {
            registry
                .append_log(job_id, LogEntry::info(format!("line {}", i)))
                .await;
        }

        let snapshot = registry.get(job_id).await.unwrap();
        assert_eq!(snapshot.logs.len(), LOG_CAPACITY);
        assert_eq!(snapshot.logs[0].message, "line 10");
    }

    #[tokio::test]
    async fn test_tail_returns_last_k_in_order() {
        let registry = JobRegistry::new(2);
        let job_id = registry.create(items(1)).await;

        for i in 0..5 {
            registry
                .append_log(job_id, LogEntry::info(format!("line {}", i)))
                .await;
        }

        let (_, _, tail) = registry.tail(job_id, 2).await.unwrap();
        assert_eq!(tail, vec!["line 3", "line 4"]);
    }

    #[tokio::test]
    async fn test_terminal_transition_frozen() {
        let registry = JobRegistry::new(2);
        let job_id = registry.create(items(1)).await;

        assert!(registry.transition(job_id, JobStatus::Running).await);
        assert!(registry.transition(job_id, JobStatus::Completed).await);
        assert!(!registry.transition(job_id, JobStatus::Running).await);

        let snapshot = registry.get(job_id).await.unwrap();
        assert_eq!(snapshot.job.status, JobStatus::Completed);
    }
}
