//! Job definitions for the control plane.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::WorkItem;

/// Unique identifier for a batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle status.
///
/// Transitions are `Pending → Running → {Completed | Failed | Cancelled}`;
/// terminal statuses are frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Waiting for a worker slot
    #[default]
    Pending,
    /// Being processed
    Running,
    /// All items done or cleanly skipped
    Completed,
    /// Every item finally failed
    Failed,
    /// Stopped by explicit admin action
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Log severity carried in a job's log buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One line of a job's append-only log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warn, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }
}

/// A batch job as tracked by the control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub items: Vec<WorkItem>,
    pub status: JobStatus,
    /// Progress percentage (0-100)
    pub progress: u8,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(items: Vec<WorkItem>) -> Self {
        Self {
            job_id: JobId::new(),
            items,
            status: JobStatus::Pending,
            progress: 0,
            created_at: Utc::now(),
        }
    }

    /// Apply a status transition; terminal statuses are frozen.
    ///
    /// Returns `false` when the transition was ignored.
    pub fn transition(&mut self, next: JobStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = next;
        if next == JobStatus::Completed {
            self.progress = 100;
        }
        true
    }

    /// Map a processed-item count onto the 0-100 progress scale.
    pub fn set_processed(&mut self, processed: usize) {
        let total = self.items.len().max(1);
        let pct = (100.0 * processed as f64 / total as f64).round() as u8;
        self.progress = pct.min(100);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(n: usize) -> Vec<WorkItem> {
        (0..n)
            .map(|i| WorkItem::new("instagram", format!("code{}", i)))
            .collect()
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = Job::new(items(2));
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
    }

    #[test]
    fn test_terminal_statuses_frozen() {
        let mut job = Job::new(items(1));
        assert!(job.transition(JobStatus::Running));
        assert!(job.transition(JobStatus::Completed));
        assert!(!job.transition(JobStatus::Failed));
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn test_progress_mapping() {
        let mut job = Job::new(items(3));
        job.set_processed(1);
        assert_eq!(job.progress, 33);
        job.set_processed(2);
        assert_eq!(job.progress, 67);
        job.set_processed(3);
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn test_progress_reaches_exactly_100() {
        for n in 1..=17 {
            let mut job = Job::new(items(n));
            job.set_processed(n);
            assert_eq!(job.progress, 100, "n={}", n);
        }
    }
}
