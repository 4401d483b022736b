//! Per-item processing outcomes.

use serde::{Deserialize, Serialize};

/// Terminal disposition of one work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemOutcome {
    /// All phases completed and the upsert was acknowledged
    Done,
    /// Source video missing (404/403); not counted as a failure
    Skipped,
    /// A phase failed; see `ProcessResult::error`
    Failed,
}

/// What the per-video pipeline did for one item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessResult {
    pub outcome: ItemOutcome,
    /// Raw video was fetched (or found locally)
    pub downloaded: bool,
    /// Border re-encode succeeded (false when the copy fallback was used)
    pub cropped: bool,
    /// Frames surviving extraction + dedup
    pub frame_count: usize,
    /// Vectors upserted
    pub embedded_count: usize,
    /// Frame upload task was dispatched
    pub upload_dispatched: bool,
    /// Short error kind for failed items, e.g. "no_frames"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessResult {
    pub fn skipped() -> Self {
        Self {
            outcome: ItemOutcome::Skipped,
            downloaded: false,
            cropped: false,
            frame_count: 0,
            embedded_count: 0,
            upload_dispatched: false,
            error: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.outcome == ItemOutcome::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skipped_result() {
        let r = ProcessResult::skipped();
        assert_eq!(r.outcome, ItemOutcome::Skipped);
        assert!(!r.is_done());
        assert!(r.error.is_none());
    }

    #[test]
    fn test_serializes_outcome_upper() {
        let r = ProcessResult::skipped();
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["outcome"], "SKIPPED");
    }
}
