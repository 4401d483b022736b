//! Driver progress events and stdout beacons.
//!
//! When the driver runs under a supervisor (the API's log pump, or any
//! process reading its stdout), each completed item is announced as a
//! single-line JSON beacon `{"item_done": N}` where N is the monotonic
//! processed count.

use serde_json::Value;

use fvec_models::{ItemOutcome, LogLevel, WorkItem};

/// Events emitted by the batch driver.
#[derive(Debug, Clone)]
pub enum DriverEvent {
    /// One item reached a terminal outcome; `processed` is monotonic.
    ItemDone {
        processed: usize,
        item: WorkItem,
        outcome: ItemOutcome,
    },
    /// Human-readable progress line for job logs.
    Log { level: LogLevel, message: String },
}

/// Render the stdout beacon for a processed count.
pub fn beacon(processed: usize) -> String {
    format!("{{\"item_done\": {}}}", processed)
}

/// Parse a line of driver output into a processed count.
///
/// JSON lines carrying an integer `item_done` are the primary signal; a
/// line containing the ✅ glyph counts as an alternate single-completion
/// signal (`None` count, handled by the caller as +1).
pub fn parse_beacon(line: &str) -> Option<usize> {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        return None;
    }
    let value: Value = serde_json::from_str(trimmed).ok()?;
    value.get("item_done")?.as_u64().map(|n| n as usize)
}

/// Alternate plain-text completion signal.
pub fn is_checkmark_line(line: &str) -> bool {
    line.contains('✅')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beacon_round_trip() {
        assert_eq!(parse_beacon(&beacon(7)), Some(7));
        assert_eq!(parse_beacon(&beacon(0)), Some(0));
    }

    #[test]
    fn test_parse_rejects_plain_text() {
        assert_eq!(parse_beacon("processed item ABC123"), None);
        assert_eq!(parse_beacon("{\"other\": 1}"), None);
        assert_eq!(parse_beacon("{not json"), None);
    }

    #[test]
    fn test_parse_ignores_non_integer() {
        assert_eq!(parse_beacon("{\"item_done\": \"three\"}"), None);
    }

    #[test]
    fn test_checkmark_detection() {
        assert!(is_checkmark_line("✅ done ABC123"));
        assert!(!is_checkmark_line("done ABC123"));
    }
}
