//! Work item identifying one video.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A `(platform, code)` pair identifying one video to process.
///
/// `code` is unique within its platform. The special platform `"local"`
/// short-circuits object-store downloads to a file already on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    /// Source platform (e.g. "instagram")
    pub platform: String,
    /// Opaque content code, unique per platform
    pub code: String,
}

impl WorkItem {
    pub fn new(platform: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            code: code.into(),
        }
    }

    /// True when the item points at a local file instead of the object store.
    pub fn is_local(&self) -> bool {
        self.platform == "local"
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.platform, self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let item = WorkItem::new("instagram", "ABC123");
        assert_eq!(item.to_string(), "instagram/ABC123");
    }

    #[test]
    fn test_local_detection() {
        assert!(WorkItem::new("local", "clip").is_local());
        assert!(!WorkItem::new("instagram", "clip").is_local());
    }

    #[test]
    fn test_deserialize() {
        let item: WorkItem =
            serde_json::from_str(r#"{"platform":"instagram","code":"XYZ789"}"#).unwrap();
        assert_eq!(item.code, "XYZ789");
    }
}
