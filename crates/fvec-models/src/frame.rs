//! Extracted frame and its canonical on-disk name.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One representative frame pulled from a video.
///
/// `index` is a per-video sequence number starting at 1 and contiguous after
/// deduplication; `second` is the source timestamp. The canonical file name
/// is `{index}_{second:.2}.png`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// 1-based sequence number, contiguous per video
    pub index: u32,
    /// Source timestamp in seconds
    pub second: f64,
    /// Location of the PNG on disk
    pub path: PathBuf,
}

impl Frame {
    /// Canonical file name for an (index, second) pair.
    pub fn file_name(index: u32, second: f64) -> String {
        format!("{}_{:.2}.png", index, second)
    }

    /// Parse `{index}_{second}.png` back into its components.
    ///
    /// Returns `None` for file names that do not follow the convention.
    pub fn parse_file_name(path: &Path) -> Option<(u32, f64)> {
        let stem = path.file_stem()?.to_str()?;
        let (idx, sec) = stem.split_once('_')?;
        Some((idx.parse().ok()?, sec.parse().ok()?))
    }

    /// Build a frame from an existing file following the naming convention.
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let (index, second) = Self::parse_file_name(&path)?;
        Some(Self {
            index,
            second,
            path,
        })
    }

    /// The file name this frame should carry for its current index/second.
    pub fn canonical_name(&self) -> String {
        Self::file_name(self.index, self.second)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_round_trip() {
        let name = Frame::file_name(7, 12.5);
        assert_eq!(name, "7_12.50.png");

        let parsed = Frame::parse_file_name(Path::new(&name)).unwrap();
        assert_eq!(parsed.0, 7);
        assert!((parsed.1 - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_rejects_foreign_names() {
        assert!(Frame::parse_file_name(Path::new("thumbnail.png")).is_none());
        assert!(Frame::parse_file_name(Path::new("a_b.png")).is_none());
    }

    #[test]
    fn test_from_path() {
        let frame = Frame::from_path("/tmp/frames/3_1.20.png").unwrap();
        assert_eq!(frame.index, 3);
        assert_eq!(frame.canonical_name(), "3_1.20.png");
    }
}
