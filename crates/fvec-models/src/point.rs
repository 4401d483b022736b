//! Vector points and their deterministic identifiers.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Key string a point ID is derived from.
///
/// Seconds are rendered with two decimals so the key matches the frame's
/// on-disk name exactly.
pub fn frame_key(platform: &str, code: &str, index: u32, second: f64) -> String {
    format!("{}:{}:{}:{:.2}", platform, code, index, second)
}

/// Deterministic point ID: UUIDv5 over the frame key.
///
/// Re-running the pipeline for the same video yields the same IDs, which
/// makes upserts idempotent.
pub fn point_id(platform: &str, code: &str, index: u32, second: f64) -> Uuid {
    Uuid::new_v5(
        &Uuid::NAMESPACE_DNS,
        frame_key(platform, code, index, second).as_bytes(),
    )
}

/// Payload stored alongside each frame vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramePayload {
    /// Mirror of the point ID for payload-side filtering
    pub uuid: String,
    /// RFC-3339 UTC timestamp of the upsert
    pub created_at: String,
    /// Source platform
    pub platform: String,
    /// Video code
    pub video_code: String,
    /// 1-based frame index
    pub frame_number: u32,
    /// Source timestamp in seconds
    pub frame_second: f64,
    /// Object-store key of the frame PNG
    pub path: String,
    /// Escape hatch for fields outside the fixed schema
    #[serde(flatten, default)]
    pub extra: BTreeMap<String, Value>,
}

impl FramePayload {
    /// Build the payload for one frame of `{platform}/{code}`.
    pub fn new(platform: &str, code: &str, index: u32, second: f64) -> Self {
        let id = point_id(platform, code, index, second);
        Self {
            uuid: id.to_string(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            platform: platform.to_string(),
            video_code: code.to_string(),
            frame_number: index,
            frame_second: second,
            path: format!(
                "{}/{}/{}",
                platform,
                code,
                crate::Frame::file_name(index, second)
            ),
            extra: BTreeMap::new(),
        }
    }
}

/// One point ready for upsert into the vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: FramePayload,
}

impl VectorPoint {
    pub fn new(platform: &str, code: &str, index: u32, second: f64, vector: Vec<f32>) -> Self {
        let payload = FramePayload::new(platform, code, index, second);
        Self {
            id: point_id(platform, code, index, second),
            vector,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_id_deterministic() {
        let a = point_id("instagram", "ABC123", 1, 0.52);
        let b = point_id("instagram", "ABC123", 1, 0.52);
        assert_eq!(a, b);
    }

    #[test]
    fn test_point_id_distinguishes_inputs() {
        let base = point_id("instagram", "ABC123", 1, 0.52);
        assert_ne!(base, point_id("youtube", "ABC123", 1, 0.52));
        assert_ne!(base, point_id("instagram", "ABC124", 1, 0.52));
        assert_ne!(base, point_id("instagram", "ABC123", 2, 0.52));
        assert_ne!(base, point_id("instagram", "ABC123", 1, 0.53));
    }

    #[test]
    fn test_payload_mirrors_id_and_path() {
        let point = VectorPoint::new("instagram", "ABC123", 3, 7.4, vec![0.0; 4]);
        assert_eq!(point.payload.uuid, point.id.to_string());
        assert_eq!(point.payload.path, "instagram/ABC123/3_7.40.png");
        assert_eq!(point.payload.frame_number, 3);
    }

    #[test]
    fn test_payload_extra_flattened() {
        let mut payload = FramePayload::new("instagram", "ABC123", 1, 0.0);
        payload
            .extra
            .insert("source".into(), Value::String("reprocess".into()));

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["source"], "reprocess");
        assert_eq!(json["video_code"], "ABC123");
    }
}
