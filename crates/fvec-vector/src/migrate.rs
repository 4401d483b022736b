//! Legacy-payload migration shim.
//!
//! Early deployments stored points with the `{video, frame_idx, timestamp_s}`
//! payload shape and ad-hoc IDs. This helper streams such a collection and
//! rewrites each point into the current schema with deterministic UUIDv5 IDs,
//! so old data becomes filterable alongside new upserts.

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use tracing::info;

use fvec_models::point_id;

use crate::client::VectorStore;
use crate::error::VectorResult;
use crate::types::PointStruct;

const MIGRATION_BATCH: usize = 256;
const DEFAULT_PLATFORM: &str = "instagram";

/// Counters reported by a migration run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    pub upserted: usize,
    /// Points missing a frame index or timestamp
    pub skipped: usize,
}

/// Stream every point of `src_collection` into the store's configured
/// collection, rewriting payloads to the current schema.
pub async fn migrate_legacy_points(
    store: &VectorStore,
    src_collection: &str,
) -> VectorResult<MigrationReport> {
    info!(
        "migrating '{}' -> '{}'",
        src_collection,
        store.collection()
    );

    let now_iso = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let mut report = MigrationReport::default();
    let mut offset: Option<Value> = None;

    loop {
        let (points, next) = store
            .scroll(src_collection, None, MIGRATION_BATCH, offset.take())
            .await?;
        if points.is_empty() {
            break;
        }

        let mut upserts = Vec::with_capacity(points.len());
        for point in points {
            let Some(payload) = point.payload.as_ref() else {
                report.skipped += 1;
                continue;
            };
            match transform_payload(payload, &now_iso) {
                Some((id, new_payload)) => upserts.push(PointStruct {
                    id,
                    vector: point.vector.unwrap_or_default(),
                    payload: new_payload,
                }),
                None => report.skipped += 1,
            }
        }

        let count = upserts.len();
        store.upsert_raw(upserts).await?;
        report.upserted += count;

        match next {
            Some(cursor) => offset = Some(cursor),
            None => break,
        }
    }

    info!(
        "migration done: {} upserted, {} skipped",
        report.upserted, report.skipped
    );
    Ok(report)
}

/// Map a legacy payload onto the current schema.
///
/// Returns `None` when the frame index or timestamp is missing; such points
/// cannot receive a deterministic ID.
fn transform_payload(raw: &Value, now_iso: &str) -> Option<(String, Value)> {
    let platform = raw
        .get("platform")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_PLATFORM);

    let raw_video = raw
        .get("video")
        .or_else(|| raw.get("video_code"))
        .and_then(Value::as_str)?;
    // Legacy `video` carried the file name; strip the extension.
    let video_code = raw_video.rsplit_once('.').map_or(raw_video, |(stem, _)| stem);

    let frame_number = raw
        .get("frame_idx")
        .or_else(|| raw.get("frame_number"))
        .and_then(Value::as_u64)? as u32;
    let frame_second = raw
        .get("timestamp_s")
        .or_else(|| raw.get("frame_second"))
        .and_then(Value::as_f64)?;

    let path = raw.get("path").and_then(Value::as_str).unwrap_or_default();
    let path = if path.starts_with(&format!("{}/", platform)) {
        path.to_string()
    } else {
        format!("{}/{}", platform, path.trim_start_matches('/'))
    };

    let id = point_id(platform, video_code, frame_number, frame_second).to_string();

    let payload = json!({
        "uuid": id,
        "platform": platform,
        "video_code": video_code,
        "frame_number": frame_number,
        "frame_second": frame_second,
        "path": path,
        "created_at": now_iso,
    });

    Some((id, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_legacy_shape() {
        let raw = json!({
            "video": "some_clip.mp4",
            "frame_idx": 15,
            "timestamp_s": 42.3,
            "path": "frames/some_clip/15_42.30.png"
        });

        let (id, payload) = transform_payload(&raw, "2026-01-01T00:00:00Z").unwrap();
        assert_eq!(payload["video_code"], "some_clip");
        assert_eq!(payload["platform"], "instagram");
        assert_eq!(payload["frame_number"], 15);
        assert_eq!(
            payload["path"],
            "instagram/frames/some_clip/15_42.30.png"
        );
        assert_eq!(payload["uuid"], id);
    }

    #[test]
    fn test_transform_current_shape_passthrough() {
        let raw = json!({
            "platform": "instagram",
            "video_code": "ABC123",
            "frame_number": 2,
            "frame_second": 1.5,
            "path": "instagram/ABC123/2_1.50.png"
        });

        let (_, payload) = transform_payload(&raw, "2026-01-01T00:00:00Z").unwrap();
        assert_eq!(payload["path"], "instagram/ABC123/2_1.50.png");
        assert_eq!(payload["video_code"], "ABC123");
    }

    #[test]
    fn test_transform_skips_malformed() {
        let raw = json!({"video": "clip.mp4", "timestamp_s": 1.0});
        assert!(transform_payload(&raw, "now").is_none());
    }

    #[test]
    fn test_transform_ids_deterministic() {
        let raw = json!({
            "video": "clip.mp4", "frame_idx": 1, "timestamp_s": 2.0, "path": "p.png"
        });
        let (a, _) = transform_payload(&raw, "t1").unwrap();
        let (b, _) = transform_payload(&raw, "t2").unwrap();
        assert_eq!(a, b);
    }
}
