//! Frozen pipeline configuration.
//!
//! Built once at startup from environment variables (optionally via an
//! `.env` file loaded by the binary) and passed into components. Every knob
//! parses with a default; only genuinely required settings are errors, and
//! those are reported by the adapter that needs them.

use std::path::PathBuf;
use std::time::Duration;

use fvec_media::{CropConfig, DedupeConfig, SceneConfig};

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_string(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

/// Process-wide pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root for ephemeral artifacts (tmp videos, frames)
    pub output_root: PathBuf,
    /// Intra-batch worker pool size
    pub max_workers: usize,
    /// Rows pulled per driver batch
    pub batch_size: i64,
    /// Cooldown between outer batches
    pub sleep_between_batches: Duration,
    /// Individual re-attempts for a failed item
    pub max_retries: u32,
    /// Platform assumed for rows pulled from the metadata store
    pub default_platform: String,
    /// Batch size cap for API submissions
    pub max_videos_per_request: usize,
    /// Concurrently running jobs in the control plane
    pub max_parallel_jobs: usize,
    /// Border crop knobs
    pub crop: CropConfig,
    /// Scene extraction knobs
    pub scenes: SceneConfig,
    /// Dedup knobs
    pub dedupe: DedupeConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from(".output"),
            max_workers: 4,
            batch_size: 100,
            sleep_between_batches: Duration::from_millis(500),
            max_retries: 2,
            default_platform: "instagram".to_string(),
            max_videos_per_request: 1000,
            max_parallel_jobs: 2,
            crop: CropConfig::default(),
            scenes: SceneConfig::default(),
            dedupe: DedupeConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let ffmpeg_timeout = env_parse("VP_FFMPEG_TIMEOUT_SECS", 300u64);

        let crop = CropConfig {
            probes: env_parse("VP_CROP_PROBES", 3),
            clip_secs: env_parse("VP_CROP_CLIP_SECS", 2),
            safe_margin_px: env_parse("VP_CROP_SAFE_MARGIN", 4),
            hwaccel: env_string("VP_CROP_HWACCEL", ""),
            cropdetect_params: env_string("VP_CROP_CROPDETECT", "24:16:0"),
            encoder: env_string("VP_CROP_ENCODER", "libx264"),
            preset: env_string("VP_CROP_PRESET", "medium"),
            tune: env_string("VP_CROP_TUNE", "film"),
            cq: env_string("VP_CROP_CQ", "23"),
            timeout_secs: ffmpeg_timeout,
        };

        let scenes = SceneConfig {
            scene_thresh: env_parse("VP_SCENE_THRESH", 0.22),
            min_frames: env_parse("VP_MIN_FRAMES", 3),
            tolerance: env_parse("VP_TOLERANCE", 5),
            solid_std: env_parse("VP_SOLID_STD", 5.0),
            trim_borders: env_string("VP_TRIM_BORDERS", "1") != "0",
            timeout_secs: ffmpeg_timeout,
        };

        let dedupe = DedupeConfig {
            hash_size: env_parse("VP_DHASH_SIZE", 8),
            delete: env_string("VP_DEDUP_DELETE", "1") != "0",
        };

        Self {
            output_root: PathBuf::from(env_string("VP_OUTPUT_DIR", ".output")),
            max_workers: env_parse("VP_MAX_WORKERS", 4usize).max(1),
            batch_size: env_parse("BATCH_SIZE", 100i64).max(1),
            sleep_between_batches: Duration::from_secs_f64(
                env_parse("VP_SLEEP_BETWEEN_BATCHES", 0.5f64).max(0.0),
            ),
            max_retries: env_parse("MAX_RETRIES", 2),
            default_platform: env_string("VP_DEFAULT_PLATFORM", "instagram"),
            max_videos_per_request: env_parse("MAX_VIDEOS_PER_REQUEST", 1000usize).max(1),
            max_parallel_jobs: env_parse("PIPELINE_MAX_PARALLEL_JOBS", 2usize).max(1),
            crop,
            scenes,
            dedupe,
        }
    }

    /// Working directory for raw and cropped videos.
    pub fn videos_dir(&self) -> PathBuf {
        self.output_root.join("tmp").join("videos")
    }

    /// Working directory for extracted frames, one subdir per code.
    pub fn frames_dir(&self, code: &str) -> PathBuf {
        self.output_root.join("tmp").join("frames").join(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.sleep_between_batches, Duration::from_millis(500));
        assert_eq!(config.scenes.min_frames, 3);
        assert!((config.scenes.scene_thresh - 0.22).abs() < 1e-9);
        assert_eq!(config.dedupe.hash_size, 8);
        assert_eq!(config.max_videos_per_request, 1000);
        assert_eq!(config.max_parallel_jobs, 2);
    }

    #[test]
    fn test_artifact_dirs() {
        let config = PipelineConfig::default();
        assert_eq!(
            config.frames_dir("ABC123"),
            PathBuf::from(".output/tmp/frames/ABC123")
        );
        assert_eq!(config.videos_dir(), PathBuf::from(".output/tmp/videos"));
    }
}
