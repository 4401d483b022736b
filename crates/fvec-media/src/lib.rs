//! FFmpeg CLI wrapper for the frame-extraction pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with timeouts
//! - FFprobe-based video inspection
//! - Letterbox border detection and crop re-encode (with copy fallback)
//! - Scene-change frame extraction with a minimum-frames floor
//! - Perceptual (dHash) duplicate removal

pub mod command;
pub mod crop;
pub mod dedupe;
pub mod error;
pub mod probe;
pub mod scenes;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use crop::{crop_video, detect_crop, CropConfig, CropOutcome, CropRect};
pub use dedupe::{dhash, remove_duplicates, DedupeConfig};
pub use error::{MediaError, MediaResult};
pub use probe::{probe_video, VideoInfo};
pub use scenes::{extract_frames, SceneConfig};
