//! Letterbox border detection and crop re-encode.
//!
//! Detection probes a handful of evenly-spaced timestamps with ffmpeg's
//! `cropdetect` filter and unions the reported rectangles. When detection or
//! the re-encode fails the source is copied verbatim so downstream phases
//! always have a file to work with.

use std::path::Path;
use tracing::{debug, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::probe::probe_video;

/// Crop detection and encode parameters.
#[derive(Debug, Clone)]
pub struct CropConfig {
    /// Evenly-spaced probe points
    pub probes: u32,
    /// Seconds of video analysed at each probe
    pub clip_secs: u32,
    /// Safety pixels added to each edge of the union box
    pub safe_margin_px: u32,
    /// ffmpeg `-hwaccel` value; empty disables hardware acceleration
    pub hwaccel: String,
    /// Value passed to the cropdetect filter, e.g. "24:16:0"
    pub cropdetect_params: String,
    /// Video encoder for the re-encode
    pub encoder: String,
    pub preset: String,
    pub tune: String,
    pub cq: String,
    /// Watchdog timeout per ffmpeg invocation
    pub timeout_secs: u64,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            probes: 3,
            clip_secs: 2,
            safe_margin_px: 4,
            hwaccel: String::new(),
            cropdetect_params: "24:16:0".to_string(),
            encoder: "libx264".to_string(),
            preset: "medium".to_string(),
            tune: "film".to_string(),
            cq: "23".to_string(),
            timeout_secs: 300,
        }
    }
}

/// Content rectangle inside a letterboxed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl CropRect {
    /// Union of two rectangles.
    pub fn union(&self, other: &CropRect) -> CropRect {
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = (self.x + self.w).max(other.x + other.w);
        let y1 = (self.y + self.h).max(other.y + other.h);
        CropRect {
            x: x0,
            y: y0,
            w: x1 - x0,
            h: y1 - y0,
        }
    }

    /// Expand by `margin` pixels on every edge, clamped to the frame bounds.
    ///
    /// A zero frame dimension means the bound is unknown and only the
    /// lower clamp applies.
    pub fn expand(&self, margin: u32, frame_w: u32, frame_h: u32) -> CropRect {
        let x0 = self.x.saturating_sub(margin);
        let y0 = self.y.saturating_sub(margin);
        let mut x1 = self.x + self.w + margin;
        let mut y1 = self.y + self.h + margin;
        if frame_w > 0 {
            x1 = x1.min(frame_w);
        }
        if frame_h > 0 {
            y1 = y1.min(frame_h);
        }
        CropRect {
            x: x0,
            y: y0,
            w: x1 - x0,
            h: y1 - y0,
        }
    }

    /// Round width and height up to the next even value (encoder requirement).
    pub fn evened(&self) -> CropRect {
        CropRect {
            x: self.x,
            y: self.y,
            w: self.w + self.w % 2,
            h: self.h + self.h % 2,
        }
    }
}

/// What `crop_video` actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropOutcome {
    /// Borders detected and the re-encode succeeded
    Cropped,
    /// No borders detected or the encode failed; source copied verbatim
    Copied,
}

/// Parse the final `crop=W:H:X:Y` line from cropdetect stderr.
fn parse_cropdetect(stderr: &str) -> Option<CropRect> {
    let spec = stderr
        .lines()
        .rev()
        .find_map(|line| line.split("crop=").nth(1))?
        .split_whitespace()
        .next()?;

    let parts: Vec<u32> = spec.split(':').filter_map(|p| p.parse().ok()).collect();
    match parts[..] {
        [w, h, x, y] => Some(CropRect { x, y, w, h }),
        _ => None,
    }
}

/// Estimate the content rectangle of `src`.
///
/// Probes `config.probes` evenly-spaced timestamps; returns `None` when the
/// video has no measurable duration or no probe reports a rectangle.
pub async fn detect_crop(src: impl AsRef<Path>, config: &CropConfig) -> MediaResult<Option<CropRect>> {
    let src = src.as_ref();
    let info = probe_video(src).await?;
    if info.duration <= 0.0 {
        return Ok(None);
    }

    let runner = FfmpegRunner::new().with_timeout(config.timeout_secs);
    let mut rects: Vec<CropRect> = Vec::new();

    for k in 0..config.probes {
        let ts = info.duration * (k + 1) as f64 / (config.probes + 1) as f64;

        let mut cmd = FfmpegCommand::analysis(src)
            .seek(ts)
            .duration(config.clip_secs as f64);
        if !config.hwaccel.is_empty() {
            cmd = cmd.input_args(["-hwaccel", config.hwaccel.as_str()]);
        }
        let cmd = cmd
            .video_filter(format!("cropdetect={}", config.cropdetect_params))
            .output_arg("-an");

        match runner.run(&cmd).await {
            Ok(stderr) => {
                if let Some(rect) = parse_cropdetect(&stderr) {
                    rects.push(rect);
                }
            }
            Err(e) => {
                debug!("cropdetect probe at {:.2}s failed: {}", ts, e);
            }
        }
    }

    let Some(first) = rects.first().copied() else {
        return Ok(None);
    };
    let union = rects.iter().skip(1).fold(first, |acc, r| acc.union(r));
    Ok(Some(union.expand(config.safe_margin_px, info.width, info.height)))
}

/// Detect borders and re-encode `src` to `dst`.
///
/// Falls back to a byte copy when detection finds nothing or the encode
/// fails. `src` is never deleted.
pub async fn crop_video(
    src: impl AsRef<Path>,
    dst: impl AsRef<Path>,
    config: &CropConfig,
) -> MediaResult<CropOutcome> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    let rect = match detect_crop(src, config).await {
        Ok(Some(rect)) => rect.evened(),
        Ok(None) => {
            warn!("no borders detected in {}, copying original", src.display());
            tokio::fs::copy(src, dst).await?;
            return Ok(CropOutcome::Copied);
        }
        Err(e) => {
            warn!("crop detection failed for {}: {}", src.display(), e);
            tokio::fs::copy(src, dst).await?;
            return Ok(CropOutcome::Copied);
        }
    };

    debug!(
        "applying crop {}x{}+{}+{} to {}",
        rect.w,
        rect.h,
        rect.x,
        rect.y,
        src.display()
    );

    let cmd = FfmpegCommand::new(src, dst)
        .video_filter(format!(
            "crop=w={}:h={}:x={}:y={},setsar=1:1,format=nv12",
            rect.w, rect.h, rect.x, rect.y
        ))
        .video_codec(&config.encoder)
        .output_args(["-preset", config.preset.as_str()])
        .output_args(["-tune", config.tune.as_str()])
        .output_args(["-cq", config.cq.as_str()])
        .output_args(["-c:a", "copy"])
        .output_args(["-movflags", "+faststart"]);

    let runner = FfmpegRunner::new().with_timeout(config.timeout_secs);
    match runner.run(&cmd).await {
        Ok(_) => Ok(CropOutcome::Cropped),
        Err(e) => {
            warn!(
                "crop encode failed for {}, falling back to copy: {}",
                src.display(),
                e
            );
            tokio::fs::copy(src, dst).await?;
            Ok(CropOutcome::Copied)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cropdetect_takes_final_line() {
        let stderr = "\
[Parsed_cropdetect_0 @ 0x1] x1:0 x2:1079 y1:208 y2:1711 crop=1072:1488:4:216\n\
[Parsed_cropdetect_0 @ 0x1] x1:0 x2:1079 y1:200 y2:1719 crop=1080:1504:0:208\n";
        let rect = parse_cropdetect(stderr).unwrap();
        assert_eq!(
            rect,
            CropRect {
                x: 0,
                y: 208,
                w: 1080,
                h: 1504
            }
        );
    }

    #[test]
    fn test_parse_cropdetect_no_match() {
        assert!(parse_cropdetect("frame=1 fps=0.0").is_none());
    }

    #[test]
    fn test_union() {
        let a = CropRect {
            x: 10,
            y: 10,
            w: 100,
            h: 100,
        };
        let b = CropRect {
            x: 5,
            y: 20,
            w: 100,
            h: 100,
        };
        let u = a.union(&b);
        assert_eq!(u.x, 5);
        assert_eq!(u.y, 10);
        assert_eq!(u.w, 105);
        assert_eq!(u.h, 110);
    }

    #[test]
    fn test_expand_clamps_to_frame() {
        let rect = CropRect {
            x: 2,
            y: 2,
            w: 100,
            h: 100,
        };
        let expanded = rect.expand(4, 104, 104);
        assert_eq!(expanded.x, 0);
        assert_eq!(expanded.y, 0);
        assert_eq!(expanded.w, 104);
        assert_eq!(expanded.h, 104);
    }

    #[test]
    fn test_evened_rounds_up() {
        let rect = CropRect {
            x: 1,
            y: 1,
            w: 101,
            h: 99,
        };
        let even = rect.evened();
        assert_eq!(even.w, 102);
        assert_eq!(even.h, 100);
        assert_eq!(even.x, 1);
    }

    #[test]
    fn test_evened_keeps_even_sizes() {
        let rect = CropRect {
            x: 0,
            y: 0,
            w: 100,
            h: 100,
        };
        assert_eq!(rect.evened(), rect);
    }
}
