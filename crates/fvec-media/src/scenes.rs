//! Scene-change frame extraction.
//!
//! FFmpeg's `select='gt(scene,T)'` filter dumps one image per detected scene
//! cut, named by its presentation timestamp. Survivors of the uniform-color
//! filter are renamed to the canonical `{index}_{second:.2}.png` form with
//! contiguous indexes. A fallback pass samples frames at equal intervals when
//! scene detection yields fewer than the configured floor.

use std::path::{Path, PathBuf};

use image::{DynamicImage, RgbImage};
use tracing::{debug, info, warn};

use fvec_models::Frame;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_video;

/// Scene extraction parameters.
#[derive(Debug, Clone)]
pub struct SceneConfig {
    /// Scene-change threshold in `[0, 1]`
    pub scene_thresh: f64,
    /// Minimum number of frames per video
    pub min_frames: usize,
    /// Pixel tolerance for the uniform-border trim
    pub tolerance: u32,
    /// Grayscale standard deviation below which a frame counts as solid
    pub solid_std: f64,
    /// Whether to trim residual uniform-color borders per frame
    pub trim_borders: bool,
    /// Watchdog timeout per ffmpeg invocation
    pub timeout_secs: u64,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            scene_thresh: 0.22,
            min_frames: 3,
            tolerance: 5,
            solid_std: 5.0,
            trim_borders: true,
            timeout_secs: 300,
        }
    }
}

/// Extract representative frames from `video` into `out_dir`.
///
/// Returns the kept frames in chronological order with contiguous indexes
/// starting at 1. An empty result is reported as [`MediaError::NoFrames`].
pub async fn extract_frames(
    video: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
    config: &SceneConfig,
) -> MediaResult<Vec<Frame>> {
    let video = video.as_ref();
    let out_dir = out_dir.as_ref();
    tokio::fs::create_dir_all(out_dir).await?;

    let info = probe_video(video).await?;
    let runner = FfmpegRunner::new().with_timeout(config.timeout_secs);

    // Scene pass: one PNG per cut, named by presentation timestamp.
    let pattern = out_dir.join("%d.png");
    let cmd = FfmpegCommand::new(video, &pattern)
        .video_filter(format!("select='gt(scene,{})'", config.scene_thresh))
        .output_args(["-vsync", "vfr"])
        .output_args(["-frame_pts", "1"]);

    if let Err(e) = runner.run(&cmd).await {
        warn!("scene pass failed for {}: {}", video.display(), e);
    }

    let mut entries = raw_entries(out_dir).await?;
    entries.sort_by_key(|(_, pts)| *pts);
    debug!(
        "scene pass produced {} raw frames for {}",
        entries.len(),
        video.display()
    );

    let mut frames: Vec<Frame> = Vec::new();
    for (raw_path, pts) in entries {
        let second = pts as f64 / info.fps;
        if let Some(frame) = keep_frame(&raw_path, out_dir, frames.len() as u32 + 1, second, config)
        {
            frames.push(frame);
        }
        // Raw file consumed either way.
        let _ = tokio::fs::remove_file(&raw_path).await;
    }

    // Floor pass: equal-interval sampling until min_frames is reached.
    if frames.len() < config.min_frames {
        info!(
            "only {} scene frames for {}, sampling to reach {}",
            frames.len(),
            video.display(),
            config.min_frames
        );
        sample_to_floor(video, out_dir, &mut frames, info.fps, info.nb_frames, config, &runner)
            .await?;
    }

    if frames.is_empty() {
        return Err(MediaError::NoFrames);
    }

    Ok(frames)
}

/// Collect `{pts}.png` files produced by the scene pass.
async fn raw_entries(out_dir: &Path) -> MediaResult<Vec<(PathBuf, u64)>> {
    let mut entries = Vec::new();
    let mut dir = tokio::fs::read_dir(out_dir).await?;
    while let Some(entry) = dir.next_entry().await? {
        let path = entry.path();
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if let Ok(pts) = stem.parse::<u64>() {
            entries.push((path, pts));
        }
    }
    Ok(entries)
}

/// Filter, trim and persist one candidate frame under its canonical name.
///
/// Returns `None` when the frame is uniform color or unreadable.
fn keep_frame(
    raw_path: &Path,
    out_dir: &Path,
    index: u32,
    second: f64,
    config: &SceneConfig,
) -> Option<Frame> {
    let img = match image::open(raw_path) {
        Ok(img) => img,
        Err(e) => {
            warn!("could not decode {}: {}", raw_path.display(), e);
            return None;
        }
    };

    let mut rgb = img.to_rgb8();

    if config.trim_borders {
        if let Some((x, y, w, h)) = detect_uniform_borders(&rgb, config.tolerance) {
            rgb = image::imageops::crop_imm(&rgb, x, y, w, h).to_image();
        }
    }

    if is_uniform(&rgb, config.solid_std) {
        debug!("dropping uniform frame {}", raw_path.display());
        return None;
    }

    let dst = out_dir.join(Frame::file_name(index, second));
    if let Err(e) = DynamicImage::ImageRgb8(rgb).save(&dst) {
        warn!("could not write {}: {}", dst.display(), e);
        return None;
    }

    Some(Frame {
        index,
        second,
        path: dst,
    })
}

/// Sample frames at equal intervals until the floor is met or the video is
/// exhausted.
async fn sample_to_floor(
    video: &Path,
    out_dir: &Path,
    frames: &mut Vec<Frame>,
    fps: f64,
    nb_frames: u64,
    config: &SceneConfig,
    runner: &FfmpegRunner,
) -> MediaResult<()> {
    if nb_frames == 0 {
        return Ok(());
    }

    let step = (nb_frames / (config.min_frames as u64 + 1)).max(1);

    for i in 1..=config.min_frames as u64 {
        if frames.len() >= config.min_frames {
            break;
        }
        let frame_no = i * step;
        if frame_no >= nb_frames {
            break;
        }
        let second = frame_no as f64 / fps;

        let tmp = out_dir.join(format!("sample_{}.png", frame_no));
        let cmd = FfmpegCommand::new(video, &tmp).seek(second).frames(1);
        if let Err(e) = runner.run(&cmd).await {
            warn!("sampling at {:.2}s failed: {}", second, e);
            continue;
        }
        if !tmp.exists() {
            continue;
        }

        let index = frames.len() as u32 + 1;
        if let Some(frame) = keep_frame(&tmp, out_dir, index, second, config) {
            frames.push(frame);
        }
        let _ = tokio::fs::remove_file(&tmp).await;
    }

    Ok(())
}

/// True when the grayscale standard deviation is below the solid threshold.
fn is_uniform(img: &RgbImage, solid_std: f64) -> bool {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return true;
    }

    let n = (w * h) as f64;
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for p in img.pixels() {
        let luma = 0.299 * p[0] as f64 + 0.587 * p[1] as f64 + 0.114 * p[2] as f64;
        sum += luma;
        sum_sq += luma * luma;
    }
    let mean = sum / n;
    let var = (sum_sq / n - mean * mean).max(0.0);
    var.sqrt() < solid_std
}

/// Strip uniform-color margins via a per-edge median-difference test.
///
/// Returns the content rectangle, or `None` when nothing needs trimming or
/// the whole image is blank.
fn detect_uniform_borders(img: &RgbImage, tol: u32) -> Option<(u32, u32, u32, u32)> {
    let (w, h) = img.dimensions();
    if w < 3 || h < 3 {
        return None;
    }

    let col_blank = |x: u32| is_blank_line((0..h).map(|y| img.get_pixel(x, y).0), tol);
    let row_blank = |y: u32| is_blank_line((0..w).map(|x| img.get_pixel(x, y).0), tol);

    let mut x0 = 0;
    while x0 < w && col_blank(x0) {
        x0 += 1;
    }
    let mut x1 = w;
    while x1 > x0 && col_blank(x1 - 1) {
        x1 -= 1;
    }
    let mut y0 = 0;
    while y0 < h && row_blank(y0) {
        y0 += 1;
    }
    let mut y1 = h;
    while y1 > y0 && row_blank(y1 - 1) {
        y1 -= 1;
    }

    if x0 >= x1 || y0 >= y1 {
        return None;
    }
    if x0 == 0 && y0 == 0 && x1 == w && y1 == h {
        return None;
    }
    Some((x0, y0, x1 - x0, y1 - y0))
}

/// All pixels of the line within `tol` of the line's median color.
fn is_blank_line(line: impl Iterator<Item = [u8; 3]>, tol: u32) -> bool {
    let pixels: Vec<[u8; 3]> = line.collect();
    if pixels.is_empty() {
        return true;
    }

    let median = |ch: usize| -> i32 {
        let mut values: Vec<u8> = pixels.iter().map(|p| p[ch]).collect();
        values.sort_unstable();
        values[values.len() / 2] as i32
    };
    let med = [median(0), median(1), median(2)];

    pixels.iter().all(|p| {
        let diff: i32 = (0..3).map(|c| (p[c] as i32 - med[c]).abs()).sum();
        diff as u32 <= tol
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(w: u32, h: u32, color: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb(color))
    }

    fn checkerboard(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        })
    }

    #[test]
    fn test_uniform_detection() {
        assert!(is_uniform(&solid(32, 32, [17, 17, 17]), 5.0));
        assert!(!is_uniform(&checkerboard(32, 32), 5.0));
    }

    #[test]
    fn test_border_trim_strips_letterbox() {
        // 20x20 content inside black 4px bands top and bottom.
        let mut img = solid(20, 28, [0, 0, 0]);
        for y in 4..24 {
            for x in 0..20 {
                let v = ((x * 13 + y * 7) % 256) as u8;
                img.put_pixel(x, y, Rgb([v, 255 - v, v]));
            }
        }

        let (x, y, w, h) = detect_uniform_borders(&img, 5).unwrap();
        assert_eq!((x, y, w, h), (0, 4, 20, 20));
    }

    #[test]
    fn test_border_trim_noop_without_borders() {
        assert!(detect_uniform_borders(&checkerboard(16, 16), 5).is_none());
    }

    #[test]
    fn test_blank_line_tolerance() {
        let line = [[10, 10, 10], [12, 11, 10], [10, 10, 13]];
        assert!(is_blank_line(line.iter().copied(), 5));
        assert!(!is_blank_line(
            [[10, 10, 10], [200, 10, 10]].iter().copied(),
            5
        ));
    }

    #[tokio::test]
    async fn test_raw_entries_ignores_foreign_files() {
        let dir = tempfile::TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("37.png"), b"x").await.unwrap();
        tokio::fs::write(dir.path().join("5.png"), b"x").await.unwrap();
        tokio::fs::write(dir.path().join("1_0.17.png"), b"x")
            .await
            .unwrap();

        let mut entries = raw_entries(dir.path()).await.unwrap();
        entries.sort_by_key(|(_, pts)| *pts);
        let pts: Vec<u64> = entries.iter().map(|(_, p)| *p).collect();
        assert_eq!(pts, vec![5, 37]);
    }
}
