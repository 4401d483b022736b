//! Perceptual duplicate-frame removal.
//!
//! Duplicate detection uses a difference hash (dHash) computed on the
//! processed PNGs. Frames are walked in chronological order and the first
//! occurrence of each hash wins, which keeps the result deterministic across
//! re-runs.

use std::collections::HashMap;
use std::path::Path;

use image::imageops::FilterType;
use image::DynamicImage;
use tracing::{debug, info, warn};

use fvec_models::Frame;

use crate::error::MediaResult;

/// Dedup parameters.
#[derive(Debug, Clone)]
pub struct DedupeConfig {
    /// dHash edge length; capped at 8 so the hash fits in 64 bits
    pub hash_size: u32,
    /// Unlink duplicate files from disk
    pub delete: bool,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            hash_size: 8,
            delete: true,
        }
    }
}

/// Compute the difference hash of an image.
///
/// Grayscale, resize to `(size+1, size)`, then compare each pixel with its
/// right neighbor row by row; the comparison bitmap is packed into a u64.
pub fn dhash(img: &DynamicImage, hash_size: u32) -> u64 {
    let size = hash_size.clamp(1, 8);
    let gray = img.to_luma8();
    let resized = image::imageops::resize(&gray, size + 1, size, FilterType::Triangle);

    let mut hash = 0u64;
    let mut bit = 0u32;
    for y in 0..size {
        for x in 0..size {
            if resized.get_pixel(x + 1, y)[0] > resized.get_pixel(x, y)[0] {
                hash |= 1 << bit;
            }
            bit += 1;
        }
    }
    hash
}

/// Remove perceptually duplicate frames.
///
/// Input frames are sorted chronologically (by index) first. Unreadable
/// frames are kept so they can be inspected later. Survivors are renumbered
/// contiguously from 1 and their files renamed to match, preserving order.
pub async fn remove_duplicates(
    frames: Vec<Frame>,
    config: &DedupeConfig,
) -> MediaResult<Vec<Frame>> {
    if frames.is_empty() {
        warn!("no frames supplied to dedup, skipping");
        return Ok(frames);
    }

    let mut sorted = frames;
    sorted.sort_by_key(|f| f.index);

    let total = sorted.len();
    let mut seen: HashMap<u64, u32> = HashMap::new();
    let mut kept: Vec<Frame> = Vec::new();
    let mut removed = 0usize;

    for frame in sorted {
        let img = match image::open(&frame.path) {
            Ok(img) => img,
            Err(e) => {
                // Unreadable frames are kept, conservative.
                warn!("could not read {}, keeping: {}", frame.path.display(), e);
                kept.push(frame);
                continue;
            }
        };

        let hash = dhash(&img, config.hash_size);
        if let Some(first) = seen.get(&hash) {
            debug!(
                "{} duplicate of frame {}",
                frame.path.display(),
                first
            );
            removed += 1;
            if config.delete {
                if let Err(e) = tokio::fs::remove_file(&frame.path).await {
                    warn!("could not delete {}: {}", frame.path.display(), e);
                }
            }
        } else {
            seen.insert(hash, frame.index);
            kept.push(frame);
        }
    }

    info!("dedup kept {}/{}, removed {}", kept.len(), total, removed);

    renumber(kept).await
}

/// Reassign contiguous indexes from 1 and rename files to match.
async fn renumber(frames: Vec<Frame>) -> MediaResult<Vec<Frame>> {
    let mut out = Vec::with_capacity(frames.len());

    for (pos, frame) in frames.into_iter().enumerate() {
        let index = pos as u32 + 1;
        if index == frame.index {
            out.push(frame);
            continue;
        }

        let new_path = frame
            .path
            .parent()
            .map(|d| d.join(Frame::file_name(index, frame.second)))
            .unwrap_or_else(|| Path::new(&Frame::file_name(index, frame.second)).to_path_buf());

        tokio::fs::rename(&frame.path, &new_path).await?;
        out.push(Frame {
            index,
            second: frame.second,
            path: new_path,
        });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn gradient(seed: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(32, 32, |x, y| {
            Rgb([
                (x as u8).wrapping_mul(seed),
                (y as u8).wrapping_add(seed),
                seed,
            ])
        }))
    }

    async fn write_frame(dir: &TempDir, index: u32, second: f64, img: &DynamicImage) -> Frame {
        let path = dir.path().join(Frame::file_name(index, second));
        img.save(&path).unwrap();
        Frame {
            index,
            second,
            path,
        }
    }

    #[test]
    fn test_dhash_deterministic() {
        let img = gradient(3);
        assert_eq!(dhash(&img, 8), dhash(&img, 8));
    }

    #[test]
    fn test_dhash_distinguishes_content() {
        assert_ne!(dhash(&gradient(3), 8), dhash(&gradient(90), 8));
    }

    #[test]
    fn test_dhash_size_capped() {
        // size > 8 would overflow 64 bits; it must clamp, not panic.
        let img = gradient(3);
        assert_eq!(dhash(&img, 16), dhash(&img, 8));
    }

    #[tokio::test]
    async fn test_duplicates_removed_first_wins() {
        let dir = TempDir::new().unwrap();
        let a = gradient(3);
        let b = gradient(90);

        let frames = vec![
            write_frame(&dir, 1, 0.5, &a).await,
            write_frame(&dir, 2, 1.0, &a).await,
            write_frame(&dir, 3, 1.5, &b).await,
        ];

        let kept = remove_duplicates(frames, &DedupeConfig::default())
            .await
            .unwrap();

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].second, 0.5);
        assert_eq!(kept[1].second, 1.5);
        // Duplicate file gone, survivors renumbered contiguously.
        assert!(!dir.path().join("2_1.00.png").exists());
        assert_eq!(kept[1].index, 2);
        assert!(kept[1].path.ends_with("2_1.50.png"));
    }

    #[tokio::test]
    async fn test_delete_false_keeps_files() {
        let dir = TempDir::new().unwrap();
        let a = gradient(3);

        let frames = vec![
            write_frame(&dir, 1, 0.5, &a).await,
            write_frame(&dir, 2, 1.0, &a).await,
        ];

        let config = DedupeConfig {
            delete: false,
            ..Default::default()
        };
        let kept = remove_duplicates(frames, &config).await.unwrap();

        assert_eq!(kept.len(), 1);
        assert!(dir.path().join("2_1.00.png").exists());
    }

    #[tokio::test]
    async fn test_dedupe_idempotent() {
        let dir = TempDir::new().unwrap();
        let frames = vec![
            write_frame(&dir, 1, 0.5, &gradient(3)).await,
            write_frame(&dir, 2, 1.0, &gradient(3)).await,
            write_frame(&dir, 3, 1.5, &gradient(90)).await,
        ];

        let config = DedupeConfig::default();
        let once = remove_duplicates(frames, &config).await.unwrap();
        let twice = remove_duplicates(once.clone(), &config).await.unwrap();
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let kept = remove_duplicates(Vec::new(), &DedupeConfig::default())
            .await
            .unwrap();
        assert!(kept.is_empty());
    }
}
