//! Per-video processing pipeline.
//!
//! Composes the adapters into one strictly ordered transform per work item:
//! download, border crop, scene extraction, dedup, embed, upsert, and the
//! fire-and-forget frame upload. Parallelism lives only inside the encoder's
//! batching and the upload fan-out; phases of one item never overlap.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use fvec_encoder::EncoderClient;
use fvec_media::{crop_video, extract_frames, remove_duplicates, CropOutcome};
use fvec_models::{ItemOutcome, ProcessResult, VectorPoint, WorkItem};
use fvec_storage::ObjectStore;
use fvec_vector::VectorStore;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};

/// The ordered per-item transform.
#[derive(Clone)]
pub struct VideoPipeline {
    config: PipelineConfig,
    store: ObjectStore,
    vectors: VectorStore,
    encoder: EncoderClient,
}

impl VideoPipeline {
    pub fn new(
        config: PipelineConfig,
        store: ObjectStore,
        vectors: VectorStore,
        encoder: EncoderClient,
    ) -> Self {
        Self {
            config,
            store,
            vectors,
            encoder,
        }
    }

    /// Process one work item end to end.
    ///
    /// A missing source video resolves to `Skipped` (not an error). All
    /// other phase failures bubble as [`PipelineError`] for the driver's
    /// retry accounting. Video artifacts are deleted before returning;
    /// frame PNGs stay on disk for the background upload.
    pub async fn process(&self, item: &WorkItem) -> PipelineResult<ProcessResult> {
        info!("processing {}", item);

        // Download
        let videos_dir = self.config.videos_dir();
        let raw = match self
            .store
            .download_video(&item.platform, &item.code, &videos_dir, false)
            .await?
        {
            Some(path) => path,
            None => {
                warn!("{} has no source video, skipping", item);
                return Ok(ProcessResult::skipped());
            }
        };

        let result = self.run_phases(item, &raw).await;

        // Raw and cropped artifacts are ephemeral; frames outlive the item
        // for the async upload.
        let cropped_path = self.cropped_path(&item.code);
        let _ = tokio::fs::remove_file(&cropped_path).await;
        if !item.is_local() {
            let _ = tokio::fs::remove_file(&raw).await;
        }

        result
    }

    async fn run_phases(&self, item: &WorkItem, raw: &PathBuf) -> PipelineResult<ProcessResult> {
        // Border crop, falling back to the uncropped source on failure.
        let cropped_path = self.cropped_path(&item.code);
        if let Some(parent) = cropped_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineError::transient(e.to_string()))?;
        }

        let (video_path, cropped) = match crop_video(raw, &cropped_path, &self.config.crop).await {
            Ok(CropOutcome::Cropped) => (cropped_path.clone(), true),
            Ok(CropOutcome::Copied) => (cropped_path.clone(), false),
            Err(e) => {
                warn!("crop failed for {}, continuing uncropped: {}", item, e);
                (raw.clone(), false)
            }
        };

        // Scene extraction
        let frames_dir = self.config.frames_dir(&item.code);
        let frames = match extract_frames(&video_path, &frames_dir, &self.config.scenes).await {
            Ok(frames) => frames,
            Err(fvec_media::MediaError::NoFrames) => {
                return Err(PipelineError::NoFrames(item.code.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        debug!("{} extracted {} frames", item, frames.len());

        // Perceptual dedup
        let frames = remove_duplicates(frames, &self.config.dedupe).await?;
        if frames.is_empty() {
            return Err(PipelineError::NoFrames(item.code.clone()));
        }
        let frame_count = frames.len();

        // Embed
        let paths: Vec<&std::path::Path> = frames.iter().map(|f| f.path.as_path()).collect();
        let vectors = self.encoder.encode(&paths).await?;

        // Upsert with deterministic IDs
        let points: Vec<VectorPoint> = frames
            .iter()
            .zip(vectors)
            .map(|(frame, vector)| {
                VectorPoint::new(&item.platform, &item.code, frame.index, frame.second, vector)
            })
            .collect();
        let embedded_count = self.vectors.upsert(&points, true).await?;

        // Frame upload is fire-and-forget; its failures never fail the item.
        self.store
            .upload_frames_async(frames, &item.platform, &item.code);

        info!(
            "{} done: {} frames, {} vectors",
            item, frame_count, embedded_count
        );

        Ok(ProcessResult {
            outcome: ItemOutcome::Done,
            downloaded: true,
            cropped,
            frame_count,
            embedded_count,
            upload_dispatched: true,
            error: None,
        })
    }

    fn cropped_path(&self, code: &str) -> PathBuf {
        self.config
            .videos_dir()
            .join("cropped")
            .join(format!("{}.mp4", code))
    }

    /// Vector-store handle, shared with the driver for verification.
    pub fn vectors(&self) -> &VectorStore {
        &self.vectors
    }
}
