//! S3 client implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use fvec_models::Frame;

use crate::error::{StorageError, StorageResult};

/// Configuration for the object store.
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    /// AWS region
    pub region: String,
    /// Bucket holding raw videos
    pub videos_bucket: String,
    /// Bucket receiving frame PNGs
    pub frames_bucket: String,
    /// Custom endpoint (MinIO, R2, localstack); empty uses AWS
    pub endpoint_url: Option<String>,
    /// Static credentials; unsigned public access when absent
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    /// Concurrent uploads in the background frame-upload task
    pub max_upload_workers: usize,
}

impl ObjectStoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            region: std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            videos_bucket: std::env::var("S3_VIDEOS_BUCKET")
                .map_err(|_| StorageError::config_error("S3_VIDEOS_BUCKET not set"))?,
            frames_bucket: std::env::var("S3_FRAMES_BUCKET")
                .map_err(|_| StorageError::config_error("S3_FRAMES_BUCKET not set"))?,
            endpoint_url: std::env::var("S3_ENDPOINT_URL").ok(),
            access_key_id: std::env::var("AWS_ACCESS_KEY_ID").ok().filter(|s| !s.is_empty()),
            secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY")
                .ok()
                .filter(|s| !s.is_empty()),
            session_token: std::env::var("AWS_SESSION_TOKEN").ok().filter(|s| !s.is_empty()),
            max_upload_workers: std::env::var("VP_MAX_WORKERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(4),
        })
    }

    fn has_credentials(&self) -> bool {
        self.access_key_id.is_some() && self.secret_access_key.is_some()
    }
}

/// S3 object-store client.
///
/// Cheap to clone; the inner SDK client is shared.
#[derive(Clone)]
pub struct ObjectStore {
    client: Client,
    videos_bucket: String,
    frames_bucket: String,
    upload_slots: Arc<Semaphore>,
    max_upload_workers: usize,
}

impl ObjectStore {
    /// Create a new client from configuration.
    ///
    /// Signed access when static credentials are configured, anonymous
    /// (unsigned) access otherwise.
    pub async fn new(config: ObjectStoreConfig) -> StorageResult<Self> {
        let loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        let loader = if config.has_credentials() {
            debug!("using signed object-store client");
            let credentials = Credentials::new(
                config.access_key_id.clone().unwrap_or_default(),
                config.secret_access_key.clone().unwrap_or_default(),
                config.session_token.clone(),
                None,
                "env",
            );
            loader.credentials_provider(credentials)
        } else {
            debug!("using unsigned object-store client");
            loader.no_credentials()
        };

        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            videos_bucket: config.videos_bucket,
            frames_bucket: config.frames_bucket,
            upload_slots: Arc::new(Semaphore::new(config.max_upload_workers.max(1))),
            max_upload_workers: config.max_upload_workers.max(1),
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        let config = ObjectStoreConfig::from_env()?;
        Self::new(config).await
    }

    /// Object key of a raw video.
    pub fn video_key(platform: &str, code: &str) -> String {
        format!("{}/{}/video.mp4", platform, code)
    }

    /// Object key of one frame PNG.
    pub fn frame_key(platform: &str, code: &str, file_name: &str) -> String {
        format!("{}/{}/{}", platform, code, file_name)
    }

    /// Download the raw video for `{platform}/{code}` into `workdir`.
    ///
    /// Returns the local path, or `None` when the object is missing or
    /// access is denied (logged at WARN, not an error). `platform ==
    /// "local"` short-circuits to `workdir/{code}.mp4`.
    pub async fn download_video(
        &self,
        platform: &str,
        code: &str,
        workdir: impl AsRef<Path>,
        overwrite: bool,
    ) -> StorageResult<Option<PathBuf>> {
        let workdir = workdir.as_ref();
        tokio::fs::create_dir_all(workdir).await?;
        let dst = workdir.join(format!("{}.mp4", code));

        if platform == "local" {
            return Ok(dst.exists().then_some(dst));
        }

        if dst.exists() && !overwrite {
            return Ok(Some(dst));
        }

        let key = Self::video_key(platform, code);
        info!("downloading s3://{}/{}", self.videos_bucket, key);

        let response = match self
            .client
            .get_object()
            .bucket(&self.videos_bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                let msg = e.to_string();
                if is_missing_or_denied(&msg) {
                    warn!("access denied or not found: {} ({})", key, msg);
                    return Ok(None);
                }
                return Err(StorageError::download_failed(msg));
            }
        };

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::download_failed(e.to_string()))?
            .into_bytes();

        tokio::fs::write(&dst, &bytes).await?;
        Ok(Some(dst))
    }

    /// Upload one frame PNG.
    pub async fn upload_frame(&self, path: &Path, key: &str) -> StorageResult<()> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.frames_bucket)
            .key(key)
            .body(body)
            .content_type("image/png")
            .acl(ObjectCannedAcl::BucketOwnerFullControl)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        Ok(())
    }

    /// Fire-and-forget upload of all `frames` under
    /// `{frames_bucket}/{platform}/{code}/`.
    ///
    /// Returns immediately; a detached task streams the files with bounded
    /// concurrency. Individual upload failures are logged and swallowed and
    /// never fail the caller's job.
    pub fn upload_frames_async(&self, frames: Vec<Frame>, platform: &str, code: &str) {
        if frames.is_empty() {
            return;
        }

        let store = self.clone();
        let platform = platform.to_string();
        let code = code.to_string();

        tokio::spawn(async move {
            let total = frames.len();
            info!(
                "uploading {} frames to s3://{}/{}/{}/",
                total, store.frames_bucket, platform, code
            );

            let mut tasks = tokio::task::JoinSet::new();
            for frame in frames {
                let store = store.clone();
                let key = Self::frame_key(
                    &platform,
                    &code,
                    &frame.path.file_name().unwrap_or_default().to_string_lossy(),
                );
                let slots = Arc::clone(&store.upload_slots);
                tasks.spawn(async move {
                    let _permit = slots.acquire_owned().await;
                    if let Err(e) = store.upload_frame(&frame.path, &key).await {
                        warn!("frame upload {} failed: {}", key, e);
                    }
                });
            }

            while tasks.join_next().await.is_some() {}
            info!("frame upload done for {}", code);
        });
    }

    /// Check connectivity by heading the frames bucket.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.frames_bucket)
            .send()
            .await
            .map_err(|e| StorageError::AwsSdk(format!("connectivity check failed: {}", e)))?;
        Ok(())
    }

    /// Configured upload concurrency.
    pub fn max_upload_workers(&self) -> usize {
        self.max_upload_workers
    }
}

/// The SDK flattens HTTP status into the error text; missing objects and
/// permission failures both mean "skip this item".
fn is_missing_or_denied(msg: &str) -> bool {
    msg.contains("NoSuchKey")
        || msg.contains("NotFound")
        || msg.contains("404")
        || msg.contains("403")
        || msg.contains("Forbidden")
        || msg.contains("AccessDenied")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys() {
        assert_eq!(
            ObjectStore::video_key("instagram", "ABC123"),
            "instagram/ABC123/video.mp4"
        );
        assert_eq!(
            ObjectStore::frame_key("instagram", "ABC123", "1_0.52.png"),
            "instagram/ABC123/1_0.52.png"
        );
    }

    #[test]
    fn test_missing_or_denied_classification() {
        assert!(is_missing_or_denied("service error: NoSuchKey"));
        assert!(is_missing_or_denied("http status 403"));
        assert!(is_missing_or_denied("AccessDenied: nope"));
        assert!(!is_missing_or_denied("connection reset by peer"));
    }

    #[test]
    fn test_config_credentials_detection() {
        let config = ObjectStoreConfig {
            region: "us-east-1".into(),
            videos_bucket: "videos".into(),
            frames_bucket: "frames".into(),
            endpoint_url: None,
            access_key_id: Some("key".into()),
            secret_access_key: None,
            session_token: None,
            max_upload_workers: 4,
        };
        assert!(!config.has_credentials());
    }
}
