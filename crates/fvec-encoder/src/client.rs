//! Encoder service HTTP client.

use std::path::Path;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{EncoderError, EncoderResult};

/// Configuration for the encoder client.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Base URL of the encoder service
    pub base_url: String,
    /// Images per request, bounding GPU memory on the service side
    pub batch_size: usize,
    /// Target vector dimension; longer outputs are truncated
    pub dim: usize,
    /// Request timeout
    pub timeout: Duration,
}

impl EncoderConfig {
    /// Create config from environment variables.
    pub fn from_env() -> EncoderResult<Self> {
        Ok(Self {
            base_url: std::env::var("ENCODER_URL")
                .map_err(|_| EncoderError::config_error("ENCODER_URL not set"))?,
            batch_size: std::env::var("VP_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8),
            dim: std::env::var("QDRANT_DIM")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(512),
            timeout: Duration::from_secs(
                std::env::var("ENCODER_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
        })
    }
}

#[derive(Debug, Serialize)]
struct EncodeRequest {
    images: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EncodeResponse {
    vectors: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

/// Client for the external encoder service.
#[derive(Clone)]
pub struct EncoderClient {
    http: Client,
    config: EncoderConfig,
}

impl EncoderClient {
    /// Create a new encoder client.
    pub fn new(config: EncoderConfig) -> EncoderResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(EncoderError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> EncoderResult<Self> {
        Self::new(EncoderConfig::from_env()?)
    }

    /// Target vector dimension.
    pub fn dim(&self) -> usize {
        self.config.dim
    }

    /// Encode image files into vectors, preserving input order.
    ///
    /// Files are read and sent in batches of the configured size; each
    /// returned vector is truncated to the first `dim` components. Any
    /// failure aborts the whole call; partial output is never returned.
    pub async fn encode(&self, paths: &[impl AsRef<Path>]) -> EncoderResult<Vec<Vec<f32>>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }

        let mut vectors = Vec::with_capacity(paths.len());

        for chunk in paths.chunks(self.config.batch_size.max(1)) {
            let mut images = Vec::with_capacity(chunk.len());
            for path in chunk {
                let bytes = tokio::fs::read(path.as_ref()).await?;
                images.push(BASE64.encode(bytes));
            }

            let batch = self.encode_batch(images).await?;
            if batch.len() != chunk.len() {
                return Err(EncoderError::CountMismatch {
                    expected: chunk.len(),
                    got: batch.len(),
                });
            }

            vectors.extend(
                batch
                    .into_iter()
                    .map(|mut v| {
                        v.truncate(self.config.dim);
                        v
                    }),
            );
        }

        debug!("encoded {} images", vectors.len());
        Ok(vectors)
    }

    async fn encode_batch(&self, images: Vec<String>) -> EncoderResult<Vec<Vec<f32>>> {
        let url = format!("{}/encode", self.config.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .json(&EncodeRequest { images })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(EncoderError::RequestFailed { status, body });
        }

        let parsed: EncodeResponse = response.json().await?;
        Ok(parsed.vectors)
    }

    /// Check if the encoder service is healthy.
    pub async fn health_check(&self) -> EncoderResult<bool> {
        let url = format!("{}/health", self.config.base_url.trim_end_matches('/'));

        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                let health: HealthResponse = response.json().await?;
                Ok(health.status == "healthy" || health.status == "ok")
            }
            Ok(response) => {
                warn!("encoder health check failed: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("encoder health check error: {}", e);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(url: &str, batch_size: usize, dim: usize) -> EncoderClient {
        EncoderClient::new(EncoderConfig {
            base_url: url.to_string(),
            batch_size,
            dim,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    async fn write_images(dir: &tempfile::TempDir, n: usize) -> Vec<std::path::PathBuf> {
        let mut paths = Vec::new();
        for i in 0..n {
            let p = dir.path().join(format!("{}_0.50.png", i + 1));
            tokio::fs::write(&p, vec![i as u8; 16]).await.unwrap();
            paths.push(p);
        }
        paths
    }

    #[tokio::test]
    async fn test_encode_truncates_and_preserves_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/encode"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "vectors": [[1.0, 1.1, 1.2, 1.3], [2.0, 2.1, 2.2, 2.3]]
            })))
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let paths = write_images(&dir, 2).await;

        let vectors = client(&server.uri(), 8, 2).encode(&paths).await.unwrap();
        assert_eq!(vectors, vec![vec![1.0, 1.1], vec![2.0, 2.1]]);
    }

    #[tokio::test]
    async fn test_encode_batches_requests() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/encode"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "vectors": [[0.5], [0.5]]
            })))
            .expect(2)
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let paths = write_images(&dir, 4).await;

        let vectors = client(&server.uri(), 2, 1).encode(&paths).await.unwrap();
        assert_eq!(vectors.len(), 4);
    }

    #[tokio::test]
    async fn test_encode_aborts_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/encode"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let paths = write_images(&dir, 1).await;

        let err = client(&server.uri(), 8, 4).encode(&paths).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_count_mismatch_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/encode"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"vectors": [[0.1]]})))
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let paths = write_images(&dir, 2).await;

        let err = client(&server.uri(), 8, 4).encode(&paths).await.unwrap_err();
        assert!(matches!(err, EncoderError::CountMismatch { expected: 2, got: 1 }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_empty_input_short_circuits() {
        let server = MockServer::start().await;
        let paths: Vec<std::path::PathBuf> = Vec::new();
        let vectors = client(&server.uri(), 8, 4).encode(&paths).await.unwrap();
        assert!(vectors.is_empty());
    }
}
