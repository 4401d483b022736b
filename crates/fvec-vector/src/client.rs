//! Vector-database HTTP client.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, info};

use fvec_models::VectorPoint;

use crate::error::{VectorError, VectorResult};
use crate::types::{
    ApiResponse, CountRequest, CountResult, CreateCollectionRequest, CreateIndexRequest, Filter,
    PointStruct, ScrollRequest, ScrollResult, ScrolledPoint, UpsertRequest, VectorParams,
};

/// Configuration for the vector-store client.
#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    /// Base URL of the vector database
    pub url: String,
    /// API key, sent as the `api-key` header when present
    pub api_key: Option<String>,
    /// Collection holding frame vectors
    pub collection: String,
    /// Vector dimension
    pub dim: usize,
    /// Points per upsert request
    pub upsert_batch: usize,
    /// Request timeout
    pub timeout: Duration,
}

impl VectorStoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> VectorResult<Self> {
        Ok(Self {
            url: std::env::var("QDRANT_URL")
                .map_err(|_| VectorError::config_error("QDRANT_URL not set"))?,
            api_key: std::env::var("QDRANT_KEY").ok().filter(|s| !s.is_empty()),
            collection: std::env::var("QDRANT_COLLECTION")
                .unwrap_or_else(|_| "watched_frames".to_string()),
            dim: std::env::var("QDRANT_DIM")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(512),
            upsert_batch: std::env::var("QDRANT_UPSERT_BATCH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(256),
            timeout: Duration::from_secs(
                std::env::var("HTTP_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(15),
            ),
        })
    }
}

/// Client for the vector database's REST API.
#[derive(Clone)]
pub struct VectorStore {
    http: Client,
    config: VectorStoreConfig,
}

impl VectorStore {
    /// Create a new client.
    pub fn new(config: VectorStoreConfig) -> VectorResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(VectorError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> VectorResult<Self> {
        Self::new(VectorStoreConfig::from_env()?)
    }

    /// Collection this store writes to.
    pub fn collection(&self) -> &str {
        &self.config.collection
    }

    /// Configured vector dimension.
    pub fn dim(&self) -> usize {
        self.config.dim
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.url.trim_end_matches('/'), path)
    }

    fn with_key(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.config.api_key {
            Some(key) => req.header("api-key", key),
            None => req,
        }
    }

    async fn check(&self, response: Response) -> VectorResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(VectorError::RequestFailed {
            status: status.as_u16(),
            body,
        })
    }

    /// True when the collection already exists.
    pub async fn collection_exists(&self, name: &str) -> VectorResult<bool> {
        let url = self.url(&format!("collections/{}", name));
        let response = self.with_key(self.http.get(&url)).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            s => {
                let body = response.text().await.unwrap_or_default();
                Err(VectorError::RequestFailed {
                    status: s.as_u16(),
                    body,
                })
            }
        }
    }

    /// Create the collection and its payload indexes iff they don't exist.
    ///
    /// Indexed fields: `video_code` (keyword), `platform` (keyword),
    /// `frame_number` (integer).
    pub async fn ensure_collection(&self) -> VectorResult<()> {
        let name = self.config.collection.clone();

        if !self.collection_exists(&name).await? {
            info!("creating collection '{}' (dim {})", name, self.config.dim);
            let url = self.url(&format!("collections/{}", name));
            let body = CreateCollectionRequest {
                vectors: VectorParams {
                    size: self.config.dim,
                    distance: "Cosine",
                },
            };
            let response = self.with_key(self.http.put(&url)).json(&body).send().await?;
            self.check(response).await?;
        }

        for (field, schema) in [
            ("video_code", "keyword"),
            ("platform", "keyword"),
            ("frame_number", "integer"),
        ] {
            self.ensure_index(&name, field, schema).await?;
        }

        Ok(())
    }

    /// Create one payload index; an already-existing index is not an error.
    async fn ensure_index(&self, collection: &str, field: &str, schema: &'static str) -> VectorResult<()> {
        let url = self.url(&format!("collections/{}/index", collection));
        let body = CreateIndexRequest {
            field_name: field.to_string(),
            field_schema: schema,
        };

        let response = self.with_key(self.http.put(&url)).json(&body).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        if text.contains("already exists") {
            debug!("index on {} already present", field);
            return Ok(());
        }
        Err(VectorError::RequestFailed {
            status: status.as_u16(),
            body: text,
        })
    }

    /// Upsert points in capped batches; blocks until acknowledged.
    ///
    /// Point IDs are caller-supplied UUIDv5 values, so repeating the call is
    /// idempotent.
    pub async fn upsert(&self, points: &[VectorPoint], wait: bool) -> VectorResult<usize> {
        if points.is_empty() {
            return Ok(0);
        }

        let mut pushed = 0usize;
        for chunk in points.chunks(self.config.upsert_batch.max(1)) {
            let url = format!(
                "{}?wait={}",
                self.url(&format!("collections/{}/points", self.config.collection)),
                wait
            );
            let body = UpsertRequest {
                points: chunk.iter().map(PointStruct::from).collect(),
            };
            let response = self.with_key(self.http.put(&url)).json(&body).send().await?;
            self.check(response).await?;
            pushed += chunk.len();
        }

        debug!("upserted {}/{} points", pushed, points.len());
        Ok(pushed)
    }

    /// Count points whose payload `video_code` equals `code`.
    pub async fn count_by_code(&self, code: &str) -> VectorResult<u64> {
        let url = self.url(&format!(
            "collections/{}/points/count",
            self.config.collection
        ));
        let body = CountRequest {
            filter: Filter::by_field("video_code", code),
            exact: true,
        };

        let response = self.with_key(self.http.post(&url)).json(&body).send().await?;
        let response = self.check(response).await?;
        let parsed: ApiResponse<CountResult> = response.json().await?;
        Ok(parsed.result.count)
    }

    /// Scroll a page of points from `collection`. Migration use only.
    pub async fn scroll(
        &self,
        collection: &str,
        filter: Option<Filter>,
        limit: usize,
        offset: Option<Value>,
    ) -> VectorResult<(Vec<ScrolledPoint>, Option<Value>)> {
        let url = self.url(&format!("collections/{}/points/scroll", collection));
        let body = ScrollRequest {
            limit,
            offset,
            filter,
            with_payload: true,
            with_vector: true,
        };

        let response = self.with_key(self.http.post(&url)).json(&body).send().await?;
        let response = self.check(response).await?;
        let parsed: ApiResponse<ScrollResult> = response.json().await?;
        Ok((parsed.result.points, parsed.result.next_page_offset))
    }

    /// Raw upsert of pre-built wire points (used by the migration shim).
    pub(crate) async fn upsert_raw(&self, points: Vec<PointStruct>) -> VectorResult<()> {
        if points.is_empty() {
            return Ok(());
        }
        let url = format!(
            "{}?wait=true",
            self.url(&format!("collections/{}/points", self.config.collection))
        );
        let response = self
            .with_key(self.http.put(&url))
            .json(&UpsertRequest { points })
            .send()
            .await?;
        self.check(response).await?;
        Ok(())
    }

    /// Connectivity probe for readiness checks.
    pub async fn check_connectivity(&self) -> VectorResult<()> {
        let url = self.url("collections");
        let response = self.with_key(self.http.get(&url)).send().await?;
        self.check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(url: &str) -> VectorStore {
        VectorStore::new(VectorStoreConfig {
            url: url.to_string(),
            api_key: Some("secret".into()),
            collection: "watched_frames".into(),
            dim: 512,
            upsert_batch: 2,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_count_by_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collections/watched_frames/points/count"))
            .and(body_partial_json(json!({
                "filter": {"must": [{"key": "video_code", "match": {"value": "ABC123"}}]},
                "exact": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {"count": 3}, "status": "ok", "time": 0.001
            })))
            .mount(&server)
            .await;

        let count = store(&server.uri()).count_by_code("ABC123").await.unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_upsert_batches() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/collections/watched_frames/points"))
            .and(query_param("wait", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {"operation_id": 1, "status": "completed"}, "status": "ok", "time": 0.001
            })))
            .expect(2)
            .mount(&server)
            .await;

        let points: Vec<_> = (1..=3)
            .map(|i| fvec_models::VectorPoint::new("instagram", "ABC123", i, i as f64, vec![0.0; 4]))
            .collect();

        let pushed = store(&server.uri()).upsert(&points, true).await.unwrap();
        assert_eq!(pushed, 3);
    }

    #[tokio::test]
    async fn test_ensure_collection_creates_on_404() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections/watched_frames"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/collections/watched_frames"))
            .and(body_partial_json(json!({
                "vectors": {"size": 512, "distance": "Cosine"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": true, "status": "ok", "time": 0.001
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/collections/watched_frames/index"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {"status": "acknowledged"}, "status": "ok", "time": 0.001
            })))
            .expect(3)
            .mount(&server)
            .await;

        store(&server.uri()).ensure_collection().await.unwrap();
    }

    #[tokio::test]
    async fn test_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collections/watched_frames/points/count"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = store(&server.uri()).count_by_code("X").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
