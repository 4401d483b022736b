//! Application state.

use std::sync::Arc;

use fvec_db::MetadataStore;
use fvec_encoder::EncoderClient;
use fvec_storage::ObjectStore;
use fvec_vector::VectorStore;

use crate::config::ApiConfig;
use crate::registry::JobRegistry;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub registry: Arc<JobRegistry>,
    pub store: ObjectStore,
    pub vectors: VectorStore,
    pub encoder: EncoderClient,
    pub db: Option<MetadataStore>,
}

impl AppState {
    /// Create new application state from the environment.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let store = ObjectStore::from_env().await?;
        let vectors = VectorStore::from_env()?;
        let encoder = EncoderClient::from_env()?;

        // Flag flips and error records are skipped without a database.
        let db = match std::env::var("DATABASE_URL") {
            Ok(_) => Some(MetadataStore::from_env().await?),
            Err(_) => {
                tracing::warn!("DATABASE_URL not set; metadata flags will not be updated");
                None
            }
        };

        let registry = Arc::new(JobRegistry::new(config.pipeline.max_parallel_jobs));

        Ok(Self {
            config: Arc::new(config),
            registry,
            store,
            vectors,
            encoder,
            db,
        })
    }
}
