//! Batch pipeline binary.
//!
//! With `JOB_INPUT` set to a JSON array of `{platform, code}` items the run
//! is scoped to those items; otherwise the metadata store's pending backlog
//! is drained from the last checkpoint. Each completed item is announced on
//! stdout as a `{"item_done": N}` beacon for supervising processes.
//!
//! Exit codes: 0 all items succeeded or were cleanly skipped, 1 any item
//! finally failed, 2 configuration error.

use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fvec_db::MetadataStore;
use fvec_encoder::EncoderClient;
use fvec_models::WorkItem;
use fvec_pipeline::{beacon, BatchDriver, DriverEvent, PipelineConfig, VideoPipeline};
use fvec_storage::ObjectStore;
use fvec_vector::VectorStore;

const EXIT_CONFIG: i32 = 2;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);
    let env_filter = EnvFilter::from_default_env().add_directive("fvec=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    }

    info!("starting fvec-pipeline");
    let config = PipelineConfig::from_env();

    let items: Option<Vec<WorkItem>> = match std::env::var("JOB_INPUT") {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(items) => Some(items),
            Err(e) => {
                error!("invalid JOB_INPUT: {}", e);
                std::process::exit(EXIT_CONFIG);
            }
        },
        Err(_) => None,
    };

    let store = match ObjectStore::from_env().await {
        Ok(s) => s,
        Err(e) => {
            error!("object store configuration failed: {}", e);
            std::process::exit(EXIT_CONFIG);
        }
    };
    let vectors = match VectorStore::from_env() {
        Ok(v) => v,
        Err(e) => {
            error!("vector store configuration failed: {}", e);
            std::process::exit(EXIT_CONFIG);
        }
    };
    let encoder = match EncoderClient::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("encoder configuration failed: {}", e);
            std::process::exit(EXIT_CONFIG);
        }
    };

    // The metadata store is mandatory for backlog runs; item runs degrade
    // to log-only when it is absent.
    let db = match std::env::var("DATABASE_URL") {
        Ok(_) => match MetadataStore::from_env().await {
            Ok(db) => Some(db),
            Err(e) => {
                error!("metadata store connection failed: {}", e);
                std::process::exit(EXIT_CONFIG);
            }
        },
        Err(_) if items.is_some() => {
            info!("DATABASE_URL not set; flag flips and error records disabled");
            None
        }
        Err(_) => {
            error!("DATABASE_URL is required for backlog runs");
            std::process::exit(EXIT_CONFIG);
        }
    };

    let pipeline = VideoPipeline::new(config.clone(), store, vectors, encoder);

    let (tx, mut rx) = mpsc::unbounded_channel::<DriverEvent>();
    let beacon_pump = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let DriverEvent::ItemDone { processed, .. } = event {
                println!("{}", beacon(processed));
            }
        }
    });

    let driver = BatchDriver::new(config, pipeline, db).with_events(tx);

    let result = match items {
        Some(items) => driver.run_items(items).await,
        None => driver.run_backlog().await,
    };

    let code = match result {
        Ok(summary) => {
            for failed in &summary.failed {
                error!(
                    "{} failed: {} ({})",
                    failed.item, failed.message, failed.kind
                );
            }
            summary.exit_code()
        }
        Err(e) => {
            error!("driver aborted: {}", e);
            match e {
                fvec_pipeline::PipelineError::Config(_) => EXIT_CONFIG,
                _ => 1,
            }
        }
    };

    drop(driver);
    let _ = beacon_pump.await;
    std::process::exit(code);
}
