//! Worker process entrypoint. Grounded on
//! `video_audio_extracts/crates/orchestrator/src/main.rs`'s
//! `#[tokio::main]`/`tracing_subscriber::fmt().init()`/exit-code shape,
//! adapted to a long-running poll loop instead of a single job run.

use std::sync::Arc;

use docflow_storage::{MetadataStorage, ObjectStorage, PostgresMetadataStorage, S3ObjectStorage};
use docflow_worker::{Config, Worker};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Docflow Document Processing Worker v{}", env!("CARGO_PKG_VERSION"));

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        worker_id = %config.worker_id,
        poll_interval_secs = config.poll_interval_secs,
        pipeline_version = %config.pipeline_version,
        ocr_dpi_initial = config.ocr_dpi_initial,
        ocr_dpi_rerun = config.ocr_dpi_rerun,
        "configuration loaded"
    );

    let metadata: Arc<dyn MetadataStorage> = match PostgresMetadataStorage::new(config.postgres_config()).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!("failed to connect to the metadata store: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = metadata.init_schema().await {
        tracing::error!("failed to initialize schema: {e}");
        std::process::exit(1);
    }

    let objects: Arc<dyn ObjectStorage> = match S3ObjectStorage::new(config.s3_config()).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!("failed to initialize object storage: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!("worker started, polling for jobs (press Ctrl+C to stop)");

    let worker = Worker::new(metadata, objects, config);
    let processed = worker.run().await;

    tracing::info!(jobs_processed = processed, "worker stopped");
    std::process::exit(0);
}
