pub mod processor;
pub mod schema;
pub mod storage;
pub mod utils;

use common::Result;
use common::config::Settings;
use processor::{EtlProcessor, EtlSummary};
use storage::StorageManager;
use tracing::info;

/// Runs the complete song-play ETL with settings loaded from `config_path`.
pub async fn run_etl_pipeline(config_path: &str) -> Result<EtlSummary> {
    let settings = Settings::new(config_path)?;
    run_with_settings(&settings).await
}

pub async fn run_with_settings(settings: &Settings) -> Result<EtlSummary> {
    info!(
        input = %settings.input.url,
        output = %settings.output.url,
        target_partitions = settings.engine.target_partitions,
        "Starting ETL run"
    );
    let storage = StorageManager::new(settings.storage.clone());
    EtlProcessor::new(settings, &storage)?.run().await
}
