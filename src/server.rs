use std::net::SocketAddr;
use std::sync::Arc;

use reelaudio::api::{self, AppState};
use reelaudio::clock::SystemClock;
use reelaudio::config::Config;
use reelaudio::pipeline::PipelineController;
use reelaudio::provider::CommandProvider;
use tracing::info;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Wires the pipeline with the production provider and clock
pub fn build_pipeline(config: &Config) -> Result<PipelineController, AnyError> {
    let provider = Arc::new(CommandProvider::from_config(&config.provider));
    let pipeline = PipelineController::new(config, provider, Arc::new(SystemClock))
        .map_err(|e| format!("Failed to open output directory: {}", e))?;

    if pipeline.extractor().locate_tool().is_none() {
        tracing::warn!(
            program = %config.extractor.program,
            "Transcoder not found; downloads will fail until it is installed"
        );
    }
    Ok(pipeline)
}

pub async fn run(config: Config, address: Option<SocketAddr>) -> Result<(), AnyError> {
    let address = address.unwrap_or(config.server.bind_addr);
    let pipeline = build_pipeline(&config)?;

    info!(
        output = %config.storage.output_dir.display(),
        limit = config.limiter.max_requests,
        "Starting server"
    );
    api::run(address, AppState::new(config, pipeline)).await
}
