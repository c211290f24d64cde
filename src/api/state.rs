use std::sync::Arc;

use crate::config::Config;
use crate::pipeline::PipelineController;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Arc<PipelineController>,
}

impl AppState {
    pub fn new(config: Config, pipeline: PipelineController) -> Self {
        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
        }
    }
}
