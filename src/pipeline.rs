//! Request pipeline: workspace → retrieval → extraction → stats.
//!
//! The controller owns every shared service (limiter, session store, stats,
//! metrics) so nothing lives in process globals. Each `run` gets its own
//! workspace, which is removed on every exit path.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::Config;
use crate::extractor::{AudioArtifact, AudioExtractor, ExtractionError};
use crate::limiter::RateLimiter;
use crate::naming::{Locator, LocatorError, output_filename};
use crate::observability::Metrics;
use crate::provider::ContentProvider;
use crate::retrieval::{FetchOutcome, RetrievalError, RetrievalOrchestrator, RetryPolicy};
use crate::session::SessionStore;
use crate::stats::StatsCounter;
use crate::storage::OutputStore;
use crate::workspace::Workspace;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] LocatorError),

    #[error("failed to allocate workspace: {0}")]
    Workspace(#[source] io::Error),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

#[derive(Debug)]
pub enum PipelineOutcome {
    Served(AudioArtifact),
    NotAVideo,
}

/// Lifecycle of one request, logged as it advances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    WorkspaceAllocated,
    Fetching,
    Fetched,
    Extracting,
    Served,
    NotAVideo,
    Failed,
    Cleaned,
}

fn transition(request_id: Uuid, from: Stage, to: Stage) -> Stage {
    debug!(request = %request_id, ?from, ?to, "Pipeline stage");
    to
}

pub struct PipelineController {
    retrieval: RetrievalOrchestrator,
    extractor: AudioExtractor,
    stats: StatsCounter,
    output: OutputStore,
    workspace_root: PathBuf,
    metrics: Metrics,
}

impl PipelineController {
    /// Wires the pipeline from configuration; creates the output directory
    pub fn new(
        config: &Config,
        provider: Arc<dyn ContentProvider>,
        clock: Arc<dyn Clock>,
    ) -> io::Result<Self> {
        let limiter = Arc::new(RateLimiter::from_config(&config.limiter, clock.clone()));
        let retrieval = RetrievalOrchestrator::new(
            provider,
            limiter,
            SessionStore::new(&config.storage.session_file),
            clock,
            RetryPolicy::from_config(&config.retrieval),
        );

        Ok(Self {
            retrieval,
            extractor: AudioExtractor::from_config(&config.extractor),
            stats: StatsCounter::open(&config.storage.stats_file),
            output: OutputStore::open(&config.storage.output_dir)?,
            workspace_root: config.storage.workspace_root.clone(),
            metrics: Metrics::new(),
        })
    }

    pub fn stats(&self) -> &StatsCounter {
        &self.stats
    }

    pub fn output(&self) -> &OutputStore {
        &self.output
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn extractor(&self) -> &AudioExtractor {
        &self.extractor
    }

    pub fn limiter(&self) -> &RateLimiter {
        self.retrieval.limiter()
    }

    /// Runs one request end to end
    pub async fn run(&self, url: &str) -> Result<PipelineOutcome, PipelineError> {
        self.metrics.run_started();

        let result = self.run_request(url).await;
        match &result {
            Ok(PipelineOutcome::Served(_)) => self.metrics.run_served(),
            Ok(PipelineOutcome::NotAVideo) => self.metrics.run_not_video(),
            Err(PipelineError::Retrieval(RetrievalError::RateLimited { .. })) => {
                self.metrics.rate_limited();
                self.metrics.run_failed();
            }
            Err(_) => self.metrics.run_failed(),
        }
        result
    }

    async fn run_request(&self, url: &str) -> Result<PipelineOutcome, PipelineError> {
        let locator = Locator::parse(url)?;

        let workspace = Workspace::allocate(&self.workspace_root).map_err(|e| {
            warn!(root = %self.workspace_root.display(), error = %e, "Failed to allocate workspace");
            PipelineError::Workspace(e)
        })?;
        let request_id = workspace.id();
        transition(request_id, Stage::Idle, Stage::WorkspaceAllocated);

        let span = info_span!("pipeline", request = %request_id, %locator);
        let result = self.process(&locator, &workspace).instrument(span).await;

        let terminal = match &result {
            Ok(PipelineOutcome::Served(_)) => Stage::Served,
            Ok(PipelineOutcome::NotAVideo) => Stage::NotAVideo,
            Err(e) => {
                warn!(request = %request_id, error = %e, "Pipeline failed");
                Stage::Failed
            }
        };

        // A panic above still removes the directory through Workspace::drop
        if let Err(e) = workspace.cleanup() {
            warn!(request = %request_id, error = %e, "Failed to remove workspace");
        }
        transition(request_id, terminal, Stage::Cleaned);

        result
    }

    async fn process(
        &self,
        locator: &Locator,
        workspace: &Workspace,
    ) -> Result<PipelineOutcome, PipelineError> {
        let request_id = workspace.id();
        let stage = transition(request_id, Stage::WorkspaceAllocated, Stage::Fetching);

        let media = match self.retrieval.fetch(locator, workspace).await? {
            FetchOutcome::NotAVideo => return Ok(PipelineOutcome::NotAVideo),
            FetchOutcome::Fetched(media) => media,
        };
        let stage = transition(request_id, stage, Stage::Fetched);

        // Captions made only of emoji or punctuation name nothing
        let title = media
            .title
            .as_deref()
            .filter(|t| t.chars().any(|c| c.is_ascii_alphanumeric()))
            .unwrap_or(&locator.token);
        let destination = self.output.path_for(&output_filename(title, request_id));

        transition(request_id, stage, Stage::Extracting);
        let audio = self.extractor.extract(&media, &destination).await?;

        let downloads = self.stats.increment();
        info!(filename = %audio.filename, size = audio.size, downloads, "Audio ready");

        Ok(PipelineOutcome::Served(audio))
    }
}
