//! Logging setup and process-local pipeline counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

/// Installs the global fmt subscriber; `RUST_LOG` overrides the `info` default
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Counters for pipeline outcomes
#[derive(Debug, Default)]
pub struct Metrics {
    runs_started: AtomicU64,
    runs_served: AtomicU64,
    runs_not_video: AtomicU64,
    runs_failed: AtomicU64,
    rate_limited: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "runs_started", "Metric incremented");
    }

    pub fn run_served(&self) {
        self.runs_served.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "runs_served", "Metric incremented");
    }

    pub fn run_not_video(&self) {
        self.runs_not_video.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "runs_not_video", "Metric incremented");
    }

    pub fn run_failed(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "runs_failed", "Metric incremented");
    }

    pub fn rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "rate_limited", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_served: self.runs_served.load(Ordering::Relaxed),
            runs_not_video: self.runs_not_video.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub runs_started: u64,
    pub runs_served: u64,
    pub runs_not_video: u64,
    pub runs_failed: u64,
    pub rate_limited: u64,
}
