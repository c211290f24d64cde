//! API models for the download, serve and stats endpoints.
//!
//! ```json
//! POST /download  {"url": "https://www.instagram.com/reel/Cx1abc/"}
//!
//! 200 {"status": "ready", "filename": "Sunset_run_<id>.mp3", "download_url": "/serve/Sunset_run_<id>.mp3", "size": 48213}
//! 200 {"status": "not_a_video", "message": "..."}
//! ```

use serde::{Deserialize, Serialize};

use crate::observability::MetricsSnapshot;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DownloadRequest {
    #[serde(default)]
    pub url: String,
}

/// Successful pipeline outcome; "not a video" is a normal answer, not an error
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DownloadResponse {
    Ready {
        filename: String,
        download_url: String,
        size: u64,
    },
    NotAVideo {
        message: String,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StatsResponse {
    pub downloads: u64,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
    pub rate_limit: RateLimitStatus,
    pub runs: MetricsSnapshotBody,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RateLimitStatus {
    pub used: usize,
    pub capacity: usize,
    pub retry_after_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MetricsSnapshotBody {
    pub started: u64,
    pub served: u64,
    pub not_video: u64,
    pub failed: u64,
    pub rate_limited: u64,
}

impl From<MetricsSnapshot> for MetricsSnapshotBody {
    fn from(value: MetricsSnapshot) -> Self {
        Self {
            started: value.runs_started,
            served: value.runs_served,
            not_video: value.runs_not_video,
            failed: value.runs_failed,
            rate_limited: value.rate_limited,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HealthResponse {
    pub status: String,
    pub transcoder: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}
