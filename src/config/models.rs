use crate::humanize::{ByteSize, HumanDuration};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub limiter: LimiterConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Upper bound on request body size
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: ByteSize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5000))
}

fn default_max_body_bytes() -> ByteSize {
    ByteSize(5 * 1024 * 1024) // 5 MB
}

/// On-disk locations
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Finished audio files waiting to be downloaded
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Parent of the per-request workspaces
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,
    #[serde(default = "default_stats_file")]
    pub stats_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            workspace_root: default_workspace_root(),
            session_file: default_session_file(),
            stats_file: default_stats_file(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from("data/tmp")
}

fn default_session_file() -> PathBuf {
    PathBuf::from("data/session.bin")
}

fn default_stats_file() -> PathBuf {
    PathBuf::from("data/stats.json")
}

/// Sliding-window rate budget for remote fetches
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimiterConfig {
    #[serde(default = "default_window")]
    pub window: HumanDuration,
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            max_requests: default_max_requests(),
        }
    }
}

fn default_window() -> HumanDuration {
    HumanDuration::from_secs(3600)
}

fn default_max_requests() -> usize {
    50
}

/// Retry policy for delivery attempts
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each further failure
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff: HumanDuration,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff: default_initial_backoff(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> HumanDuration {
    HumanDuration::from_secs(5)
}

/// Transcoder invocation
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractorConfig {
    #[serde(default = "default_extractor_program")]
    pub program: String,
    #[serde(default = "default_extractor_timeout")]
    pub timeout: HumanDuration,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            program: default_extractor_program(),
            timeout: default_extractor_timeout(),
        }
    }
}

fn default_extractor_program() -> String {
    "ffmpeg".to_string()
}

fn default_extractor_timeout() -> HumanDuration {
    HumanDuration::from_secs(120)
}

/// External downloader used by [`crate::provider::CommandProvider`]
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_program")]
    pub program: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_provider_timeout")]
    pub timeout: HumanDuration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            program: default_provider_program(),
            base_url: default_base_url(),
            timeout: default_provider_timeout(),
        }
    }
}

fn default_provider_program() -> String {
    "yt-dlp".to_string()
}

fn default_base_url() -> String {
    "https://www.instagram.com".to_string()
}

fn default_provider_timeout() -> HumanDuration {
    HumanDuration::from_secs(300)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:5000");
        assert_eq!(config.server.max_body_bytes.as_u64(), 5 * 1024 * 1024);
        assert_eq!(config.limiter.window.0, Duration::from_secs(3600));
        assert_eq!(config.limiter.max_requests, 50);
        assert_eq!(config.retrieval.max_attempts, 3);
        assert_eq!(config.retrieval.initial_backoff.0, Duration::from_secs(5));
        assert_eq!(config.extractor.program, "ffmpeg");
        assert_eq!(config.extractor.timeout.0, Duration::from_secs(120));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
[limiter]
max_requests = 10

[extractor]
timeout = "30s"
            "#,
        )
        .unwrap();

        assert_eq!(config.limiter.max_requests, 10);
        assert_eq!(config.limiter.window.0, Duration::from_secs(3600));
        assert_eq!(config.extractor.timeout.0, Duration::from_secs(30));
        assert_eq!(config.storage.output_dir, PathBuf::from("downloads"));
        assert_eq!(config.storage.workspace_root, PathBuf::from("data/tmp"));
    }
}
