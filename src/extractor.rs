//! Audio extraction through an external transcoder (ffmpeg CLI contract)

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::config::ExtractorConfig;
use crate::retrieval::MediaArtifact;

const AUDIO_CODEC: &str = "libmp3lame";
const AUDIO_BITRATE: &str = "256k";
const SAMPLE_RATE: &str = "44100";
const CHANNELS: &str = "2";
const CONTAINER: &str = "mp3";
const PARTIAL_SUFFIX: &str = ".part";

/// Why a transcoder run exited unsuccessfully
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    InputMissing,
    PermissionDenied,
    /// Exit status or other short description
    Other(String),
}

impl FailureReason {
    /// Scans the transcoder's diagnostics for recognizable causes
    fn from_stderr(stderr: &str, fallback: String) -> Self {
        if stderr.contains("No such file or directory") {
            FailureReason::InputMissing
        } else if stderr.contains("Permission denied") {
            FailureReason::PermissionDenied
        } else {
            FailureReason::Other(fallback)
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            FailureReason::InputMissing => "Input video file not found for audio extraction.",
            FailureReason::PermissionDenied => "Permission denied during audio extraction.",
            FailureReason::Other(_) => "Error during audio extraction.",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::InputMissing => f.write_str("input file missing"),
            FailureReason::PermissionDenied => f.write_str("permission denied"),
            FailureReason::Other(detail) => f.write_str(detail),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("transcoder not found: {0}")]
    ToolMissing(String),

    #[error("audio extraction timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("audio extraction failed: {0}")]
    ExtractionFailed(FailureReason),
}

/// Finished audio file in the output store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioArtifact {
    pub filename: String,
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct AudioExtractor {
    program: String,
    timeout: Duration,
}

impl AudioExtractor {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn from_config(config: &ExtractorConfig) -> Self {
        Self::new(&config.program, config.timeout.as_duration())
    }

    /// Locates the transcoder on `PATH`, or accepts an explicit file path
    pub fn locate_tool(&self) -> Option<PathBuf> {
        let program = Path::new(&self.program);
        if program.components().count() > 1 {
            return program.is_file().then(|| program.to_path_buf());
        }

        let paths = std::env::var_os("PATH")?;
        std::env::split_paths(&paths)
            .map(|dir| dir.join(program))
            .find(|candidate| candidate.is_file())
    }

    /// Transcodes `media` into `destination`.
    ///
    /// The tool writes to a `.part` sibling that is renamed into place only
    /// after a clean exit, so `destination` never holds a partial file.
    pub async fn extract(
        &self,
        media: &MediaArtifact,
        destination: &Path,
    ) -> Result<AudioArtifact, ExtractionError> {
        let tool = self.locate_tool().ok_or_else(|| {
            error!(program = %self.program, "Transcoder not found in PATH");
            ExtractionError::ToolMissing(self.program.clone())
        })?;

        let filename = destination
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                ExtractionError::ExtractionFailed(FailureReason::Other(format!(
                    "invalid destination: {}",
                    destination.display()
                )))
            })?;

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ExtractionError::ExtractionFailed(FailureReason::from_stderr(
                    &e.to_string(),
                    format!("cannot create output directory: {}", e),
                ))
            })?;
        }

        // Removed on every early return and when this future is dropped mid-run
        let partial = PartialOutput::new(destination);
        self.run(&tool, &media.path, partial.path()).await?;

        let size = match tokio::fs::metadata(partial.path()).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => meta.len(),
            _ => {
                return Err(ExtractionError::ExtractionFailed(FailureReason::Other(
                    "transcoder produced no output".to_string(),
                )));
            }
        };

        partial.commit(destination).await.map_err(|e| {
            ExtractionError::ExtractionFailed(FailureReason::Other(format!(
                "failed to finalize output: {}",
                e
            )))
        })?;

        info!(output = %destination.display(), size, "Audio extracted");
        Ok(AudioArtifact {
            filename,
            path: destination.to_path_buf(),
            size,
        })
    }

    async fn run(&self, tool: &Path, input: &Path, output: &Path) -> Result<(), ExtractionError> {
        let args = transcode_args(input, output);
        debug!(tool = %tool.display(), ?args, "Running transcoder");

        let child = Command::new(tool)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ExtractionError::ToolMissing(self.program.clone())
                } else {
                    ExtractionError::ExtractionFailed(FailureReason::from_stderr(
                        &e.to_string(),
                        format!("failed to start transcoder: {}", e),
                    ))
                }
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ExtractionError::ExtractionFailed(FailureReason::Other(
                    e.to_string(),
                )));
            }
            Err(_) => {
                // Dropping the wait future kills the child
                warn!(timeout = ?self.timeout, input = %input.display(), "Transcoder timed out");
                return Err(ExtractionError::Timeout(self.timeout));
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            error!(status = %output.status, stderr = %stderr, "Transcoder failed");
            return Err(ExtractionError::ExtractionFailed(FailureReason::from_stderr(
                &stderr,
                format!("transcoder exited with {}", output.status),
            )));
        }

        debug!(stderr = %stderr, "Transcoder finished");
        Ok(())
    }
}

/// Fixed invocation: drop video, MP3 at 256 kbps / 44.1 kHz / stereo, overwrite
fn transcode_args(input: &Path, output: &Path) -> Vec<OsString> {
    vec![
        "-i".into(),
        input.as_os_str().to_owned(),
        "-vn".into(),
        "-acodec".into(),
        AUDIO_CODEC.into(),
        "-ab".into(),
        AUDIO_BITRATE.into(),
        "-ar".into(),
        SAMPLE_RATE.into(),
        "-ac".into(),
        CHANNELS.into(),
        "-f".into(),
        CONTAINER.into(),
        "-y".into(),
        output.as_os_str().to_owned(),
    ]
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// Transcoder output in progress; deleted on drop unless committed
struct PartialOutput {
    path: PathBuf,
    committed: bool,
}

impl PartialOutput {
    fn new(destination: &Path) -> Self {
        Self {
            path: partial_path(destination),
            committed: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn commit(mut self, destination: &Path) -> std::io::Result<()> {
        tokio::fs::rename(&self.path, destination).await?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartialOutput {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed partial output"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to remove partial output")
            }
        }
    }
}
