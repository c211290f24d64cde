//! Provider backed by an external downloader (yt-dlp compatible CLI)

use async_trait::async_trait;
use serde_json::Value;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{ContentProvider, MediaHandle, ProviderFailure, ProviderStatus};
use crate::config::ProviderConfig;
use crate::naming::Locator;
use crate::session::SessionBlob;

const COOKIE_JAR_NAME: &str = ".session-cookies.txt";
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mov", "mkv"];

/// Drives the downloader CLI; the session blob is its Netscape cookie jar
#[derive(Debug, Clone)]
pub struct CommandProvider {
    program: String,
    base_url: String,
    timeout: Duration,
}

impl CommandProvider {
    pub fn new(program: impl Into<String>, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            base_url: base_url.into(),
            timeout,
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::new(&config.program, &config.base_url, config.timeout.as_duration())
    }

    async fn run(&self, args: Vec<OsString>) -> Result<Vec<u8>, ProviderFailure> {
        debug!(program = %self.program, ?args, "Running downloader");

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ProviderFailure::with_status(
                    ProviderStatus::Unavailable,
                    format!("failed to start downloader '{}': {}", self.program, e),
                )
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| {
                ProviderFailure::with_status(ProviderStatus::Unavailable, e.to_string())
            })?,
            Err(_) => {
                warn!(program = %self.program, timeout = ?self.timeout, "Downloader timed out");
                return Err(ProviderFailure::with_status(
                    ProviderStatus::Unavailable,
                    format!("downloader timed out after {:?}", self.timeout),
                ));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProviderFailure::message(error_summary(&stderr, output.status)));
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl ContentProvider for CommandProvider {
    async fn resolve(
        &self,
        locator: &Locator,
        session: Option<&SessionBlob>,
    ) -> Result<MediaHandle, ProviderFailure> {
        // Resolution has no workspace, so the jar lives in a throwaway file
        let jar = match session {
            Some(blob) => Some(write_temp_jar(blob)?),
            None => None,
        };

        let mut args: Vec<OsString> = vec![
            "--dump-single-json".into(),
            "--skip-download".into(),
            "--no-warnings".into(),
        ];
        if let Some(jar) = &jar {
            args.push("--cookies".into());
            args.push(jar.path().as_os_str().to_owned());
        }
        args.push(locator.url(&self.base_url).into());

        let stdout = self.run(args).await?;
        let info: Value = serde_json::from_slice(&stdout).map_err(|e| {
            ProviderFailure::message(format!("unreadable metadata from downloader: {}", e))
        })?;

        Ok(MediaHandle {
            is_video: is_video(&info),
            title: preferred_title(&info),
        })
    }

    async fn deliver(
        &self,
        locator: &Locator,
        session: Option<&SessionBlob>,
        target_dir: &Path,
    ) -> Result<Option<SessionBlob>, ProviderFailure> {
        let jar_path = target_dir.join(COOKIE_JAR_NAME);
        if let Some(blob) = session {
            tokio::fs::write(&jar_path, blob.as_bytes()).await.map_err(|e| {
                ProviderFailure::message(format!("failed to stage session: {}", e))
            })?;
        }

        let mut args: Vec<OsString> = vec![
            "--no-warnings".into(),
            "--no-progress".into(),
            "--merge-output-format".into(),
            "mp4".into(),
            "-o".into(),
            target_dir.join("%(id)s.%(ext)s").into_os_string(),
        ];
        // The jar is always passed so the first successful run creates a session
        args.push("--cookies".into());
        args.push(jar_path.clone().into_os_string());
        args.push(locator.url(&self.base_url).into());

        self.run(args).await?;

        match tokio::fs::read(&jar_path).await {
            Ok(bytes) if !bytes.is_empty() => Ok(Some(SessionBlob::new(bytes))),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Downloader wrote no cookie jar");
                Ok(None)
            }
            Err(e) => {
                warn!(error = %e, "Failed to read cookie jar");
                Ok(None)
            }
        }
    }
}

fn write_temp_jar(blob: &SessionBlob) -> Result<tempfile::NamedTempFile, ProviderFailure> {
    use std::io::Write;

    let mut file = tempfile::NamedTempFile::new()
        .map_err(|e| ProviderFailure::message(format!("failed to stage session: {}", e)))?;
    file.write_all(blob.as_bytes())
        .map_err(|e| ProviderFailure::message(format!("failed to stage session: {}", e)))?;
    Ok(file)
}

/// Playlists (multi-item posts) count as video when any entry is one
fn is_video(info: &Value) -> bool {
    if let Some(entries) = info.get("entries").and_then(Value::as_array) {
        return entries.iter().any(is_video);
    }
    match info.get("vcodec").and_then(Value::as_str) {
        Some("none") => false,
        Some(_) => true,
        None => info
            .get("ext")
            .and_then(Value::as_str)
            .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext)),
    }
}

/// The caption's first line beats the generated title
fn preferred_title(info: &Value) -> Option<String> {
    ["description", "title"]
        .iter()
        .filter_map(|key| info.get(*key).and_then(Value::as_str))
        .filter_map(|text| text.lines().map(str::trim).find(|line| !line.is_empty()))
        .map(str::to_string)
        .next()
}

/// Last `ERROR:` line of the downloader's stderr, else its last non-empty line
fn error_summary(stderr: &str, status: std::process::ExitStatus) -> String {
    let lines: Vec<&str> = stderr.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    lines
        .iter()
        .rev()
        .find(|line| line.starts_with("ERROR:"))
        .or_else(|| lines.last())
        .map(|line| line.to_string())
        .unwrap_or_else(|| format!("downloader exited with {}", status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_video_from_vcodec_and_ext() {
        assert!(is_video(&json!({"vcodec": "h264", "ext": "mp4"})));
        assert!(!is_video(&json!({"vcodec": "none", "ext": "jpg"})));
        assert!(is_video(&json!({"ext": "mp4"})));
        assert!(!is_video(&json!({"ext": "jpg"})));
        assert!(!is_video(&json!({})));
    }

    #[test]
    fn test_is_video_for_multi_item_posts() {
        let carousel = json!({"entries": [{"vcodec": "none"}, {"vcodec": "avc1"}]});
        assert!(is_video(&carousel));
        let images = json!({"entries": [{"vcodec": "none"}, {"ext": "jpg"}]});
        assert!(!is_video(&images));
    }

    #[test]
    fn test_preferred_title() {
        let info = json!({"title": "Video by someone", "description": "\n  Sunset run  \nmore"});
        assert_eq!(preferred_title(&info).as_deref(), Some("Sunset run"));

        let info = json!({"title": "Video by someone", "description": "   "});
        assert_eq!(preferred_title(&info).as_deref(), Some("Video by someone"));

        assert_eq!(preferred_title(&json!({})), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_error_summary_prefers_error_lines() {
        use std::os::unix::process::ExitStatusExt;
        let status = std::process::ExitStatus::from_raw(256);

        let stderr = "[Instagram] abc: Setting up session\nERROR: [Instagram] abc: login required\nhint\n";
        assert_eq!(
            error_summary(stderr, status),
            "ERROR: [Instagram] abc: login required"
        );
        assert_eq!(error_summary("boom\n", status), "boom");
        assert!(error_summary("", status).starts_with("downloader exited with"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let provider = CommandProvider::new(
            "reelaudio-no-such-downloader",
            "https://www.instagram.com",
            Duration::from_secs(5),
        );
        let locator = Locator::parse("https://www.instagram.com/reel/abc/").unwrap();

        let err = provider.resolve(&locator, None).await.unwrap_err();
        assert_eq!(err.status, Some(ProviderStatus::Unavailable));
    }

    #[cfg(unix)]
    fn fake_downloader(dir: &Path) -> String {
        use std::os::unix::fs::PermissionsExt;

        // Appends to the jar it is given, creating it when missing
        let script = r#"#!/bin/sh
jar=""
while [ $# -gt 0 ]; do
    if [ "$1" = "--cookies" ]; then jar="$2"; fi
    shift
done
[ -n "$jar" ] || exit 3
if [ -f "$jar" ]; then old=$(cat "$jar"); else old="new"; fi
printf '%s+refreshed' "$old" > "$jar"
"#;
        let path = dir.join("yt-dlp");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_deliver_creates_first_session() {
        let dir = tempfile::TempDir::new().unwrap();
        let provider = CommandProvider::new(
            fake_downloader(dir.path()),
            "https://www.instagram.com",
            Duration::from_secs(5),
        );
        let target = dir.path().join("work");
        std::fs::create_dir(&target).unwrap();
        let locator = Locator::parse("https://www.instagram.com/reel/abc/").unwrap();

        let refreshed = provider.deliver(&locator, None, &target).await.unwrap();

        assert_eq!(refreshed.unwrap().as_bytes(), b"new+refreshed");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_deliver_hands_existing_session_to_downloader() {
        let dir = tempfile::TempDir::new().unwrap();
        let provider = CommandProvider::new(
            fake_downloader(dir.path()),
            "https://www.instagram.com",
            Duration::from_secs(5),
        );
        let target = dir.path().join("work");
        std::fs::create_dir(&target).unwrap();
        let locator = Locator::parse("https://www.instagram.com/reel/abc/").unwrap();
        let session = SessionBlob::new(&b"v1"[..]);

        let refreshed = provider
            .deliver(&locator, Some(&session), &target)
            .await
            .unwrap();

        assert_eq!(refreshed.unwrap().as_bytes(), b"v1+refreshed");
    }
}
