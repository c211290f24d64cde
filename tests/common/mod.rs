//! Shared fixtures: a scripted content provider and fake transcoders
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

use reelaudio::config::{Config, HumanDuration};
use reelaudio::naming::Locator;
use reelaudio::provider::{ContentProvider, MediaHandle, ProviderFailure};
use reelaudio::session::SessionBlob;

/// What one `deliver` call does
#[derive(Debug, Clone)]
pub enum Delivery {
    /// Writes `<token>.mp4` and optionally hands back a refreshed session
    Video { session: Option<&'static [u8]> },
    /// Succeeds without writing anything
    Empty,
    Fail(ProviderFailure),
    /// Panics mid-download after writing a partial file
    Panic,
}

/// Provider driven by a script of delivery results; once the script runs
/// out every call delivers a video
pub struct StubProvider {
    resolution: Result<MediaHandle, ProviderFailure>,
    deliveries: Mutex<VecDeque<Delivery>>,
    resolve_calls: AtomicUsize,
    deliver_calls: AtomicUsize,
    seen_sessions: Mutex<Vec<Option<Vec<u8>>>>,
}

impl StubProvider {
    pub fn video(title: Option<&str>) -> Self {
        Self::with_resolution(Ok(MediaHandle {
            is_video: true,
            title: title.map(str::to_string),
        }))
    }

    pub fn image() -> Self {
        Self::with_resolution(Ok(MediaHandle {
            is_video: false,
            title: Some("just a photo".to_string()),
        }))
    }

    pub fn with_resolution(resolution: Result<MediaHandle, ProviderFailure>) -> Self {
        Self {
            resolution,
            deliveries: Mutex::new(VecDeque::new()),
            resolve_calls: AtomicUsize::new(0),
            deliver_calls: AtomicUsize::new(0),
            seen_sessions: Mutex::new(Vec::new()),
        }
    }

    pub fn then(self, delivery: Delivery) -> Self {
        self.deliveries.lock().unwrap().push_back(delivery);
        self
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn deliver_calls(&self) -> usize {
        self.deliver_calls.load(Ordering::SeqCst)
    }

    /// Session bytes passed to each `deliver` call
    pub fn seen_sessions(&self) -> Vec<Option<Vec<u8>>> {
        self.seen_sessions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentProvider for StubProvider {
    async fn resolve(
        &self,
        _locator: &Locator,
        _session: Option<&SessionBlob>,
    ) -> Result<MediaHandle, ProviderFailure> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        self.resolution.clone()
    }

    async fn deliver(
        &self,
        locator: &Locator,
        session: Option<&SessionBlob>,
        target_dir: &Path,
    ) -> Result<Option<SessionBlob>, ProviderFailure> {
        self.deliver_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_sessions
            .lock()
            .unwrap()
            .push(session.map(|s| s.as_bytes().to_vec()));

        let step = self
            .deliveries
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Delivery::Video { session: None });

        match step {
            Delivery::Video { session } => {
                let path = target_dir.join(format!("{}.mp4", locator.token));
                std::fs::write(&path, b"fake-mp4-payload").unwrap();
                Ok(session.map(SessionBlob::new))
            }
            Delivery::Empty => Ok(None),
            Delivery::Fail(failure) => Err(failure),
            Delivery::Panic => {
                let path = target_dir.join(format!("{}.mp4.part", locator.token));
                std::fs::write(&path, b"fake-mp4").unwrap();
                panic!("provider exploded");
            }
        }
    }
}

/// Transcoder that copies a marker into its output argument
pub const FAKE_FFMPEG: &str = r#"#!/bin/sh
input="$2"
for last; do :; done
if [ ! -f "$input" ]; then
    echo "$input: No such file or directory" >&2
    exit 1
fi
printf 'ID3-fake-mp3' > "$last"
"#;

/// Transcoder that exits cleanly without writing anything
pub const SILENT_FFMPEG: &str = "#!/bin/sh\nexit 0\n";

/// Transcoder that writes part of its output and then stalls
pub const STALLING_FFMPEG: &str = r#"#!/bin/sh
for last; do :; done
printf 'ID3-partial' > "$last"
exec sleep 30
"#;

/// Transcoder that never finishes on its own
pub const HANGING_FFMPEG: &str = "#!/bin/sh\nexec sleep 30\n";

#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Config whose every path lives under `dir`
pub fn test_config(dir: &TempDir, transcoder: &str) -> Config {
    let mut config = Config::default();
    config.storage.output_dir = dir.path().join("downloads");
    config.storage.workspace_root = dir.path().join("work");
    config.storage.session_file = dir.path().join("data/session.bin");
    config.storage.stats_file = dir.path().join("data/stats.json");
    config.extractor.program = transcoder.to_string();
    config.extractor.timeout = HumanDuration(Duration::from_secs(10));
    config.retrieval.initial_backoff = HumanDuration(Duration::from_secs(5));
    config
}

/// Entries left under a directory, or none if it does not exist
pub fn entries(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(read) => read.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}
