//! Persistent download counter

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

use crate::session::write_atomic;

/// On-disk representation of the counter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadStats {
    pub downloads: u64,
    #[serde(with = "chrono::serde::ts_seconds_option", default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Monotonic counter of successful pipeline runs.
///
/// Increments are serialized by an in-process mutex held across the file
/// write, so concurrent completions never lose updates.
#[derive(Debug)]
pub struct StatsCounter {
    path: PathBuf,
    current: Mutex<DownloadStats>,
}

impl StatsCounter {
    /// Opens the counter, starting from zero if the file is missing or corrupt
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = read_stats(&path);
        debug!(path = %path.display(), downloads = current.downloads, "Opened stats counter");
        Self {
            path,
            current: Mutex::new(current),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> u64 {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .downloads
    }

    pub fn snapshot(&self) -> DownloadStats {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds one download and persists; returns the new count.
    ///
    /// A failed write keeps the in-memory count and is retried implicitly by
    /// the next increment.
    pub fn increment(&self) -> u64 {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        current.downloads += 1;
        current.updated_at = Some(Utc::now());

        match serde_json::to_vec(&*current) {
            Ok(data) => {
                if let Err(e) = write_atomic(&self.path, &data) {
                    warn!(path = %self.path.display(), error = %e, "Failed to persist stats");
                }
            }
            Err(e) => warn!(error = %e, "Failed to encode stats"),
        }

        current.downloads
    }
}

fn read_stats(path: &Path) -> DownloadStats {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return DownloadStats::default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read stats, starting at zero");
            return DownloadStats::default();
        }
    };

    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "Corrupt stats file, starting at zero");
        DownloadStats::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_starts_at_zero() {
        let dir = TempDir::new().unwrap();
        let counter = StatsCounter::open(dir.path().join("stats.json"));
        assert_eq!(counter.get(), 0);
        assert!(counter.snapshot().updated_at.is_none());
    }

    #[test]
    fn test_increment_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data/stats.json");

        let counter = StatsCounter::open(&path);
        assert_eq!(counter.increment(), 1);
        assert_eq!(counter.increment(), 2);
        drop(counter);

        let reopened = StatsCounter::open(&path);
        assert_eq!(reopened.get(), 2);
        assert!(reopened.snapshot().updated_at.is_some());
    }

    #[test]
    fn test_corrupt_file_starts_at_zero() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stats.json");
        std::fs::write(&path, b"{not json").unwrap();

        let counter = StatsCounter::open(&path);
        assert_eq!(counter.get(), 0);
        assert_eq!(counter.increment(), 1);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stats.json");
        let counter = Arc::new(StatsCounter::open(&path));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let counter = counter.clone();
                std::thread::spawn(move || {
                    for _ in 0..5 {
                        counter.increment();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(counter.get(), 80);
        assert_eq!(StatsCounter::open(&path).get(), 80);
    }
}
