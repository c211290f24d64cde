//! Best-effort persistence of the provider session between requests

use bytes::Bytes;
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Opaque provider authentication state
#[derive(Clone, PartialEq, Eq)]
pub struct SessionBlob(Bytes);

impl SessionBlob {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// Never print session contents
impl fmt::Debug for SessionBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionBlob({} bytes)", self.0.len())
    }
}

/// File-backed store holding at most one session blob
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing, unreadable and empty files all read as "no session"
    pub fn load(&self) -> Option<SessionBlob> {
        match std::fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => {
                debug!(path = %self.path.display(), "Session file is empty");
                None
            }
            Ok(bytes) => {
                debug!(path = %self.path.display(), size = bytes.len(), "Loaded session");
                Some(SessionBlob::new(bytes))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No stored session");
                None
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read session, ignoring");
                None
            }
        }
    }

    /// Replaces the stored session; failures are logged and swallowed
    pub fn save(&self, blob: &SessionBlob) {
        match self.write_atomic(blob.as_bytes()) {
            Ok(()) => debug!(path = %self.path.display(), size = blob.len(), "Saved session"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to save session"),
        }
    }

    fn write_atomic(&self, data: &[u8]) -> io::Result<()> {
        write_atomic(&self.path, data)
    }
}

/// Writes `data` to a sibling temp file and renames it over `path`.
///
/// Concurrent writers race, but readers only ever see a complete file.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
