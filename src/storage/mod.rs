//! Output store for finished audio files awaiting their one-time download

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use uuid::Uuid;

use crate::naming::is_safe_served_name;

/// Files being handed out are renamed with this prefix first
const CLAIM_PREFIX: &str = ".serving-";

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("Rejected file name: {0}")]
    InvalidName(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, ServeError>;

/// Flat directory of generated audio files
#[derive(Debug, Clone)]
pub struct OutputStore {
    root: PathBuf,
}

impl OutputStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates the directory if needed
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let store = Self::new(root);
        std::fs::create_dir_all(&store.root)?;
        tracing::info!(path = %store.root.display(), "Output store ready");
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Destination for a freshly generated name
    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }

    /// Resolves a client-supplied name to an existing file inside the store
    pub fn resolve(&self, filename: &str) -> Result<PathBuf> {
        if !is_safe_served_name(filename) {
            tracing::warn!(filename, "Rejected unsafe file name");
            return Err(ServeError::InvalidName(filename.to_string()));
        }

        let path = self.root.join(filename);
        if !path.is_file() {
            return Err(ServeError::NotFound(filename.to_string()));
        }
        Ok(path)
    }

    /// Reads a served file and removes it from the store.
    ///
    /// The file is first renamed to a private name; only one concurrent
    /// caller wins that rename, so each file is handed out at most once.
    pub async fn take(&self, filename: &str) -> Result<Vec<u8>> {
        let path = self.resolve(filename)?;
        let claimed = self
            .root
            .join(format!("{}{}", CLAIM_PREFIX, Uuid::new_v4()));

        match tokio::fs::rename(&path, &claimed).await {
            Ok(()) => {}
            // Another request took it first
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ServeError::NotFound(filename.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        let data = tokio::fs::read(&claimed).await;
        if let Err(e) = tokio::fs::remove_file(&claimed).await {
            tracing::warn!(filename, error = %e, "Failed to reclaim served file");
        }
        let data = data?;

        tracing::info!(filename, size = data.len(), "Served audio file");
        Ok(data)
    }
}
