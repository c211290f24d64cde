//! Per-request scratch directories

use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

const DIR_PREFIX: &str = "temp_";

/// Uniquely named directory owned by one request.
///
/// The directory is removed by [`Workspace::cleanup`] or, failing that, when
/// the value is dropped, so every exit path (errors, panics, cancelled
/// futures) tears it down.
#[derive(Debug)]
pub struct Workspace {
    id: Uuid,
    path: PathBuf,
    removed: bool,
}

impl Workspace {
    /// Creates `<root>/temp_<uuid>`; fails rather than reuse an existing directory
    pub fn allocate(root: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(root)?;

        let id = Uuid::new_v4();
        let path = root.join(format!("{}{}", DIR_PREFIX, id));
        std::fs::create_dir(&path)?;

        debug!(workspace = %id, path = %path.display(), "Allocated workspace");
        Ok(Self {
            id,
            path,
            removed: false,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// First regular file whose extension matches one of `extensions` (case-insensitive)
    pub fn find_file(&self, extensions: &[&str]) -> io::Result<Option<PathBuf>> {
        let mut entries = std::fs::read_dir(&self.path)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| extensions.iter().any(|want| ext.eq_ignore_ascii_case(want)))
            })
            .collect::<Vec<_>>();

        // read_dir order is platform dependent
        entries.sort();
        Ok(entries.into_iter().next())
    }

    /// Removes the directory and everything in it
    pub fn cleanup(mut self) -> io::Result<()> {
        self.removed = true;
        remove_dir(&self.path)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = remove_dir(&self.path) {
            warn!(workspace = %self.id, error = %e, "Failed to remove workspace on drop");
        }
    }
}

fn remove_dir(path: &Path) -> io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Removed workspace");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
