//! Utility functions for file operations and path manipulation

use crate::error::{Error, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Exclusive lock held for the duration of one pipeline run
///
/// The lock is a file created with create-new semantics and removed on drop.
/// A lock left behind by a crashed process must be removed by hand.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Take the lock at `path`
    ///
    /// # Errors
    ///
    /// Returns [`Error::RunLocked`] when the file already exists.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }

        let mut file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(Error::RunLocked(path));
            }
            Err(e) => return Err(Error::fs(&path, e)),
        };

        // Informational only; the lock is the file's existence
        let _ = writeln!(
            file,
            "pid={} started={}",
            std::process::id(),
            chrono::Utc::now().to_rfc3339()
        );
        debug!(path = %path.display(), "acquired run lock");
        Ok(Self { path })
    }

    /// Lock file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to release run lock");
        }
    }
}

/// Create `dir` and its parents
pub fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(dir).map_err(|e| Error::fs(dir, e))
}

/// Remove `dir` and everything in it; a missing directory is not an error
pub fn remove_dir(dir: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::fs(dir, e)),
    }
}

/// Remove `dir` only if it is empty; returns whether it was removed
pub fn remove_dir_if_empty(dir: &Path) -> bool {
    let empty = std::fs::read_dir(dir).is_ok_and(|mut entries| entries.next().is_none());
    empty && std::fs::remove_dir(dir).is_ok()
}

/// Last path segment of a bundle URL, for log messages
///
/// ```
/// use nrd_blocklists::utils::bundle_name;
///
/// assert_eq!(bundle_name("https://feeds.example/dl/nrd-30day.tar.gz?k=1"), "nrd-30day.tar.gz");
/// assert_eq!(bundle_name("https://feeds.example/"), "bundle");
/// ```
pub fn bundle_name(url: &str) -> String {
    if let Ok(parsed_url) = url::Url::parse(url)
        && let Some(mut segments) = parsed_url.path_segments()
        && let Some(last_segment) = segments.next_back()
        && !last_segment.is_empty()
    {
        return last_segment.to_string();
    }
    "bundle".to_string()
}
