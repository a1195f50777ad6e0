//! Persisted content fingerprints
//!
//! Maps each feed URL to the validator token (ETag or Last-Modified) seen on
//! its last successful cycle. Loaded once at the start of a run and flushed
//! after every successful feed. Writes go through a temp file and a rename,
//! so a crash mid-write leaves the previous store intact.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Last-seen validator for one URL
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Opaque validator token from the server
    pub token: String,
    /// When the token was recorded
    pub recorded_at: DateTime<Utc>,
}

/// URL → fingerprint store backed by a JSON file
#[derive(Debug, Default)]
pub struct FingerprintStore {
    path: PathBuf,
    entries: BTreeMap<String, Fingerprint>,
}

impl FingerprintStore {
    /// Load the store at `path`; a missing file gives an empty store
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match std::fs::read(&path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no fingerprint store yet");
                BTreeMap::new()
            }
            Err(e) => return Err(Error::fs(&path, e)),
        };
        Ok(Self { path, entries })
    }

    /// In-memory store that flushes to `path`
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    /// File backing this store
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Token recorded for `url`
    pub fn token(&self, url: &str) -> Option<&str> {
        self.entries.get(url).map(|f| f.token.as_str())
    }

    /// Full record for `url`
    pub fn get(&self, url: &str) -> Option<&Fingerprint> {
        self.entries.get(url)
    }

    /// Record `token` for `url` (in memory; call [`flush`](Self::flush) to persist)
    pub fn record(&mut self, url: &str, token: impl Into<String>) {
        self.entries.insert(
            url.to_string(),
            Fingerprint {
                token: token.into(),
                recorded_at: Utc::now(),
            },
        );
    }

    /// Put back a record previously taken with [`get`](Self::get); `None`
    /// forgets `url`
    pub fn restore(&mut self, url: &str, previous: Option<Fingerprint>) {
        match previous {
            Some(fingerprint) => {
                self.entries.insert(url.to_string(), fingerprint);
            }
            None => {
                self.entries.remove(url);
            }
        }
    }

    /// Forget `url`
    pub fn remove(&mut self, url: &str) -> Option<Fingerprint> {
        self.entries.remove(url)
    }

    /// Number of recorded URLs
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the store to disk atomically
    pub fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::fs(parent, e))?;
        }

        let json = serde_json::to_vec_pretty(&self.entries)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| Error::fs(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to replace fingerprint store");
            let _ = std::fs::remove_file(&tmp);
            return Err(Error::fs(&self.path, e));
        }
        debug!(path = %self.path.display(), entries = self.entries.len(), "flushed fingerprints");
        Ok(())
    }
}
