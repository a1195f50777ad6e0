//! Archive capability
//!
//! Feed bundles are compressed archives. Extraction flattens every member to
//! its base name and drops members whose name matches an exclusion pattern,
//! yielding a map from flat file name to contents. The pipeline then writes
//! the one entry it expects into a per-feed scratch directory.

mod tar_gz;

pub use tar_gz::TarGzExtractor;

use crate::error::{ArchiveError, Error, Result};
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Flat file name → member contents
pub type BundleEntries = HashMap<String, Vec<u8>>;

/// Extracts feed bundles into flat entry maps
///
/// Implementations are synchronous and run inside `spawn_blocking`.
pub trait BundleExtractor: Send + Sync {
    /// Extract `bundle`, skipping members for which `exclude` returns true
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Corrupt`] when the bundle cannot be read.
    fn extract(
        &self,
        bundle: &[u8],
        exclude: &dyn Fn(&str) -> bool,
    ) -> std::result::Result<BundleEntries, ArchiveError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Compiled member-name exclusion patterns
#[derive(Clone, Debug, Default)]
pub struct ArchiveExclusions {
    patterns: Vec<Regex>,
}

impl ArchiveExclusions {
    /// Compile `patterns`; an invalid pattern is a configuration error
    pub fn compile(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .enumerate()
            .map(|(i, pattern)| {
                regex::RegexBuilder::new(pattern)
                    .size_limit(1024 * 1024)
                    .build()
                    .map_err(|e| {
                        Error::config(
                            format!("invalid exclusion pattern '{}': {}", pattern, e),
                            format!("archive.exclude[{i}]"),
                        )
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Whether `name` matches any pattern
    pub fn is_excluded(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(name))
    }

    /// Number of patterns
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether there are no patterns
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Extract `bundle` and write the member named `expected` into `dest_dir`
///
/// Returns the path of the written file.
pub fn unpack_entry(
    extractor: &dyn BundleExtractor,
    bundle: &[u8],
    exclusions: &ArchiveExclusions,
    expected: &str,
    dest_dir: &Path,
) -> Result<PathBuf> {
    let mut entries = extractor.extract(bundle, &|name| exclusions.is_excluded(name))?;
    debug!(
        extractor = extractor.name(),
        entries = entries.len(),
        expected,
        "extracted bundle"
    );

    let contents = entries
        .remove(expected)
        .ok_or_else(|| ArchiveError::MissingEntry {
            name: expected.to_string(),
        })?;

    std::fs::create_dir_all(dest_dir).map_err(|e| Error::fs(dest_dir, e))?;
    let path = dest_dir.join(expected);
    std::fs::write(&path, contents).map_err(|e| Error::fs(&path, e))?;
    Ok(path)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
