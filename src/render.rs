//! Multi-format rendering of domain sets
//!
//! Every feed is rendered into five artifacts (plain, adblock, wildcard,
//! unbound, base64). Each artifact starts with a `#` header block carrying the
//! description, attribution, generation time and entry count, followed by one
//! line per domain in lexicographic order.

use crate::decoder;
use crate::error::{Error, Result};
use crate::types::{DomainSet, FormatKind};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Header metadata of a rendered artifact or part
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactHeader {
    /// Feed description, e.g. "30-day Domain List"
    pub description: String,
    /// Attribution line
    pub author: String,
    /// Generation timestamp
    pub generated_at: DateTime<Utc>,
    /// Number of body lines
    pub entries: usize,
    /// `(index, total)` for split parts, 1-based
    pub part: Option<(usize, usize)>,
}

impl ArtifactHeader {
    /// Header lines for an artifact of `kind`
    pub fn lines(&self, kind: FormatKind) -> Vec<String> {
        let title = match self.part {
            Some((index, total)) => format!(
                "# Title: {} ({}, part {} of {})",
                self.description,
                kind.label(),
                index,
                total
            ),
            None => format!("# Title: {} ({})", self.description, kind.label()),
        };
        vec![
            title,
            format!("# Author: {}", self.author),
            format!(
                "# Generated: {} UTC",
                self.generated_at.format("%Y-%m-%d %H:%M:%S")
            ),
            format!("# Entries: {}", self.entries),
            "#".to_string(),
        ]
    }
}

/// One rendered output: header plus formatted body lines
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedArtifact {
    /// Output format
    pub kind: FormatKind,
    /// Header metadata
    pub header: ArtifactHeader,
    /// Formatted lines, one per domain
    pub lines: Vec<String>,
}

impl RenderedArtifact {
    /// Number of body lines
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the body is empty
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Full file contents: header, then body, newline-terminated
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        for line in self.header.lines(self.kind).iter().chain(self.lines.iter()) {
            text.push_str(line);
            text.push('\n');
        }
        text
    }
}

/// Format one domain for `kind`
pub fn format_line(kind: FormatKind, domain: &str) -> String {
    match kind {
        FormatKind::Plain => domain.to_string(),
        FormatKind::Adblock => format!("||{domain}^"),
        FormatKind::Wildcard => format!("*.{domain}"),
        FormatKind::ResolverZone => format!("local-zone: \"{domain}\" static"),
        FormatKind::Base64 => decoder::encode(domain),
    }
}

/// Path of an unsplit artifact: `{dir}/{feed}_{suffix}.txt`
pub fn artifact_path(dir: &Path, feed: &str, kind: FormatKind) -> PathBuf {
    dir.join(format!("{}_{}.txt", feed, kind.suffix()))
}

/// Path of a split part: `{dir}/{feed}_{suffix}_part{index}.txt` (1-based)
pub fn part_path(dir: &Path, feed: &str, kind: FormatKind, index: usize) -> PathBuf {
    dir.join(format!("{}_{}_part{}.txt", feed, kind.suffix(), index))
}

/// Renders domain sets into every output format
#[derive(Clone, Debug)]
pub struct MultiFormatRenderer {
    author: String,
}

impl MultiFormatRenderer {
    /// Create a renderer that signs headers with `author`
    pub fn new(author: impl Into<String>) -> Self {
        Self {
            author: author.into(),
        }
    }

    /// Attribution used in headers
    pub fn author(&self) -> &str {
        &self.author
    }

    /// Render already-sorted domains as one artifact of `kind`
    pub fn render_kind(
        &self,
        kind: FormatKind,
        sorted: &[String],
        description: &str,
        generated_at: DateTime<Utc>,
    ) -> RenderedArtifact {
        RenderedArtifact {
            kind,
            header: ArtifactHeader {
                description: description.to_string(),
                author: self.author.clone(),
                generated_at,
                entries: sorted.len(),
                part: None,
            },
            lines: sorted.iter().map(|d| format_line(kind, d)).collect(),
        }
    }

    /// Render `domains` into all five formats
    ///
    /// Output depends only on the set, description and timestamp.
    pub fn render(
        &self,
        domains: &DomainSet,
        description: &str,
        generated_at: DateTime<Utc>,
    ) -> Vec<RenderedArtifact> {
        let sorted = domains.sorted();
        FormatKind::ALL
            .iter()
            .map(|&kind| self.render_kind(kind, &sorted, description, generated_at))
            .collect()
    }
}

/// Write an artifact to `{dir}/{feed}_{suffix}.txt`, returning the path
///
/// Stale part files for the same feed and format are removed first.
pub fn write_artifact(dir: &Path, feed: &str, artifact: &RenderedArtifact) -> Result<PathBuf> {
    remove_stale_parts(dir, feed, artifact.kind)?;
    let path = artifact_path(dir, feed, artifact.kind);
    std::fs::write(&path, artifact.to_text()).map_err(|e| Error::fs(&path, e))?;
    debug!(path = %path.display(), entries = artifact.len(), "wrote artifact");
    Ok(path)
}

/// Remove `{feed}_{suffix}_part*.txt` left by a previous run
pub fn remove_stale_parts(dir: &Path, feed: &str, kind: FormatKind) -> Result<usize> {
    let prefix = format!("{}_{}_part", feed, kind.suffix());
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(Error::fs(dir, e)),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry.map_err(|e| Error::fs(dir, e))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let is_part = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(".txt"))
            .is_some_and(|index| !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()));
        if is_part {
            let path = entry.path();
            std::fs::remove_file(&path).map_err(|e| Error::fs(&path, e))?;
            removed += 1;
        }
    }
    Ok(removed)
}
