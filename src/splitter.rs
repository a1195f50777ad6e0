//! Splitting artifacts into bounded parts
//!
//! Large artifacts are split into `N` contiguous parts so each stays under
//! downstream publishing limits. Part `i` (0-based, `i < N-1`) takes body
//! lines `[i*size, (i+1)*size)` with `size = total / N`; the last part takes
//! everything from `(N-1)*size` to the end. Each part gets its own header and
//! the unsplit file is removed.

use crate::error::{Error, Result};
use crate::render::{ArtifactHeader, RenderedArtifact};
use crate::types::FormatKind;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What to do with one artifact
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitAction {
    /// Leave the artifact as a single file
    Keep,
    /// Split into this many parts (at least 2)
    Parts(usize),
}

/// A policy rule matching a feed/format pairing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitRule {
    /// Substring of the feed name to match (None matches every feed)
    #[serde(default)]
    pub feed: Option<String>,
    /// Format to match (None matches every format)
    #[serde(default)]
    pub format: Option<FormatKind>,
    /// Action applied when the rule matches
    pub action: SplitAction,
}

impl SplitRule {
    fn matches(&self, feed: &str, format: FormatKind) -> bool {
        let feed_ok = self.feed.as_deref().is_none_or(|pattern| feed.contains(pattern));
        let format_ok = self.format.is_none_or(|kind| kind == format);
        feed_ok && format_ok
    }
}

/// Per-(feed, format) split policy
///
/// Rules are checked in order and the first match wins; otherwise `default`
/// applies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitPolicy {
    /// Action when no rule matches (default: 2 parts)
    #[serde(default = "default_action")]
    pub default: SplitAction,

    /// Ordered rules (default: unbound output of 30-day feeds in 3 parts)
    #[serde(default = "default_rules")]
    pub rules: Vec<SplitRule>,
}

impl Default for SplitPolicy {
    fn default() -> Self {
        Self {
            default: default_action(),
            rules: default_rules(),
        }
    }
}

fn default_action() -> SplitAction {
    SplitAction::Parts(2)
}

fn default_rules() -> Vec<SplitRule> {
    vec![SplitRule {
        feed: Some("30day".to_string()),
        format: Some(FormatKind::ResolverZone),
        action: SplitAction::Parts(3),
    }]
}

impl SplitPolicy {
    /// Action for the artifact of `format` belonging to `feed`
    pub fn action_for(&self, feed: &str, format: FormatKind) -> SplitAction {
        self.rules
            .iter()
            .find(|rule| rule.matches(feed, format))
            .map_or(self.default, |rule| rule.action)
    }

    /// Reject part counts below 2
    pub fn validate(&self) -> Result<()> {
        let check = |action: SplitAction, key: String| match action {
            SplitAction::Parts(n) if n < 2 => Err(Error::config(
                format!("split part count must be at least 2, got {n}"),
                key,
            )),
            _ => Ok(()),
        };
        check(self.default, "output.split.default".to_string())?;
        for (i, rule) in self.rules.iter().enumerate() {
            check(rule.action, format!("output.split.rules[{i}].action"))?;
        }
        Ok(())
    }
}

/// Line ranges of each part
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitPlan {
    /// Body line ranges, in order; the last absorbs the remainder
    pub ranges: Vec<Range<usize>>,
}

impl SplitPlan {
    /// Plan `parts` contiguous slices over `total` body lines
    pub fn new(total: usize, parts: usize) -> Self {
        let parts = parts.max(1);
        let size = total / parts;
        let ranges = (0..parts)
            .map(|i| {
                let start = i * size;
                let end = if i + 1 < parts { start + size } else { total };
                start..end
            })
            .collect();
        Self { ranges }
    }

    /// Number of parts
    pub fn parts(&self) -> usize {
        self.ranges.len()
    }

    /// Body line count of each part
    pub fn sizes(&self) -> Vec<usize> {
        self.ranges.iter().map(|r| r.len()).collect()
    }
}

/// Path of part `index` (1-based) next to `source`: `{stem}_part{index}.txt`
pub fn part_path_for(source: &Path, index: usize) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    source.with_file_name(format!("{stem}_part{index}.txt"))
}

/// Build the parts of `artifact` according to `plan`
pub fn split_artifact(artifact: &RenderedArtifact, plan: &SplitPlan) -> Vec<RenderedArtifact> {
    let total = plan.parts();
    plan.ranges
        .iter()
        .enumerate()
        .map(|(i, range)| {
            let lines = artifact.lines[range.clone()].to_vec();
            RenderedArtifact {
                kind: artifact.kind,
                header: ArtifactHeader {
                    entries: lines.len(),
                    part: Some((i + 1, total)),
                    ..artifact.header.clone()
                },
                lines,
            }
        })
        .collect()
}

/// Replace the written artifact at `source` with `parts` part files
///
/// Returns the part paths in order. An empty artifact still produces `parts`
/// header-only files.
pub fn split_file(source: &Path, artifact: &RenderedArtifact, parts: usize) -> Result<Vec<PathBuf>> {
    let plan = SplitPlan::new(artifact.len(), parts);
    let mut written = Vec::with_capacity(plan.parts());

    for (i, part) in split_artifact(artifact, &plan).iter().enumerate() {
        let path = part_path_for(source, i + 1);
        std::fs::write(&path, part.to_text()).map_err(|e| Error::fs(&path, e))?;
        debug!(path = %path.display(), entries = part.len(), "wrote part");
        written.push(path);
    }

    match std::fs::remove_file(source) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(Error::fs(source, e)),
    }

    info!(
        source = %source.display(),
        parts = plan.parts(),
        sizes = ?plan.sizes(),
        "split artifact"
    );
    Ok(written)
}
