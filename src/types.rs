//! Core types for nrd-blocklists

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

use crate::decoder::DecodeStats;

/// A set of normalized domain names for one feed
///
/// No ordering is kept here; rendering imposes lexicographic order via
/// [`DomainSet::sorted`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DomainSet(HashSet<String>);

impl DomainSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a domain, returning false if it was already present
    pub fn insert(&mut self, domain: impl Into<String>) -> bool {
        self.0.insert(domain.into())
    }

    /// Whether the set contains `domain`
    pub fn contains(&self, domain: &str) -> bool {
        self.0.contains(domain)
    }

    /// Remove every member of `exclusions`, returning how many were dropped
    pub fn remove_all(&mut self, exclusions: &HashSet<String>) -> usize {
        let before = self.0.len();
        self.0.retain(|domain| !exclusions.contains(domain));
        before - self.0.len()
    }

    /// Number of domains
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in arbitrary order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// The sort stage: domains in lexicographic (byte) order
    ///
    /// This is the order every rendered artifact uses, so two runs over the
    /// same set produce identical bodies.
    pub fn sorted(&self) -> Vec<String> {
        let mut domains: Vec<String> = self.0.iter().cloned().collect();
        domains.sort_unstable();
        domains
    }
}

impl Extend<String> for DomainSet {
    fn extend<I: IntoIterator<Item = String>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl FromIterator<String> for DomainSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<&'a str> for DomainSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self(iter.into_iter().map(str::to_string).collect())
    }
}

/// Output format of a rendered artifact
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    /// One domain per line
    Plain,
    /// `||domain^` adblock filter syntax
    Adblock,
    /// `*.domain` wildcard list
    Wildcard,
    /// Unbound `local-zone` statements
    ResolverZone,
    /// Base64-encoded domains
    Base64,
}

impl FormatKind {
    /// All formats, in the order they are rendered and written
    pub const ALL: [FormatKind; 5] = [
        FormatKind::Plain,
        FormatKind::Adblock,
        FormatKind::Wildcard,
        FormatKind::ResolverZone,
        FormatKind::Base64,
    ];

    /// File name suffix (`{feed}_{suffix}.txt`)
    pub fn suffix(&self) -> &'static str {
        match self {
            FormatKind::Plain => "txt",
            FormatKind::Adblock => "adblock",
            FormatKind::Wildcard => "wildcard",
            FormatKind::ResolverZone => "unbound",
            FormatKind::Base64 => "base64",
        }
    }

    /// Human-readable label used in artifact headers
    pub fn label(&self) -> &'static str {
        match self {
            FormatKind::Plain => "Plain",
            FormatKind::Adblock => "Adblock",
            FormatKind::Wildcard => "Wildcard",
            FormatKind::ResolverZone => "Unbound",
            FormatKind::Base64 => "Base64",
        }
    }
}

impl std::fmt::Display for FormatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Per-feed, per-run state
///
/// `Pending → Probed → {Skipped | Fetched} → Extracted → Rendered → Split → Done`,
/// with any state able to move to `Failed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedState {
    /// Not started
    Pending,
    /// Change detection finished
    Probed,
    /// Content unchanged since the last successful cycle
    Skipped,
    /// Bundle downloaded
    Fetched,
    /// Domains decoded from the bundle entry
    Extracted,
    /// Artifacts written
    Rendered,
    /// Artifacts split into parts
    Split,
    /// Cycle complete and fingerprint recorded
    Done,
    /// Cycle aborted
    Failed,
}

impl FeedState {
    /// Whether no further transitions happen in this run
    pub fn is_terminal(&self) -> bool {
        matches!(self, FeedState::Skipped | FeedState::Done | FeedState::Failed)
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: FeedState) -> bool {
        use FeedState::*;
        if self.is_terminal() {
            return false;
        }
        if next == Failed {
            return true;
        }
        matches!(
            (self, next),
            (Pending, Probed)
                | (Probed, Skipped)
                | (Probed, Fetched)
                | (Fetched, Extracted)
                | (Extracted, Rendered)
                | (Rendered, Split)
                | (Split, Done)
        )
    }
}

impl std::fmt::Display for FeedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FeedState::Pending => "pending",
            FeedState::Probed => "probed",
            FeedState::Skipped => "skipped",
            FeedState::Fetched => "fetched",
            FeedState::Extracted => "extracted",
            FeedState::Rendered => "rendered",
            FeedState::Split => "split",
            FeedState::Done => "done",
            FeedState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Events broadcast by the pipeline
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A feed moved to a new state
    FeedState {
        /// Feed name
        feed: String,
        /// New state
        state: FeedState,
    },

    /// A feed failed
    FeedFailed {
        /// Feed name
        feed: String,
        /// Error message
        error: String,
    },

    /// A run finished
    RunComplete {
        /// Feeds that reached `Done`
        done: usize,
        /// Feeds that were unchanged
        skipped: usize,
        /// Feeds that failed
        failed: usize,
    },
}

/// Outcome of one feed's cycle
#[derive(Clone, Debug)]
pub struct FeedReport {
    /// Feed name
    pub feed: String,
    /// Terminal state reached
    pub state: FeedState,
    /// Number of domains rendered (0 unless `Done`)
    pub entries: usize,
    /// Files written (parts and unsplit artifacts)
    pub files: Vec<PathBuf>,
    /// Decoder statistics, when the feed got that far
    pub stats: Option<DecodeStats>,
    /// Error message for failed feeds
    pub error: Option<String>,
    /// Machine-readable error code for failed feeds
    pub error_code: Option<&'static str>,
}

impl FeedReport {
    pub(crate) fn new(feed: impl Into<String>) -> Self {
        Self {
            feed: feed.into(),
            state: FeedState::Pending,
            entries: 0,
            files: Vec::new(),
            stats: None,
            error: None,
            error_code: None,
        }
    }
}

/// Result of a whole run
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    /// One report per configured feed, in configuration order
    pub reports: Vec<FeedReport>,
}

impl RunSummary {
    fn count(&self, state: FeedState) -> usize {
        self.reports.iter().filter(|r| r.state == state).count()
    }

    /// Feeds that completed a full cycle
    pub fn done(&self) -> usize {
        self.count(FeedState::Done)
    }

    /// Feeds skipped as unchanged
    pub fn skipped(&self) -> usize {
        self.count(FeedState::Skipped)
    }

    /// Feeds that failed
    pub fn failed(&self) -> usize {
        self.count(FeedState::Failed)
    }

    /// True when no feed failed
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Every file produced by this run
    pub fn files(&self) -> impl Iterator<Item = &PathBuf> {
        self.reports.iter().flat_map(|r| r.files.iter())
    }
}
