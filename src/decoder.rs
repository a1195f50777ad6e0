//! Feed decoding
//!
//! A feed file holds one base64-encoded record per line. Each record is
//! decoded to text and handed to the domain extractor; the union of all
//! extracted domains, minus the exclusion list, is the feed's [`DomainSet`].
//!
//! Bad lines are counted and skipped. Only failing to read the file itself is
//! an error.

use crate::domains;
use crate::error::{DecodeError, Error, Result};
use crate::types::DomainSet;
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Standard alphabet, accepting input with or without padding
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Counters collected while decoding one feed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Lines read, including blank ones
    pub lines: usize,
    /// Blank lines
    pub blank: usize,
    /// Lines skipped because they were not valid base64
    pub skipped: usize,
    /// Tokens kept raw because IDNA conversion failed
    pub fallbacks: usize,
    /// Domains dropped by the exclusion list
    pub excluded: usize,
}

/// A decoded feed
#[derive(Clone, Debug, Default)]
pub struct DecodedFeed {
    /// Deduplicated domains, exclusions removed
    pub domains: DomainSet,
    /// Decoder counters
    pub stats: DecodeStats,
}

impl DecodedFeed {
    /// Number of domains (used for header metadata)
    pub fn len(&self) -> usize {
        self.domains.len()
    }

    /// Whether no domains were found
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

/// Decode a single (already trimmed) base64 line to text
///
/// Undecodable UTF-8 sequences in the decoded bytes are replaced.
pub fn decode_line(line_no: usize, line: &str) -> std::result::Result<String, DecodeError> {
    let bytes = LENIENT.decode(line).map_err(|e| DecodeError {
        line: line_no,
        reason: e.to_string(),
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Base64-encode a string (standard alphabet, padded)
pub fn encode(text: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(text.as_bytes())
}

/// Decodes feed files into domain sets
#[derive(Clone, Debug, Default)]
pub struct FeedDecoder {
    exclusions: Arc<HashSet<String>>,
}

impl FeedDecoder {
    /// Create a decoder that drops every domain in `exclusions`
    pub fn new(exclusions: Arc<HashSet<String>>) -> Self {
        Self { exclusions }
    }

    /// Number of configured exclusions
    pub fn exclusion_count(&self) -> usize {
        self.exclusions.len()
    }

    /// Decode feed text already in memory
    pub fn decode_text(&self, text: &str) -> DecodedFeed {
        let mut feed = DecodedFeed::default();

        for (index, raw) in text.lines().enumerate() {
            feed.stats.lines += 1;
            let line = raw.trim();
            if line.is_empty() {
                feed.stats.blank += 1;
                continue;
            }

            match decode_line(index + 1, line) {
                Ok(decoded) => {
                    let extraction = domains::extract(&decoded);
                    feed.stats.fallbacks += extraction.fallbacks;
                    feed.domains.extend(extraction.domains);
                }
                Err(e) => {
                    debug!(error = %e, "skipping undecodable line");
                    feed.stats.skipped += 1;
                }
            }
        }

        feed.stats.excluded = feed.domains.remove_all(&self.exclusions);
        feed
    }

    /// Decode a feed file
    ///
    /// The file is read with invalid UTF-8 replaced, so only an unreadable
    /// file is an error.
    pub fn decode_file(&self, path: &Path) -> Result<DecodedFeed> {
        let bytes = std::fs::read(path).map_err(|e| Error::fs(path, e))?;
        let text = String::from_utf8_lossy(&bytes);
        let feed = self.decode_text(&text);

        if feed.stats.skipped > 0 {
            warn!(
                path = %path.display(),
                skipped = feed.stats.skipped,
                "skipped lines that were not valid base64"
            );
        }
        info!(
            path = %path.display(),
            domains = feed.len(),
            lines = feed.stats.lines,
            excluded = feed.stats.excluded,
            "decoded feed"
        );
        Ok(feed)
    }
}

/// Parse an exclusion list: one domain per line, `#` comments and blank
/// lines ignored
///
/// Entries are normalized the same way extracted domains are, so
/// `Example.COM` and `bücher.example` match what the extractor emits.
pub fn parse_exclusions(text: &str) -> HashSet<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| domains::normalize(line).into_string())
        .collect()
}

/// Load the exclusion list from `path`
///
/// A missing file means no exclusions; any other read failure is an error.
pub fn load_exclusions(path: &Path) -> Result<HashSet<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            let exclusions = parse_exclusions(&text);
            info!(path = %path.display(), count = exclusions.len(), "loaded exclusions");
            Ok(exclusions)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "exclusion file not found, continuing without exclusions");
            Ok(HashSet::new())
        }
        Err(e) => Err(Error::Config {
            message: format!("cannot read exclusion file {}: {}", path.display(), e),
            key: Some("paths.exclusion_file".to_string()),
        }),
    }
}
