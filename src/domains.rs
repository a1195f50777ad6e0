//! Domain extraction from decoded feed text
//!
//! Scans free text for domain-shaped tokens (dot-separated labels ending in an
//! alphabetic label of at least two letters) and normalizes each one to its
//! ASCII-compatible (punycode) form.
//!
//! Matches are rejected when they are:
//! - immediately preceded by `@` (the host part of an e-mail address)
//! - immediately followed by `.`, i.e. the match stops short of a longer
//!   name that continues past it
//!
//! A rejected match is not retried at a shorter length.

use crate::error::EncodingError;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::trace;

// Labels are Unicode word characters or hyphens so internationalized names
// reach the IDNA step; the final label is ASCII letters only.
#[allow(clippy::expect_used)]
static DOMAIN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:[\w-]+\.)+[a-zA-Z]{2,}").expect("domain pattern is a valid constant regex")
});

/// A token after normalization
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Normalized {
    /// Converted to ASCII-compatible encoding
    Ascii(String),
    /// IDNA conversion failed; the raw token is kept as matched
    Raw(String),
}

impl Normalized {
    /// The domain string, whichever form it took
    pub fn into_string(self) -> String {
        match self {
            Normalized::Ascii(s) | Normalized::Raw(s) => s,
        }
    }
}

/// Domains found in one piece of text
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Distinct normalized domains
    pub domains: HashSet<String>,
    /// How many tokens fell back to their raw form
    pub fallbacks: usize,
}

/// Convert a token to its ASCII-compatible form
pub fn to_ascii(token: &str) -> Result<String, EncodingError> {
    idna::domain_to_ascii(token).map_err(|e| EncodingError {
        token: token.to_string(),
        reason: format!("{e:?}"),
    })
}

/// Normalize a token with `convert`, keeping the raw token on failure
pub fn normalize_with<F>(token: &str, convert: F) -> Normalized
where
    F: Fn(&str) -> Result<String, EncodingError>,
{
    match convert(token) {
        Ok(ascii) if !ascii.is_empty() => Normalized::Ascii(ascii),
        Ok(_) => Normalized::Raw(token.to_string()),
        Err(e) => {
            trace!(error = %e, "keeping raw token");
            Normalized::Raw(token.to_string())
        }
    }
}

/// Normalize a token with IDNA, keeping the raw token on failure
pub fn normalize(token: &str) -> Normalized {
    normalize_with(token, to_ascii)
}

/// Raw domain-shaped tokens in `text`, in order of appearance
pub fn candidates(text: &str) -> Vec<&str> {
    DOMAIN_PATTERN
        .find_iter(text)
        .filter(|m| {
            let before = text[..m.start()].chars().next_back();
            let after = text[m.end()..].chars().next();
            let preceded_ok = !matches!(before, Some('@'));
            let followed_ok = after != Some('.');
            preceded_ok && followed_ok
        })
        .map(|m| m.as_str())
        .collect()
}

/// Extract and normalize every domain in `text`
///
/// Never fails: tokens that cannot be encoded are kept raw.
pub fn extract(text: &str) -> Extraction {
    let mut extraction = Extraction::default();
    for token in candidates(text) {
        let normalized = normalize(token);
        if matches!(normalized, Normalized::Raw(_)) {
            extraction.fallbacks += 1;
        }
        extraction.domains.insert(normalized.into_string());
    }
    extraction
}
