//! Configuration types for nrd-blocklists

use crate::archive::ArchiveExclusions;
use crate::error::{Error, Result};
use crate::splitter::SplitPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// One feed: where to download its bundle and what to call its output
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSpec {
    /// Output file stem, e.g. `nrd-30day`
    pub name: String,

    /// Bundle URL
    pub url: String,

    /// Human-readable description used in artifact headers
    pub description: String,

    /// Flat name of the bundle member to decode
    pub expected_entry: String,
}

/// Built-in feeds: (name, URL environment variable, description)
pub const DEFAULT_FEEDS: [(&str, &str, &str); 4] = [
    ("nrd-30day", "NORDOMAIN_30DAY_URL", "30-day Domain List"),
    ("nrd-14day", "NORDOMAIN_14DAY_URL", "14-day Domain List"),
    (
        "nrd-phishing-30day",
        "PHISHING_30DAY_URL",
        "30-day Phishing Domain List",
    ),
    (
        "nrd-phishing-14day",
        "PHISHING_14DAY_URL",
        "14-day Phishing Domain List",
    ),
];

/// Build the built-in feeds, looking up each URL with `lookup`
///
/// Feeds whose URL is unset or blank are skipped with a warning.
pub fn default_feeds_with(lookup: impl Fn(&str) -> Option<String>) -> Vec<FeedSpec> {
    DEFAULT_FEEDS
        .iter()
        .filter_map(|&(name, var, description)| {
            let url = lookup(var)
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty());
            let Some(url) = url else {
                warn!(feed = name, variable = var, "feed URL not set, skipping feed");
                return None;
            };
            Some(FeedSpec {
                name: name.to_string(),
                url,
                description: description.to_string(),
                expected_entry: name.to_string(),
            })
        })
        .collect()
}

/// Built-in feeds with URLs from the process environment
pub fn default_feeds_from_env() -> Vec<FeedSpec> {
    default_feeds_with(|var| std::env::var(var).ok())
}

/// Filesystem locations
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory for generated artifacts (default: "output")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Scratch directory for extracted bundle entries (default: "temp")
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Fingerprint store (default: "output/.fingerprints.json")
    #[serde(default = "default_fingerprint_file")]
    pub fingerprint_file: PathBuf,

    /// Exclusion list, one domain per line (default: "lists/exclusion")
    #[serde(default = "default_exclusion_file")]
    pub exclusion_file: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            temp_dir: default_temp_dir(),
            fingerprint_file: default_fingerprint_file(),
            exclusion_file: default_exclusion_file(),
        }
    }
}

/// HTTP client settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Upper bound for a single probe or fetch (default: 120 seconds)
    #[serde(default = "default_http_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// User-Agent header
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: default_http_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Bundle extraction settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Regexes matched against flattened member names; matches are dropped
    #[serde(default = "default_archive_exclude")]
    pub exclude: Vec<String>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            exclude: default_archive_exclude(),
        }
    }
}

/// Artifact output settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Attribution written into every header
    #[serde(default = "default_author")]
    pub author: String,

    /// Per-(feed, format) split policy
    #[serde(default)]
    pub split: SplitPolicy,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            author: default_author(),
            split: SplitPolicy::default(),
        }
    }
}

/// Main configuration
///
/// Every section has defaults, so `{}` is a valid configuration file; an
/// empty `feeds` list is filled from the environment by the binary.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Feeds to process, in order
    #[serde(default)]
    pub feeds: Vec<FeedSpec>,

    /// Filesystem locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Bundle extraction settings
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// Artifact output settings
    #[serde(default)]
    pub output: OutputConfig,

    /// Feeds processed at the same time (default: 1, strictly sequential)
    #[serde(default = "default_max_concurrent_feeds")]
    pub max_concurrent_feeds: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feeds: Vec::new(),
            paths: PathsConfig::default(),
            http: HttpConfig::default(),
            archive: ArchiveConfig::default(),
            output: OutputConfig::default(),
            max_concurrent_feeds: default_max_concurrent_feeds(),
        }
    }
}

impl Config {
    /// Defaults plus the built-in feeds from the environment
    pub fn from_env() -> Self {
        Self {
            feeds: default_feeds_from_env(),
            ..Self::default()
        }
    }

    /// Load a JSON configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::fs(path, e))?;
        serde_json::from_str(&text).map_err(|e| Error::Config {
            message: format!("cannot parse {}: {}", path.display(), e),
            key: None,
        })
    }

    /// Check the configuration before a run
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_feeds == 0 {
            return Err(Error::config(
                "max_concurrent_feeds must be at least 1",
                "max_concurrent_feeds",
            ));
        }

        let mut names = HashSet::new();
        for (i, feed) in self.feeds.iter().enumerate() {
            if feed.name.trim().is_empty() {
                return Err(Error::config("feed name is empty", format!("feeds[{i}].name")));
            }
            if feed.name.contains(['/', '\\']) {
                return Err(Error::config(
                    format!("feed name '{}' must not contain path separators", feed.name),
                    format!("feeds[{i}].name"),
                ));
            }
            if !names.insert(feed.name.as_str()) {
                return Err(Error::config(
                    format!("duplicate feed name '{}'", feed.name),
                    format!("feeds[{i}].name"),
                ));
            }
            if let Err(e) = url::Url::parse(&feed.url) {
                return Err(Error::config(
                    format!("invalid URL for feed '{}': {}", feed.name, e),
                    format!("feeds[{i}].url"),
                ));
            }
            if feed.expected_entry.is_empty() || feed.expected_entry.contains(['/', '\\']) {
                return Err(Error::config(
                    format!(
                        "expected entry for feed '{}' must be a bare file name",
                        feed.name
                    ),
                    format!("feeds[{i}].expected_entry"),
                ));
            }
        }

        self.output.split.validate()?;
        ArchiveExclusions::compile(&self.archive.exclude)?;
        Ok(())
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("temp")
}

fn default_fingerprint_file() -> PathBuf {
    PathBuf::from("output/.fingerprints.json")
}

fn default_exclusion_file() -> Option<PathBuf> {
    Some(PathBuf::from("lists/exclusion"))
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_user_agent() -> String {
    format!("nrd-blocklists/{}", env!("CARGO_PKG_VERSION"))
}

fn default_archive_exclude() -> Vec<String> {
    vec![r"\.rules$".to_string(), "^COPYRIGHT$".to_string()]
}

fn default_author() -> String {
    "nrd-blocklists".to_string()
}

fn default_max_concurrent_feeds() -> usize {
    1
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
