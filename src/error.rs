//! Error types for nrd-blocklists
//!
//! This module provides the error taxonomy for the pipeline:
//! - Feed-level errors (transport, archive, filesystem) that abort one feed's cycle
//! - Line-level and token-level errors that never leave their component
//! - Run-level errors (configuration, run lock) that stop a whole run
//! - Stable error codes for run summaries

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for nrd-blocklists operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for nrd-blocklists
///
/// Each variant carries enough context (URL, path, feed) to diagnose the
/// failure from a log line alone.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "feeds[0].url")
        key: Option<String>,
    },

    /// Probe or fetch failed
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Bundle could not be extracted or lacks the expected entry
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Reading or writing a specific file failed
    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        /// The file or directory involved
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// I/O error without a known path
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Fingerprint store or config (de)serialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Another run holds the run lock
    #[error("another run is in progress (lock file {})", .0.display())]
    RunLocked(PathBuf),

    /// A blocking stage panicked or was cancelled
    #[error("task failed: {0}")]
    Task(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap an I/O error with the path it happened on
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Shorthand for a configuration error tied to a key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Transport failures (probe or fetch)
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be sent or the body could not be read
    #[error("request to {url} failed: {source}")]
    Request {
        /// The URL being requested
        url: String,
        /// Underlying HTTP client error
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status
    #[error("{url} returned HTTP {status}")]
    Status {
        /// The URL being requested
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// The server reported that the resource does not exist
    #[error("{url} not found")]
    NotFound {
        /// The URL being requested
        url: String,
    },

    /// The request did not complete within the configured bound
    #[error("{url} timed out after {}s", after.as_secs())]
    Timeout {
        /// The URL being requested
        url: String,
        /// The bound that expired
        after: Duration,
    },
}

/// Bundle extraction failures
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The bundle is not a readable compressed archive
    #[error("corrupt bundle: {reason}")]
    Corrupt {
        /// What went wrong while reading the archive
        reason: String,
    },

    /// The bundle does not contain the entry the feed expects
    #[error("bundle has no entry named {name}")]
    MissingEntry {
        /// The expected (flattened) entry name
        name: String,
    },
}

/// A single feed line that could not be decoded
///
/// Line-level: counted and skipped by the decoder, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: invalid base64: {reason}")]
pub struct DecodeError {
    /// 1-based line number in the feed file
    pub line: usize,
    /// Decoder message
    pub reason: String,
}

/// A domain token that failed IDNA conversion
///
/// Token-level: the extractor keeps the raw token instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot encode {token} as ASCII: {reason}")]
pub struct EncodingError {
    /// The raw token as matched
    pub token: String,
    /// IDNA processing message
    pub reason: String,
}

/// Classification of errors for reporting
pub trait Classify {
    /// Stable machine-readable code, used in run summaries
    fn error_code(&self) -> &'static str;
}

impl Classify for Error {
    fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Transport(TransportError::Timeout { .. }) => "transport_timeout",
            Error::Transport(TransportError::NotFound { .. }) => "transport_not_found",
            Error::Transport(_) => "transport_error",
            Error::Archive(ArchiveError::MissingEntry { .. }) => "archive_missing_entry",
            Error::Archive(ArchiveError::Corrupt { .. }) => "archive_corrupt",
            Error::Filesystem { .. } | Error::Io(_) => "filesystem_error",
            Error::Serialization(_) => "serialization_error",
            Error::RunLocked(_) => "run_locked",
            Error::Task(_) => "task_failed",
            Error::Other(_) => "internal_error",
        }
    }
}
