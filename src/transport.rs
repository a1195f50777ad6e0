//! Fetch capability
//!
//! The pipeline only needs two operations from the network: a metadata probe
//! that may expose a validator token, and a full download. [`HttpTransport`]
//! implements both over reqwest; tests substitute their own [`Transport`].

use crate::config::HttpConfig;
use crate::error::{Error, Result, TransportError};
use async_trait::async_trait;
use reqwest::header::{ETAG, HeaderMap, LAST_MODIFIED};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Result of a metadata probe
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeResult {
    /// HTTP status code
    pub status: u16,
    /// Content validator, if the server exposes one
    pub validator: Option<String>,
}

/// Result of a download
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Full body
    Body(Vec<u8>),
    /// The server reports no such resource
    NotFound,
}

/// Network operations the pipeline depends on
#[async_trait]
pub trait Transport: Send + Sync {
    /// Probe `url` for metadata without downloading the body
    ///
    /// # Errors
    ///
    /// Unreachable server, timeout, or a non-success status.
    async fn probe(&self, url: &str) -> Result<ProbeResult>;

    /// Download `url`
    ///
    /// # Errors
    ///
    /// Unreachable server, timeout, or a non-success status other than 404.
    async fn fetch(&self, url: &str) -> Result<FetchOutcome>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Validator token from response headers: ETag, else Last-Modified
pub fn validator_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ETAG)
        .or_else(|| headers.get(LAST_MODIFIED))
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Build a transport from the HTTP settings
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            timeout: config.timeout,
        })
    }

    async fn bounded<T, F>(&self, url: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| {
                Error::Transport(TransportError::Timeout {
                    url: url.to_string(),
                    after: self.timeout,
                })
            })?
    }

    async fn head(&self, url: &str) -> Result<ProbeResult> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| self.request_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Transport(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }));
        }

        let validator = validator_from_headers(response.headers());
        debug!(url, status = status.as_u16(), ?validator, "probed feed");
        Ok(ProbeResult {
            status: status.as_u16(),
            validator,
        })
    }

    async fn get(&self, url: &str) -> Result<FetchOutcome> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.request_error(url, e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(FetchOutcome::NotFound);
        }
        if !status.is_success() {
            return Err(Error::Transport(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.request_error(url, e))?;
        debug!(url, bytes = body.len(), "downloaded feed bundle");
        Ok(FetchOutcome::Body(body.to_vec()))
    }

    fn request_error(&self, url: &str, source: reqwest::Error) -> Error {
        if source.is_timeout() {
            return Error::Transport(TransportError::Timeout {
                url: url.to_string(),
                after: self.timeout,
            });
        }
        Error::Transport(TransportError::Request {
            url: url.to_string(),
            source,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn probe(&self, url: &str) -> Result<ProbeResult> {
        self.bounded(url, self.head(url)).await
    }

    async fn fetch(&self, url: &str) -> Result<FetchOutcome> {
        self.bounded(url, self.get(url)).await
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
