//! Change detection via validator tokens
//!
//! A feed is probed before it is downloaded. When the server's validator token
//! matches the one recorded on the last successful cycle, the download is
//! skipped. Missing tokens always count as changed, and a failed probe is an
//! error rather than a guess.

use crate::error::Result;
use crate::fingerprint::FingerprintStore;
use crate::transport::Transport;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Outcome of a change check
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeStatus {
    /// Remote content matches the recorded token
    Unchanged {
        /// The matching token
        token: String,
    },
    /// Remote content changed, or no token is available to compare
    Changed {
        /// Fresh token to record after a successful cycle
        token: Option<String>,
    },
}

impl ChangeStatus {
    /// Whether the feed needs a full fetch
    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Changed { .. })
    }

    /// Token reported by the probe
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Unchanged { token } => Some(token),
            Self::Changed { token } => token.as_deref(),
        }
    }
}

/// Compares probed validator tokens against the fingerprint store
#[derive(Clone)]
pub struct ChangeDetector {
    transport: Arc<dyn Transport>,
    store: Arc<Mutex<FingerprintStore>>,
}

impl ChangeDetector {
    /// Create a detector over `transport` and the shared `store`
    pub fn new(transport: Arc<dyn Transport>, store: Arc<Mutex<FingerprintStore>>) -> Self {
        Self { transport, store }
    }

    /// Probe `url` and compare with the recorded token
    ///
    /// # Errors
    ///
    /// Any probe failure. The store is never modified here.
    pub async fn check(&self, url: &str) -> Result<ChangeStatus> {
        let probe = self.transport.probe(url).await?;

        let Some(token) = probe.validator else {
            debug!(url, "no validator token, treating as changed");
            return Ok(ChangeStatus::Changed { token: None });
        };

        let store = self.store.lock().await;
        if store.token(url) == Some(token.as_str()) {
            debug!(url, token = %token, "validator unchanged");
            Ok(ChangeStatus::Unchanged { token })
        } else {
            debug!(url, previous = ?store.token(url), token = %token, "validator changed");
            Ok(ChangeStatus::Changed { token: Some(token) })
        }
    }

    /// Record the token of a successfully processed feed and persist the store
    ///
    /// A status without a token leaves the store untouched. If persisting
    /// fails, the previous record for `url` is restored in memory so a later
    /// flush cannot write the uncommitted token.
    pub async fn commit(&self, url: &str, status: &ChangeStatus) -> Result<()> {
        let Some(token) = status.token() else {
            return Ok(());
        };
        let mut store = self.store.lock().await;
        let previous = store.get(url).cloned();
        store.record(url, token);
        if let Err(e) = store.flush() {
            warn!(url, error = %e, "failed to persist fingerprint, keeping previous record");
            store.restore(url, previous);
            return Err(e);
        }
        Ok(())
    }
}
