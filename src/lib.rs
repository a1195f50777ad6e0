//! # nrd-blocklists
//!
//! Turns newly-registered-domain feeds into ready-to-publish blocklists.
//!
//! Each configured feed is a compressed bundle whose main entry holds one
//! base64-encoded record per line. A run probes every feed for changes,
//! downloads the changed ones, extracts and normalizes the domains they
//! mention, renders them in five blocklist formats and splits the results
//! into parts.
//!
//! ## Pipeline
//!
//! ```text
//! probe ─▶ fetch ─▶ extract ─▶ decode ─▶ render ─▶ split ─▶ record fingerprint
//!   │
//!   └─▶ unchanged: skip
//! ```
//!
//! Failures are isolated per feed: one broken feed never stops the others,
//! and its fingerprint is left untouched so the next run retries it.
//!
//! ## Quick Start
//!
//! ```no_run
//! use nrd_blocklists::{Config, FeedPipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = FeedPipeline::new(Config::from_env())?;
//!
//!     // Subscribe to events
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = pipeline.run().await?;
//!     for file in summary.files() {
//!         println!("{}", file.display());
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Archive capability (bundle extraction)
pub mod archive;
/// Change detection via validator tokens
pub mod change_detector;
/// Configuration types
pub mod config;
/// Feed decoding and exclusion lists
pub mod decoder;
/// Domain extraction and normalization
pub mod domains;
/// Error types
pub mod error;
/// Persisted fingerprint store
pub mod fingerprint;
/// Feed pipeline orchestration
pub mod pipeline;
/// Multi-format rendering
pub mod render;
/// Periodic runs
pub mod scheduler;
/// Artifact splitting and split policy
pub mod splitter;
/// Fetch capability
pub mod transport;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use archive::{ArchiveExclusions, BundleExtractor, TarGzExtractor};
pub use change_detector::{ChangeDetector, ChangeStatus};
pub use config::{Config, FeedSpec};
pub use decoder::{DecodeStats, DecodedFeed, FeedDecoder};
pub use error::{ArchiveError, Classify, Error, Result, TransportError};
pub use fingerprint::FingerprintStore;
pub use pipeline::FeedPipeline;
pub use render::{MultiFormatRenderer, RenderedArtifact};
pub use scheduler::Scheduler;
pub use splitter::{SplitAction, SplitPolicy, SplitRule};
pub use transport::{FetchOutcome, HttpTransport, ProbeResult, Transport};
pub use types::{DomainSet, Event, FeedReport, FeedState, FormatKind, RunSummary};

/// Run the scheduler until a termination signal arrives.
///
/// The signal cancels the scheduler's shutdown token; a run in progress is
/// finished first. Returns the number of completed runs.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(scheduler: Scheduler) -> usize {
    let token = scheduler.shutdown_token();
    tokio::spawn(async move {
        wait_for_signal().await;
        token.cancel();
    });
    scheduler.run().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
