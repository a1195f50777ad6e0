//! Periodic pipeline runs
//!
//! The scheduler runs the pipeline, sleeps for the configured interval and
//! repeats until its shutdown token is cancelled. Runs are awaited one after
//! another, so they never overlap; a run in progress is allowed to finish
//! before shutdown completes.
//!
//! # Example
//!
//! ```no_run
//! use nrd_blocklists::{Config, FeedPipeline, Scheduler, run_with_shutdown};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = FeedPipeline::new(Config::from_env())?;
//! let scheduler = Scheduler::new(pipeline, Duration::from_secs(6 * 60 * 60));
//!
//! // Blocks until SIGTERM/SIGINT
//! run_with_shutdown(scheduler).await;
//! # Ok(())
//! # }
//! ```

use crate::error::{Classify, Error};
use crate::pipeline::FeedPipeline;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Runs a [`FeedPipeline`] on a fixed interval
pub struct Scheduler {
    pipeline: Arc<FeedPipeline>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl Scheduler {
    /// Create a scheduler running `pipeline` every `interval`
    pub fn new(pipeline: FeedPipeline, interval: Duration) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            interval,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the loop when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// The scheduled pipeline
    pub fn pipeline(&self) -> &FeedPipeline {
        &self.pipeline
    }

    /// Run until shutdown, returning the number of completed runs
    ///
    /// Run-level failures are logged and retried on the next tick.
    pub async fn run(self) -> usize {
        info!(interval_secs = self.interval.as_secs(), "scheduler started");
        let mut runs = 0;

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            match self.pipeline.run().await {
                Ok(summary) => {
                    runs += 1;
                    if !summary.is_success() {
                        warn!(
                            failed = summary.failed(),
                            "run finished with failed feeds, retrying them next interval"
                        );
                    }
                }
                Err(Error::RunLocked(path)) => {
                    warn!(lock = %path.display(), "another run holds the lock, skipping this tick");
                }
                Err(e) => {
                    error!(code = e.error_code(), error = %e, "run failed");
                }
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = sleep(self.interval) => {}
            }
        }

        info!(runs, "scheduler stopped");
        runs
    }
}
