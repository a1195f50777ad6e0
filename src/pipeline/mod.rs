//! Feed pipeline orchestration
//!
//! One run takes every configured feed through
//! `Pending → Probed → {Skipped | Fetched} → Extracted → Rendered → Split → Done`.
//! A feed that hits an error moves to `Failed`; the others are unaffected and
//! the run reports the failure in its [`RunSummary`].
//!
//! Runs are exclusive: a lock file in the output directory keeps a second run
//! from racing on the same fingerprint store and artifacts.

use crate::archive::{self, ArchiveExclusions, BundleExtractor, TarGzExtractor};
use crate::change_detector::{ChangeDetector, ChangeStatus};
use crate::config::{Config, FeedSpec};
use crate::decoder::{self, DecodedFeed, FeedDecoder};
use crate::error::{Classify, Error, Result, TransportError};
use crate::fingerprint::FingerprintStore;
use crate::render::{self, MultiFormatRenderer, RenderedArtifact};
use crate::splitter::{self, SplitAction, SplitPolicy};
use crate::transport::{FetchOutcome, HttpTransport, Transport};
use crate::types::{Event, FeedReport, FeedState, RunSummary};
use crate::utils::{self, RunLock};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tokio::task::spawn_blocking;
use tracing::{debug, error, info, warn};

/// Name of the run lock file inside the output directory
pub const LOCK_FILE_NAME: &str = ".nrd-blocklists.lock";

/// Runs feeds through fetch, decode, render and split
pub struct FeedPipeline {
    config: Arc<Config>,
    transport: Arc<dyn Transport>,
    extractor: Arc<dyn BundleExtractor>,
    event_tx: broadcast::Sender<Event>,
    force: bool,
}

/// State shared by all feeds of one run
struct RunContext {
    decoder: FeedDecoder,
    renderer: MultiFormatRenderer,
    detector: ChangeDetector,
    exclusions: Arc<ArchiveExclusions>,
    split: Arc<SplitPolicy>,
    generated_at: DateTime<Utc>,
}

impl FeedPipeline {
    /// Create a pipeline with the HTTP transport and tar.gz extractor
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or the HTTP client
    /// cannot be built
    pub fn new(config: Config) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(&config.http)?);
        Self::with_components(config, transport, Arc::new(TarGzExtractor))
    }

    /// Create a pipeline over custom transport and extractor implementations
    pub fn with_components(
        config: Config,
        transport: Arc<dyn Transport>,
        extractor: Arc<dyn BundleExtractor>,
    ) -> Result<Self> {
        config.validate()?;
        let (event_tx, _rx) = broadcast::channel(1000);
        Ok(Self {
            config: Arc::new(config),
            transport,
            extractor,
            event_tx,
            force: false,
        })
    }

    /// Treat every feed as changed, ignoring recorded fingerprints
    ///
    /// Fresh tokens are still recorded after each successful feed.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Subscribe to pipeline events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Path of the run lock file
    pub fn lock_path(&self) -> PathBuf {
        self.config.paths.output_dir.join(LOCK_FILE_NAME)
    }

    /// Run every configured feed once
    ///
    /// # Errors
    ///
    /// Only run-level failures: another run holds the lock, the working
    /// directories cannot be created, or the exclusion list is unreadable.
    /// Feed failures are reported in the returned summary.
    pub async fn run(&self) -> Result<RunSummary> {
        let paths = &self.config.paths;
        utils::ensure_dir(&paths.output_dir)?;
        let _lock = RunLock::acquire(self.lock_path())?;
        utils::ensure_dir(&paths.temp_dir)?;

        let ctx = Arc::new(self.prepare()?);
        info!(
            feeds = self.config.feeds.len(),
            concurrency = self.config.max_concurrent_feeds,
            exclusions = ctx.decoder.exclusion_count(),
            force = self.force,
            transport = self.transport.name(),
            extractor = self.extractor.name(),
            "starting run"
        );

        let mut reports: Vec<(usize, FeedReport)> =
            stream::iter(self.config.feeds.iter().cloned().enumerate())
                .map(|(index, feed)| {
                    let ctx = ctx.clone();
                    async move { (index, self.process_feed(&ctx, &feed).await) }
                })
                .buffer_unordered(self.config.max_concurrent_feeds)
                .collect()
                .await;
        reports.sort_by_key(|(index, _)| *index);

        if utils::remove_dir_if_empty(&paths.temp_dir) {
            debug!(path = %paths.temp_dir.display(), "removed temp directory");
        }

        let summary = RunSummary {
            reports: reports.into_iter().map(|(_, report)| report).collect(),
        };
        self.emit(Event::RunComplete {
            done: summary.done(),
            skipped: summary.skipped(),
            failed: summary.failed(),
        });

        if summary.is_success() {
            info!(
                done = summary.done(),
                skipped = summary.skipped(),
                files = summary.files().count(),
                "run complete"
            );
        } else {
            warn!(
                done = summary.done(),
                skipped = summary.skipped(),
                failed = summary.failed(),
                "run complete with failed feeds"
            );
        }
        Ok(summary)
    }

    fn prepare(&self) -> Result<RunContext> {
        let paths = &self.config.paths;

        let store = match FingerprintStore::load(&paths.fingerprint_file) {
            Ok(store) => store,
            Err(e) => {
                warn!(
                    path = %paths.fingerprint_file.display(),
                    error = %e,
                    "fingerprint store unreadable, every feed will be treated as changed"
                );
                FingerprintStore::empty(&paths.fingerprint_file)
            }
        };

        let exclusions = match &paths.exclusion_file {
            Some(path) => decoder::load_exclusions(path)?,
            None => HashSet::new(),
        };

        Ok(RunContext {
            decoder: FeedDecoder::new(Arc::new(exclusions)),
            renderer: MultiFormatRenderer::new(self.config.output.author.clone()),
            detector: ChangeDetector::new(self.transport.clone(), Arc::new(Mutex::new(store))),
            exclusions: Arc::new(ArchiveExclusions::compile(&self.config.archive.exclude)?),
            split: Arc::new(self.config.output.split.clone()),
            generated_at: Utc::now(),
        })
    }

    async fn process_feed(&self, ctx: &RunContext, feed: &FeedSpec) -> FeedReport {
        let mut tracker = FeedTracker::new(&feed.name, &self.event_tx);
        let scratch = self.config.paths.temp_dir.join(&feed.name);

        if let Err(e) = self.cycle(ctx, feed, &scratch, &mut tracker).await {
            tracker.fail(&e);
        }

        if let Err(e) = utils::remove_dir(&scratch) {
            warn!(feed = %feed.name, error = %e, "failed to clean up scratch directory");
        }
        tracker.report
    }

    async fn cycle(
        &self,
        ctx: &RunContext,
        feed: &FeedSpec,
        scratch: &Path,
        tracker: &mut FeedTracker<'_>,
    ) -> Result<()> {
        let status = match ctx.detector.check(&feed.url).await? {
            ChangeStatus::Unchanged { token } if self.force => {
                debug!(feed = %feed.name, "unchanged but forced");
                ChangeStatus::Changed { token: Some(token) }
            }
            status => status,
        };
        tracker.advance(FeedState::Probed);

        if !status.is_changed() {
            tracker.advance(FeedState::Skipped);
            return Ok(());
        }

        let bundle = match self.transport.fetch(&feed.url).await? {
            FetchOutcome::Body(bytes) => bytes,
            FetchOutcome::NotFound => {
                return Err(Error::Transport(TransportError::NotFound {
                    url: feed.url.clone(),
                }));
            }
        };
        debug!(
            feed = %feed.name,
            bundle = %utils::bundle_name(&feed.url),
            bytes = bundle.len(),
            "fetched bundle"
        );
        tracker.advance(FeedState::Fetched);

        let decoded = self.extract(ctx, feed, scratch, bundle).await?;
        tracker.report.stats = Some(decoded.stats);
        tracker.report.entries = decoded.len();
        tracker.advance(FeedState::Extracted);

        let written = self.render(ctx, feed, decoded).await?;
        tracker.advance(FeedState::Rendered);

        tracker.report.files = self.split(ctx, feed, written).await?;
        tracker.advance(FeedState::Split);

        ctx.detector.commit(&feed.url, &status).await?;
        tracker.advance(FeedState::Done);
        Ok(())
    }

    async fn extract(
        &self,
        ctx: &RunContext,
        feed: &FeedSpec,
        scratch: &Path,
        bundle: Vec<u8>,
    ) -> Result<DecodedFeed> {
        let extractor = self.extractor.clone();
        let exclusions = ctx.exclusions.clone();
        let decoder = ctx.decoder.clone();
        let entry = feed.expected_entry.clone();
        let scratch = scratch.to_path_buf();

        spawn_blocking(move || -> Result<DecodedFeed> {
            let path =
                archive::unpack_entry(extractor.as_ref(), &bundle, &exclusions, &entry, &scratch)?;
            decoder.decode_file(&path)
        })
        .await
        .map_err(|e| Error::Task(format!("extraction task panicked: {}", e)))?
    }

    async fn render(
        &self,
        ctx: &RunContext,
        feed: &FeedSpec,
        decoded: DecodedFeed,
    ) -> Result<Vec<(PathBuf, RenderedArtifact)>> {
        let renderer = ctx.renderer.clone();
        let generated_at = ctx.generated_at;
        let output_dir = self.config.paths.output_dir.clone();
        let name = feed.name.clone();
        let description = feed.description.clone();

        spawn_blocking(move || {
            renderer
                .render(&decoded.domains, &description, generated_at)
                .into_iter()
                .map(|artifact| -> Result<(PathBuf, RenderedArtifact)> {
                    let path = render::write_artifact(&output_dir, &name, &artifact)?;
                    Ok((path, artifact))
                })
                .collect::<Result<Vec<_>>>()
        })
        .await
        .map_err(|e| Error::Task(format!("render task panicked: {}", e)))?
    }

    async fn split(
        &self,
        ctx: &RunContext,
        feed: &FeedSpec,
        written: Vec<(PathBuf, RenderedArtifact)>,
    ) -> Result<Vec<PathBuf>> {
        let policy = ctx.split.clone();
        let name = feed.name.clone();

        spawn_blocking(move || -> Result<Vec<PathBuf>> {
            let mut files = Vec::new();
            for (path, artifact) in written {
                match policy.action_for(&name, artifact.kind) {
                    SplitAction::Keep => files.push(path),
                    SplitAction::Parts(parts) => {
                        files.extend(splitter::split_file(&path, &artifact, parts)?);
                    }
                }
            }
            Ok(files)
        })
        .await
        .map_err(|e| Error::Task(format!("split task panicked: {}", e)))?
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

/// Tracks one feed's state and broadcasts every transition
struct FeedTracker<'a> {
    report: FeedReport,
    event_tx: &'a broadcast::Sender<Event>,
}

impl<'a> FeedTracker<'a> {
    fn new(feed: &str, event_tx: &'a broadcast::Sender<Event>) -> Self {
        Self {
            report: FeedReport::new(feed),
            event_tx,
        }
    }

    fn advance(&mut self, next: FeedState) {
        let current = self.report.state;
        if !current.can_transition_to(next) {
            warn!(feed = %self.report.feed, from = %current, to = %next, "unexpected state transition");
        }
        self.report.state = next;

        if next.is_terminal() {
            info!(feed = %self.report.feed, state = %next, entries = self.report.entries, "feed finished");
        } else {
            debug!(feed = %self.report.feed, state = %next, "feed state");
        }
        let _ = self.event_tx.send(Event::FeedState {
            feed: self.report.feed.clone(),
            state: next,
        });
    }

    fn fail(&mut self, e: &Error) {
        error!(
            feed = %self.report.feed,
            state = %self.report.state,
            code = e.error_code(),
            error = %e,
            "feed failed"
        );
        self.report.error = Some(e.to_string());
        self.report.error_code = Some(e.error_code());
        self.report.entries = 0;
        self.advance(FeedState::Failed);
        let _ = self.event_tx.send(Event::FeedFailed {
            feed: self.report.feed.clone(),
            error: e.to_string(),
        });
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
