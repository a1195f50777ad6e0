use super::*;
use crate::config::PathsConfig;
use crate::transport::ProbeResult;
use crate::types::FormatKind;
use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

#[derive(Clone, Default)]
struct Remote {
    validator: Option<String>,
    body: Option<Vec<u8>>,
    probe_fails: bool,
}

/// In-memory transport keyed by URL
#[derive(Default)]
struct MemoryTransport {
    remotes: std::sync::Mutex<HashMap<String, Remote>>,
    fetches: AtomicUsize,
}

impl MemoryTransport {
    fn set(&self, url: &str, remote: Remote) {
        self.remotes.lock().unwrap().insert(url.to_string(), remote);
    }

    fn remote(&self, url: &str) -> Remote {
        self.remotes
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_default()
    }

    fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn probe(&self, url: &str) -> Result<ProbeResult> {
        let remote = self.remote(url);
        if remote.probe_fails {
            return Err(Error::Transport(TransportError::Status {
                url: url.to_string(),
                status: 502,
            }));
        }
        Ok(ProbeResult {
            status: 200,
            validator: remote.validator,
        })
    }

    async fn fetch(&self, url: &str) -> Result<FetchOutcome> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(match self.remote(url).body {
            Some(body) => FetchOutcome::Body(body),
            None => FetchOutcome::NotFound,
        })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

fn url(name: &str) -> String {
    format!("https://feeds.example/{name}.tar.gz")
}

fn feed(name: &str, description: &str) -> FeedSpec {
    FeedSpec {
        name: name.to_string(),
        url: url(name),
        description: description.to_string(),
        expected_entry: name.to_string(),
    }
}

/// Gzipped tar holding `entry` with one base64 line per record, plus noise
fn bundle(entry: &str, records: &[&str]) -> Vec<u8> {
    let body: String = records
        .iter()
        .map(|r| format!("{}\n", decoder::encode(r)))
        .collect();

    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, contents) in [
        (format!("release/{entry}"), body.as_str()),
        (format!("release/{entry}.rules"), "alert dns any"),
        ("release/COPYRIGHT".to_string(), "(c) feed vendor"),
    ] {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, contents.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

fn seven_domains() -> Vec<String> {
    (1..=7).map(|i| format!("host{i}.example")).collect()
}

struct Harness {
    dir: TempDir,
    transport: Arc<MemoryTransport>,
}

impl Harness {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            transport: Arc::new(MemoryTransport::default()),
        }
    }

    fn output(&self) -> PathBuf {
        self.dir.path().join("output")
    }

    fn config(&self, feeds: Vec<FeedSpec>) -> Config {
        Config {
            feeds,
            paths: PathsConfig {
                output_dir: self.output(),
                temp_dir: self.dir.path().join("temp"),
                fingerprint_file: self.dir.path().join("state").join("fingerprints.json"),
                exclusion_file: Some(self.dir.path().join("exclusion")),
            },
            ..Config::default()
        }
    }

    fn pipeline(&self, config: Config) -> FeedPipeline {
        FeedPipeline::with_components(config, self.transport.clone(), Arc::new(TarGzExtractor))
            .unwrap()
    }

    fn publish(&self, name: &str, validator: Option<&str>, records: &[&str]) {
        self.transport.set(
            &url(name),
            Remote {
                validator: validator.map(str::to_string),
                body: Some(bundle(name, records)),
                probe_fails: false,
            },
        );
    }

    fn fingerprints(&self) -> FingerprintStore {
        FingerprintStore::load(self.dir.path().join("state").join("fingerprints.json")).unwrap()
    }

    fn read(&self, file: &str) -> String {
        std::fs::read_to_string(self.output().join(file)).unwrap()
    }
}

fn body_lines(text: &str) -> Vec<&str> {
    text.lines().filter(|l| !l.starts_with('#')).collect()
}

#[tokio::test]
async fn full_cycle_writes_split_artifacts() {
    let h = Harness::new();
    let domains = seven_domains();
    let records: Vec<&str> = domains.iter().map(String::as_str).collect();
    h.publish("nrd-30day", Some("\"v1\""), &records);

    let summary = h
        .pipeline(h.config(vec![feed("nrd-30day", "30-day Domain List")]))
        .run()
        .await
        .unwrap();

    let report = &summary.reports[0];
    assert_eq!(report.state, FeedState::Done, "{:?}", report.error);
    assert_eq!(report.entries, 7);
    assert_eq!(report.stats.unwrap().lines, 7);
    // four formats in 2 parts, unbound in 3
    assert_eq!(report.files.len(), 11);
    assert!(summary.is_success());

    let unbound: Vec<usize> = (1..=3)
        .map(|i| body_lines(&h.read(&format!("nrd-30day_unbound_part{i}.txt"))).len())
        .collect();
    assert_eq!(unbound, vec![2, 2, 3]);
    assert!(!h.output().join("nrd-30day_unbound.txt").exists());
    assert!(!h.output().join("nrd-30day_unbound_part4.txt").exists());

    let mut plain: Vec<String> = Vec::new();
    for i in 1..=2 {
        let text = h.read(&format!("nrd-30day_txt_part{i}.txt"));
        assert!(text.starts_with(&format!(
            "# Title: 30-day Domain List (Plain, part {i} of 2)"
        )));
        plain.extend(body_lines(&text).into_iter().map(str::to_string));
    }
    assert_eq!(plain, domains);

    assert_eq!(h.fingerprints().token(&url("nrd-30day")), Some("\"v1\""));
    assert!(!h.dir.path().join("temp").exists());
    assert!(!h.output().join(LOCK_FILE_NAME).exists());
}

#[tokio::test]
async fn unchanged_feed_is_skipped() {
    let h = Harness::new();
    h.publish("nrd-14day", Some("\"same\""), &["a.example", "b.example"]);
    let pipeline = h.pipeline(h.config(vec![feed("nrd-14day", "14-day Domain List")]));

    let first = pipeline.run().await.unwrap();
    assert_eq!(first.done(), 1);
    let before = h.read("nrd-14day_adblock_part1.txt");

    let second = pipeline.run().await.unwrap();
    assert_eq!(second.skipped(), 1);
    assert!(second.reports[0].files.is_empty());
    assert_eq!(h.transport.fetch_count(), 1);
    assert_eq!(h.read("nrd-14day_adblock_part1.txt"), before);
    assert_eq!(h.fingerprints().token(&url("nrd-14day")), Some("\"same\""));
}

#[tokio::test]
async fn changed_validator_refetches() {
    let h = Harness::new();
    h.publish("nrd-14day", Some("\"v1\""), &["a.example"]);
    let pipeline = h.pipeline(h.config(vec![feed("nrd-14day", "14-day Domain List")]));
    pipeline.run().await.unwrap();

    h.publish("nrd-14day", Some("\"v2\""), &["a.example", "c.example"]);
    let summary = pipeline.run().await.unwrap();

    assert_eq!(summary.done(), 1);
    assert_eq!(summary.reports[0].entries, 2);
    assert_eq!(h.transport.fetch_count(), 2);
    assert_eq!(h.fingerprints().token(&url("nrd-14day")), Some("\"v2\""));
}

#[tokio::test]
async fn force_ignores_fingerprints() {
    let h = Harness::new();
    h.publish("nrd-14day", Some("\"same\""), &["a.example"]);
    let config = h.config(vec![feed("nrd-14day", "14-day Domain List")]);
    h.pipeline(config.clone()).run().await.unwrap();

    let summary = h.pipeline(config).with_force(true).run().await.unwrap();
    assert_eq!(summary.done(), 1);
    assert_eq!(h.transport.fetch_count(), 2);
    assert_eq!(h.fingerprints().token(&url("nrd-14day")), Some("\"same\""));
}

#[tokio::test]
async fn missing_validator_always_reprocesses() {
    let h = Harness::new();
    h.publish("nrd-14day", None, &["a.example"]);
    let pipeline = h.pipeline(h.config(vec![feed("nrd-14day", "14-day Domain List")]));

    assert_eq!(pipeline.run().await.unwrap().done(), 1);
    assert_eq!(pipeline.run().await.unwrap().done(), 1);
    assert_eq!(h.transport.fetch_count(), 2);
    assert!(h.fingerprints().is_empty());
}

#[tokio::test]
async fn failures_are_isolated_per_feed() {
    let h = Harness::new();
    h.publish("nrd-30day", Some("\"ok\""), &["good.example"]);
    h.transport.set(
        &url("nrd-14day"),
        Remote {
            probe_fails: true,
            ..Remote::default()
        },
    );
    // bundle without the expected entry
    h.transport.set(
        &url("nrd-phishing-30day"),
        Remote {
            validator: Some("\"x\"".into()),
            body: Some(bundle("something-else", &["a.example"])),
            probe_fails: false,
        },
    );
    h.transport.set(
        &url("nrd-phishing-14day"),
        Remote {
            validator: Some("\"y\"".into()),
            body: None,
            probe_fails: false,
        },
    );

    let summary = h
        .pipeline(h.config(vec![
            feed("nrd-30day", "30-day Domain List"),
            feed("nrd-14day", "14-day Domain List"),
            feed("nrd-phishing-30day", "30-day Phishing Domain List"),
            feed("nrd-phishing-14day", "14-day Phishing Domain List"),
        ]))
        .run()
        .await
        .unwrap();

    let states: Vec<FeedState> = summary.reports.iter().map(|r| r.state).collect();
    assert_eq!(
        states,
        vec![
            FeedState::Done,
            FeedState::Failed,
            FeedState::Failed,
            FeedState::Failed
        ]
    );
    let codes: Vec<Option<&str>> = summary.reports.iter().map(|r| r.error_code).collect();
    assert_eq!(
        codes,
        vec![
            None,
            Some("transport_error"),
            Some("archive_missing_entry"),
            Some("transport_not_found")
        ]
    );
    assert_eq!(summary.failed(), 3);
    assert!(!summary.is_success());

    let store = h.fingerprints();
    assert_eq!(store.token(&url("nrd-30day")), Some("\"ok\""));
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn failed_feed_keeps_previous_fingerprint() {
    let h = Harness::new();
    h.publish("nrd-14day", Some("\"v1\""), &["a.example"]);
    let pipeline = h.pipeline(h.config(vec![feed("nrd-14day", "14-day Domain List")]));
    pipeline.run().await.unwrap();

    h.transport.set(
        &url("nrd-14day"),
        Remote {
            validator: Some("\"v2\"".into()),
            body: Some(b"not a tarball".to_vec()),
            probe_fails: false,
        },
    );
    let summary = pipeline.run().await.unwrap();

    assert_eq!(summary.reports[0].error_code, Some("archive_corrupt"));
    assert_eq!(h.fingerprints().token(&url("nrd-14day")), Some("\"v1\""));
    assert!(!h.dir.path().join("temp").join("nrd-14day").exists());
}

#[tokio::test]
async fn exclusions_never_reach_artifacts() {
    let h = Harness::new();
    std::fs::write(
        h.dir.path().join("exclusion"),
        "# allowlisted\nsafe.example\n",
    )
    .unwrap();
    h.publish(
        "nrd-14day",
        Some("\"v1\""),
        &["safe.example", "bad.example", "alert dns (content:\"safe.example\";)"],
    );

    let summary = h
        .pipeline(h.config(vec![feed("nrd-14day", "14-day Domain List")]))
        .run()
        .await
        .unwrap();

    let report = &summary.reports[0];
    assert_eq!(report.entries, 1);
    assert_eq!(report.stats.unwrap().excluded, 1);
    for path in &report.files {
        let text = std::fs::read_to_string(path).unwrap();
        assert!(!text.contains("safe.example"), "{}", path.display());
        assert!(!text.contains(&decoder::encode("safe.example")));
    }
}

#[tokio::test]
async fn empty_feed_gives_header_only_parts() {
    let h = Harness::new();
    h.publish("nrd-phishing-30day", Some("\"e\""), &[]);

    let summary = h
        .pipeline(h.config(vec![feed(
            "nrd-phishing-30day",
            "30-day Phishing Domain List",
        )]))
        .run()
        .await
        .unwrap();

    let report = &summary.reports[0];
    assert_eq!(report.state, FeedState::Done);
    assert_eq!(report.entries, 0);
    assert_eq!(report.files.len(), 11);
    for path in &report.files {
        let text = std::fs::read_to_string(path).unwrap();
        assert!(body_lines(&text).is_empty());
        assert!(text.contains("# Entries: 0"));
    }
}

#[tokio::test]
async fn keep_rule_leaves_artifact_whole() {
    let h = Harness::new();
    h.publish("nrd-phishing-14day", Some("\"k\""), &["a.example", "b.example"]);
    let mut config = h.config(vec![feed(
        "nrd-phishing-14day",
        "14-day Phishing Domain List",
    )]);
    config.output.split.rules.insert(
        0,
        crate::splitter::SplitRule {
            feed: Some("phishing-14day".into()),
            format: Some(FormatKind::Adblock),
            action: SplitAction::Keep,
        },
    );

    let summary = h.pipeline(config).run().await.unwrap();

    assert_eq!(summary.reports[0].files.len(), 9);
    assert_eq!(
        body_lines(&h.read("nrd-phishing-14day_adblock.txt")),
        vec!["||a.example^", "||b.example^"]
    );
    assert!(!h.output().join("nrd-phishing-14day_adblock_part1.txt").exists());
}

#[tokio::test]
async fn emits_state_events_in_order() {
    let h = Harness::new();
    h.publish("nrd-14day", Some("\"v1\""), &["a.example"]);
    let pipeline = h.pipeline(h.config(vec![feed("nrd-14day", "14-day Domain List")]));
    let mut events = pipeline.subscribe();

    pipeline.run().await.unwrap();

    let mut states = Vec::new();
    let mut complete = None;
    while let Ok(event) = events.try_recv() {
        match event {
            Event::FeedState { feed, state } => {
                assert_eq!(feed, "nrd-14day");
                states.push(state);
            }
            Event::RunComplete {
                done,
                skipped,
                failed,
            } => complete = Some((done, skipped, failed)),
            Event::FeedFailed { .. } => panic!("unexpected failure event"),
        }
    }
    assert_eq!(
        states,
        vec![
            FeedState::Probed,
            FeedState::Fetched,
            FeedState::Extracted,
            FeedState::Rendered,
            FeedState::Split,
            FeedState::Done
        ]
    );
    assert_eq!(complete, Some((1, 0, 0)));
}

#[tokio::test]
async fn concurrent_feeds_report_in_config_order() {
    let h = Harness::new();
    let names = [
        "nrd-30day",
        "nrd-14day",
        "nrd-phishing-30day",
        "nrd-phishing-14day",
    ];
    for name in names {
        let record = format!("only.{name}.example");
        h.publish(name, Some(name), &[record.as_str()]);
    }
    let mut config = h.config(names.iter().map(|n| feed(n, "List")).collect());
    config.max_concurrent_feeds = 4;

    let summary = h.pipeline(config).run().await.unwrap();

    let reported: Vec<&str> = summary.reports.iter().map(|r| r.feed.as_str()).collect();
    assert_eq!(reported, names.to_vec());
    assert_eq!(summary.done(), 4);
    assert_eq!(h.fingerprints().len(), 4);
}

#[tokio::test]
async fn held_lock_rejects_run() {
    let h = Harness::new();
    let pipeline = h.pipeline(h.config(vec![]));
    let _lock = RunLock::acquire(pipeline.lock_path()).unwrap();

    assert!(matches!(pipeline.run().await, Err(Error::RunLocked(_))));
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let h = Harness::new();
    let mut config = h.config(vec![feed("nrd-14day", "a"), feed("nrd-14day", "b")]);
    config.max_concurrent_feeds = 2;
    assert!(matches!(
        FeedPipeline::with_components(config, h.transport.clone(), Arc::new(TarGzExtractor)),
        Err(Error::Config { .. })
    ));
}
