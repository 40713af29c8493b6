//! End-to-end pipeline tests against an in-memory store.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fdns_common::NormalizedRecord;
use fdns_ingest::config::PipelineConfig;
use fdns_ingest::pipeline::{IngestPipeline, RunState};
use fdns_ingest::source::SourceLocator;
use fdns_ingest::store::{RecordStore, WriteOutcome};
use fdns_ingest::IngestError;
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct MemoryInner {
    collections: HashMap<String, Vec<NormalizedRecord>>,
    batch_sizes: Vec<usize>,
    dropped: Vec<String>,
}

/// In-memory [`RecordStore`]. Rejects exact-duplicate rows so tests can
/// exercise the pipeline's store-side rejection accounting.
#[derive(Clone, Default)]
struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
    fail_writes: bool,
}

impl MemoryStore {
    fn new() -> Self {
        Self::default()
    }

    fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    fn records(&self, name: &str) -> Vec<NormalizedRecord> {
        self.inner.lock().unwrap().collections[name].clone()
    }

    fn batch_sizes(&self) -> Vec<usize> {
        self.inner.lock().unwrap().batch_sizes.clone()
    }

    fn dropped(&self) -> Vec<String> {
        self.inner.lock().unwrap().dropped.clone()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn drop_collection(&self, name: &str) -> Result<(), IngestError> {
        let mut inner = self.inner.lock().unwrap();
        inner.collections.remove(name);
        inner.dropped.push(name.to_string());
        Ok(())
    }

    async fn create_collection(&self, name: &str) -> Result<(), IngestError> {
        self.inner
            .lock()
            .unwrap()
            .collections
            .insert(name.to_string(), Vec::new());
        Ok(())
    }

    async fn bulk_insert_unordered(
        &self,
        name: &str,
        batch: Vec<NormalizedRecord>,
    ) -> Result<WriteOutcome, IngestError> {
        if self.fail_writes {
            return Err(IngestError::Persist("injected write failure".to_string()));
        }
        let mut inner = self.inner.lock().unwrap();
        inner.batch_sizes.push(batch.len());
        let existing = inner
            .collections
            .get_mut(name)
            .ok_or_else(|| IngestError::Persist(format!("no collection {name}")))?;

        let mut outcome = WriteOutcome::default();
        for record in batch {
            if existing.contains(&record) {
                outcome.rejected += 1;
            } else {
                existing.push(record);
                outcome.accepted += 1;
            }
        }
        Ok(outcome)
    }

    async fn find_records(
        &self,
        name: &str,
        domain_without_suffix: &str,
        public_suffix: Option<&str>,
        limit: usize,
    ) -> Result<Vec<NormalizedRecord>, IngestError> {
        let inner = self.inner.lock().unwrap();
        let records = inner
            .collections
            .get(name)
            .ok_or_else(|| IngestError::Persist(format!("no collection {name}")))?;
        Ok(records
            .iter()
            .filter(|r| {
                r.domain_without_suffix == domain_without_suffix
                    && public_suffix.is_none_or(|s| r.public_suffix == s)
            })
            .take(limit)
            .cloned()
            .collect())
    }
}

fn gzip_bytes(content: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

fn feed_file(dir: &tempfile::TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("feed.json.gz");
    std::fs::write(&path, gzip_bytes(content)).unwrap();
    path
}

fn feed_line(host: &str) -> String {
    format!(r#"{{"name":"{host}","type":"a","value":"1.2.3.4"}}"#)
}

async fn run_from_file(
    store: MemoryStore,
    content: &str,
    config_fn: impl FnOnce(PipelineConfig) -> PipelineConfig,
) -> fdns_ingest::RunSummary {
    let dir = tempfile::tempdir().unwrap();
    let path = feed_file(&dir, content);
    let config = config_fn(PipelineConfig::new(SourceLocator::Path(path), "records"));
    IngestPipeline::new(store, config)
        .unwrap()
        .run(CancellationToken::new())
        .await
}

#[tokio::test]
async fn test_mixed_feed_counters_are_conserved() {
    let content = [
        feed_line("www.example.com"),
        "not json at all".to_string(),
        feed_line("*.mail.example.org"),
        r#"{"type":"a","value":"1.2.3.4"}"#.to_string(),
        feed_line("com"),
        feed_line("a.b.example.co.uk"),
    ]
    .join("\n");

    let store = MemoryStore::new();
    let summary = run_from_file(store.clone(), &content, |c| c).await;

    assert_eq!(summary.state, RunState::Completed);
    assert!(!summary.truncated);
    let c = &summary.counters;
    assert_eq!(c.lines_seen, 6);
    assert_eq!(c.records_persisted, 3);
    assert_eq!(c.malformed_json, 1);
    assert_eq!(c.missing_hostname, 1);
    assert_eq!(c.decomposition_failures, 1);
    assert!(c.is_balanced());

    let records = store.records("records");
    assert_eq!(records.len(), 3);
    assert!(records
        .iter()
        .any(|r| r.subdomain == "mail" && r.domain_without_suffix == "example"));
}

#[tokio::test]
async fn test_collection_is_recreated_before_load() {
    let store = MemoryStore::new();
    run_from_file(store.clone(), &feed_line("example.com"), |c| c).await;
    assert_eq!(store.dropped(), vec!["records"]);
}

#[tokio::test]
async fn test_batch_sizes_are_bounded_and_final_flush_is_partial() {
    let content = (0..7)
        .map(|n| feed_line(&format!("host{n}.example.com")))
        .collect::<Vec<_>>()
        .join("\n");

    let store = MemoryStore::new();
    let summary = run_from_file(store.clone(), &content, |c| c.with_batch_size(3)).await;

    assert_eq!(summary.state, RunState::Completed);
    let mut sizes = store.batch_sizes();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![1, 3, 3]);
}

#[tokio::test]
async fn test_empty_feed_issues_no_writes() {
    let store = MemoryStore::new();
    let summary = run_from_file(store.clone(), "", |c| c).await;

    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(summary.counters.lines_seen, 0);
    assert!(store.batch_sizes().is_empty());
}

#[tokio::test]
async fn test_store_duplicates_count_as_persist_rejected() {
    let content = [feed_line("example.com"), feed_line("example.com")].join("\n");
    let store = MemoryStore::new();
    let summary = run_from_file(store.clone(), &content, |c| c).await;

    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(summary.counters.records_persisted, 2);
    assert_eq!(summary.counters.persist_rejected, 1);
    assert!(summary.counters.is_balanced());
    assert_eq!(store.records("records").len(), 1);
}

#[tokio::test]
async fn test_persist_failure_fails_the_run() {
    let summary = run_from_file(MemoryStore::failing(), &feed_line("example.com"), |c| c).await;

    assert_eq!(summary.state, RunState::Failed);
    assert!(matches!(summary.error, Some(IngestError::Persist(_))));
}

#[tokio::test]
async fn test_corrupt_tail_completes_truncated() {
    let dir = tempfile::tempdir().unwrap();
    let good = (0..5)
        .map(|n| feed_line(&format!("host{n}.example.com")))
        .collect::<Vec<_>>()
        .join("\n");
    let mut bytes = gzip_bytes(&(good + "\n"));
    bytes.extend_from_slice(b"garbage that is not a gzip member");
    let path = dir.path().join("feed.json.gz");
    std::fs::write(&path, bytes).unwrap();

    let store = MemoryStore::new();
    let config = PipelineConfig::new(SourceLocator::Path(path), "records");
    let summary = IngestPipeline::new(store.clone(), config)
        .unwrap()
        .run(CancellationToken::new())
        .await;

    assert_eq!(summary.state, RunState::Completed);
    assert!(summary.truncated);
    assert_eq!(summary.counters.records_persisted, 5);
    assert_eq!(store.records("records").len(), 5);
}

#[tokio::test]
async fn test_missing_file_fails_with_source_unavailable() {
    let store = MemoryStore::new();
    let config = PipelineConfig::new(
        SourceLocator::Path(PathBuf::from("/nonexistent/feed.json.gz")),
        "records",
    );
    let summary = IngestPipeline::new(store, config)
        .unwrap()
        .run(CancellationToken::new())
        .await;

    assert_eq!(summary.state, RunState::Failed);
    assert!(matches!(
        summary.error,
        Some(IngestError::SourceUnavailable(_))
    ));
}

#[tokio::test]
async fn test_cancelled_run_still_emits_summary() {
    let content = (0..100)
        .map(|n| feed_line(&format!("host{n}.example.com")))
        .collect::<Vec<_>>()
        .join("\n");
    let dir = tempfile::tempdir().unwrap();
    let path = feed_file(&dir, &content);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let config = PipelineConfig::new(SourceLocator::Path(path), "records");
    let summary = IngestPipeline::new(MemoryStore::new(), config)
        .unwrap()
        .run(cancel)
        .await;

    assert!(summary.cancelled);
    assert_eq!(summary.state, RunState::Completed);
}

#[tokio::test]
async fn test_http_source_follows_redirect() {
    let server = MockServer::start().await;
    let content = [feed_line("www.example.com"), feed_line("example.net")].join("\n");

    Mock::given(method("GET"))
        .and(path("/latest"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", "/feeds/fdns_a.json.gz"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/feeds/fdns_a.json.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(gzip_bytes(&content)))
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    let locator: SourceLocator = format!("{}/latest", server.uri()).parse().unwrap();
    let summary = IngestPipeline::new(store.clone(), PipelineConfig::new(locator, "records"))
        .unwrap()
        .run(CancellationToken::new())
        .await;

    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(summary.counters.records_persisted, 2);
    assert_eq!(store.records("records").len(), 2);
}

#[tokio::test]
async fn test_redirect_loop_fails_with_clear_reason() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/loop"))
        .mount(&server)
        .await;

    let locator: SourceLocator = format!("{}/loop", server.uri()).parse().unwrap();
    let summary = IngestPipeline::new(MemoryStore::new(), PipelineConfig::new(locator, "records"))
        .unwrap()
        .run(CancellationToken::new())
        .await;

    assert_eq!(summary.state, RunState::Failed);
    assert!(matches!(
        summary.error,
        Some(IngestError::TooManyRedirects { limit: 10 })
    ));
}

#[tokio::test]
async fn test_http_error_status_fails_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let locator: SourceLocator = format!("{}/missing", server.uri()).parse().unwrap();
    let summary = IngestPipeline::new(MemoryStore::new(), PipelineConfig::new(locator, "records"))
        .unwrap()
        .run(CancellationToken::new())
        .await;

    assert_eq!(summary.state, RunState::Failed);
    assert!(matches!(
        summary.error,
        Some(IngestError::Fetch { status: 404, .. })
    ));
}
