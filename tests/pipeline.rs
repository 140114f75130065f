//! End-to-end behavior of the coordinator against in-memory sources and
//! filesystem-backed index and storage.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;

use healthsync::error::{AppError, Result};
use healthsync::models::{Config, Record, RunStatus, SiteConfig, StatsConfig};
use healthsync::notify::Notifier;
use healthsync::pipeline::{Archiver, PageCollector, RunContext, RunCoordinator, SnapshotIndexer};
use healthsync::search::{LocalIndex, SearchIndex};
use healthsync::storage::{LocalStorage, ObjectStorage};
use healthsync::utils::retry::RetryPolicy;

/// Upstream whose pages can be swapped between runs.
#[derive(Clone)]
struct Upstream {
    site: String,
    pages: Arc<Mutex<Vec<Vec<(String, String)>>>>,
    broken_pages: Arc<Mutex<HashSet<u32>>>,
    unreachable: Arc<Mutex<bool>>,
}

impl Upstream {
    fn new(site: &str, pages: &[&[(&str, &str)]]) -> Self {
        let upstream = Self {
            site: site.to_string(),
            pages: Arc::new(Mutex::new(Vec::new())),
            broken_pages: Arc::new(Mutex::new(HashSet::new())),
            unreachable: Arc::new(Mutex::new(false)),
        };
        upstream.set_pages(pages);
        upstream
    }

    fn set_pages(&self, pages: &[&[(&str, &str)]]) {
        *self.pages.lock().unwrap() = pages
            .iter()
            .map(|page| {
                page.iter()
                    .map(|(k, n)| (k.to_string(), n.to_string()))
                    .collect()
            })
            .collect();
    }

    fn break_page(&self, page: u32) {
        self.broken_pages.lock().unwrap().insert(page);
    }

    fn repair(&self) {
        self.broken_pages.lock().unwrap().clear();
    }

    fn go_down(&self) {
        *self.unreachable.lock().unwrap() = true;
    }
}

#[async_trait]
impl healthsync::services::RecordSource for Upstream {
    fn site(&self) -> &str {
        &self.site
    }

    async fn discover_page_count(&self) -> Result<u32> {
        if *self.unreachable.lock().unwrap() {
            return Err(AppError::source_unavailable(&self.site, "connection refused"));
        }
        Ok(self.pages.lock().unwrap().len() as u32)
    }

    async fn fetch_page(&self, page: u32) -> Result<Vec<Record>> {
        if self.broken_pages.lock().unwrap().contains(&page) {
            return Err(AppError::page_fetch(&self.site, page, "502 Bad Gateway"));
        }
        let pages = self.pages.lock().unwrap();
        let rows = pages.get(page as usize - 1).cloned().unwrap_or_default();
        Ok(rows
            .into_iter()
            .map(|(reg_no, name)| {
                let mut record = Record::new();
                record.insert("reg_no", reg_no);
                record.insert("name", name);
                record
            })
            .collect())
    }
}

#[derive(Default)]
struct RecordingNotifier(Mutex<Vec<String>>);

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &str) {
        self.0.lock().unwrap().push(message.to_string());
    }
}

struct Harness {
    _dir: TempDir,
    index: Arc<LocalIndex>,
    storage: Arc<LocalStorage>,
    notifier: Arc<RecordingNotifier>,
    ctx: RunContext,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let index = Arc::new(LocalIndex::new(dir.path().join("index")));
        let storage = Arc::new(LocalStorage::new(dir.path().join("archive")));
        let notifier = Arc::new(RecordingNotifier::default());

        let ctx = RunContext {
            collector: PageCollector::new(RetryPolicy::new(3, Duration::ZERO), 2),
            index: index.clone(),
            archiver: Archiver::new(storage.clone()),
            notifier: notifier.clone(),
        };
        Self {
            _dir: dir,
            index,
            storage,
            notifier,
            ctx,
        }
    }

    fn coordinator(&self, sites: Vec<(SiteConfig, Upstream)>) -> RunCoordinator {
        let mut coordinator = RunCoordinator::new(self.ctx.clone(), StatsConfig::default());
        for (config, upstream) in sites {
            coordinator.add_site(config, Box::new(upstream));
        }
        coordinator
    }

    async fn keys(&self, namespace: &str) -> HashSet<String> {
        self.index.list_keys(namespace).await.unwrap()
    }
}

fn site(name: &str) -> SiteConfig {
    let mut config = Config::default().site("doctors").cloned().unwrap();
    config.name = name.to_string();
    config.latest_key = format!("data/{name}.json");
    config.archive_template = format!("archive/{name}-{{ts}}.json");
    config
}

fn keys(items: &[&str]) -> HashSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn rerun_over_unchanged_upstream_is_idempotent() {
    let harness = Harness::new();
    let upstream = Upstream::new(
        "doctors",
        &[&[("A1", "Dr. Achieng"), ("A2", "Dr. Kamau")], &[("A3", "Dr. Wanjiru")]],
    );
    let coordinator = harness.coordinator(vec![(site("doctors"), upstream)]);

    coordinator.run().await;
    let first_keys = harness.keys("doctors").await;
    let first_doc = harness.index.get("doctors", "A2").await.unwrap();

    let statistics = coordinator.run().await;
    assert_eq!(harness.keys("doctors").await, first_keys);
    assert_eq!(harness.index.get("doctors", "A2").await.unwrap(), first_doc);
    assert_eq!(first_keys, keys(&["A1", "A2", "A3"]));

    let log = statistics.get("doctors").unwrap();
    assert_eq!(log.added, 0);
    assert_eq!(log.deleted, 0);
}

#[tokio::test]
async fn index_then_reconcile_matches_snapshot_keys() {
    let harness = Harness::new();
    let indexer = SnapshotIndexer::new(harness.index.clone(), "doctors");

    let previous: Vec<_> = ["A", "B", "C"]
        .iter()
        .map(|k| (k.to_string(), serde_json::json!({"reg_no": k})))
        .collect();
    indexer.index(&previous).await.unwrap();

    let current: Vec<_> = previous
        .iter()
        .filter(|(k, _)| k != "B")
        .cloned()
        .collect();
    indexer.index(&current).await.unwrap();
    let receipt = indexer.reconcile(&keys(&["A", "C"])).await.unwrap();

    assert_eq!(receipt.diff.stale, vec!["B"]);
    assert_eq!(receipt.deleted, 1);
    assert_eq!(harness.keys("doctors").await, keys(&["A", "C"]));
}

#[tokio::test]
async fn removed_upstream_record_is_deleted_on_next_run() {
    let harness = Harness::new();
    let upstream = Upstream::new("doctors", &[&[("A", "a"), ("B", "b"), ("C", "c")]]);
    let coordinator = harness.coordinator(vec![(site("doctors"), upstream.clone())]);

    coordinator.run().await;
    upstream.set_pages(&[&[("A", "a"), ("C", "c")]]);
    let statistics = coordinator.run().await;

    assert_eq!(statistics.get("doctors").unwrap().deleted, 1);
    assert_eq!(harness.keys("doctors").await, keys(&["A", "C"]));
}

#[tokio::test]
async fn failed_page_is_skipped_and_recorded() {
    let harness = Harness::new();
    let upstream = Upstream::new(
        "doctors",
        &[&[("A1", "a")], &[("B1", "b")], &[("C1", "c"), ("C2", "c2")]],
    );
    upstream.break_page(2);
    let coordinator = harness.coordinator(vec![(site("doctors"), upstream)]);

    let statistics = coordinator.run().await;
    let log = statistics.get("doctors").unwrap();

    assert_eq!(log.status, RunStatus::Done);
    assert_eq!(log.failed_pages.len(), 1);
    assert_eq!(log.failed_pages[0].page, 2);
    assert_eq!(log.records_found, 3);
    assert_eq!(log.retries, 2);
    assert_eq!(harness.keys("doctors").await, keys(&["A1", "C1", "C2"]));
}

#[tokio::test]
async fn outage_after_a_good_run_keeps_the_previous_snapshot() {
    let harness = Harness::new();
    let upstream = Upstream::new("doctors", &[&[("A", "a")], &[("B", "b")]]);
    let coordinator = harness.coordinator(vec![(site("doctors"), upstream.clone())]);
    coordinator.run().await;

    upstream.break_page(1);
    upstream.break_page(2);
    let statistics = coordinator.run().await;
    let log = statistics.get("doctors").unwrap();
    assert_eq!(log.status, RunStatus::Failed);
    assert_eq!(log.failed_pages.len(), 2);
    assert_eq!(log.deleted, 0);
    assert_eq!(harness.keys("doctors").await, keys(&["A", "B"]));

    upstream.repair();
    upstream.set_pages(&[&[], &[("B", "b")]]);
    let statistics = coordinator.run().await;
    let log = statistics.get("doctors").unwrap();
    assert_eq!(log.status, RunStatus::Failed);
    assert_eq!(log.stopped_early_at, Some(1));
    assert_eq!(harness.keys("doctors").await, keys(&["A", "B"]));

    let messages = harness.notifier.0.lock().unwrap();
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m.starts_with("[ doctors ] SourceUnavailable:")));
}

#[tokio::test]
async fn dependent_site_is_skipped_when_dependency_fails() {
    let harness = Harness::new();
    let doctors = Upstream::new("doctors", &[&[("A1", "a")]]);
    doctors.go_down();
    let foreign = Upstream::new("foreign_doctors", &[&[("F1", "f")]]);
    let officers = Upstream::new("clinical_officers", &[&[("C1", "c")]]);

    let mut foreign_site = site("foreign_doctors");
    foreign_site.depends_on = Some("doctors".into());
    let coordinator = harness.coordinator(vec![
        (site("doctors"), doctors),
        (foreign_site, foreign),
        (site("clinical_officers"), officers),
    ]);

    let statistics = coordinator.run().await;

    assert_eq!(statistics.get("doctors").unwrap().status, RunStatus::Failed);
    assert_eq!(
        statistics.get("foreign_doctors").unwrap().status,
        RunStatus::Skipped
    );
    assert_eq!(
        statistics.get("clinical_officers").unwrap().status,
        RunStatus::Done
    );
    assert!(harness.keys("foreign_doctors").await.is_empty());
    assert!(statistics.any_failed());

    let messages = harness.notifier.0.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("[ doctors ] SourceUnavailable:"));
}

#[tokio::test]
async fn archived_snapshot_reads_back_equal() {
    let harness = Harness::new();
    let upstream = Upstream::new("doctors", &[&[("A1", "Dr.  Achieng   Otieno")]]);
    let coordinator = harness.coordinator(vec![(site("doctors"), upstream)]);

    let statistics = coordinator.run().await;
    let log = statistics.get("doctors").unwrap();

    let latest = harness.storage.get("data/doctors.json").await.unwrap().unwrap();
    let historical_key = log.archive_key.as_deref().unwrap();
    let historical = harness.storage.get(historical_key).await.unwrap().unwrap();

    let payload: Value = serde_json::from_slice(&latest).unwrap();
    assert_eq!(payload, serde_json::from_slice::<Value>(&historical).unwrap());
    assert_eq!(
        payload,
        serde_json::json!([{"reg_no": "A1", "name": "Dr. Achieng Otieno"}])
    );
}

#[tokio::test]
async fn statistics_are_archived_after_the_run() {
    let harness = Harness::new();
    let coordinator = harness.coordinator(vec![(
        site("doctors"),
        Upstream::new("doctors", &[&[("A1", "a")]]),
    )]);

    coordinator.run().await;

    let bytes = harness.storage.get("stats.json").await.unwrap().unwrap();
    let stats: HashMap<String, Value> = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(stats["sites"]["doctors"]["status"], "done");
    assert!(stats.contains_key("total_time"));
}
