//! Run statistics: one `StatLog` per site, aggregated per invocation.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Final status of a site's run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Run has not finished yet
    Running,
    Done,
    Failed,
    /// Run never started because a dependency did not finish
    Skipped,
}

/// A page that failed every retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedPage {
    pub page: u32,
    pub error: String,
}

/// Per-site run metadata.
///
/// Mutated by the owning run only; handed out by value once the run finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatLog {
    pub site: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub elapsed_secs: f64,

    // Collection
    #[serde(default)]
    pub page_count: u32,
    #[serde(default)]
    pub pages_scraped: u32,
    #[serde(default)]
    pub failed_pages: Vec<FailedPage>,
    #[serde(default)]
    pub stopped_early_at: Option<u32>,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub records_found: usize,

    // Indexing
    #[serde(default)]
    pub indexed: usize,
    #[serde(default)]
    pub index_failures: usize,
    #[serde(default)]
    pub added: usize,
    #[serde(default)]
    pub deleted: usize,

    // Archiving
    #[serde(default)]
    pub archive_key: Option<String>,

    /// Non-fatal problems (reconcile or archive failures)
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl StatLog {
    /// Start a fresh log for a site.
    pub fn new(site: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            status: RunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            elapsed_secs: 0.0,
            page_count: 0,
            pages_scraped: 0,
            failed_pages: Vec::new(),
            stopped_early_at: None,
            retries: 0,
            records_found: 0,
            indexed: 0,
            index_failures: 0,
            added: 0,
            deleted: 0,
            archive_key: None,
            warnings: Vec::new(),
            last_error: None,
        }
    }

    /// Log for a site whose run was never started.
    pub fn skipped(site: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut log = Self::new(site);
        log.last_error = Some(reason.into());
        log.finish(RunStatus::Skipped, Duration::ZERO);
        log
    }

    pub fn record_failed_page(&mut self, page: u32, error: &AppError) {
        self.failed_pages.push(FailedPage {
            page,
            error: error.to_string(),
        });
        self.last_error = Some(error.to_string());
    }

    pub fn record_warning(&mut self, error: &AppError) {
        self.warnings.push(format!("{}: {}", error.class(), error));
    }

    pub fn record_error(&mut self, error: &AppError) {
        self.last_error = Some(format!("{}: {}", error.class(), error));
    }

    pub fn finish(&mut self, status: RunStatus, elapsed: Duration) {
        self.status = status;
        self.finished_at = Some(Utc::now());
        self.elapsed_secs = elapsed.as_secs_f64();
    }

    pub fn is_done(&self) -> bool {
        self.status == RunStatus::Done
    }
}

/// Aggregate statistics of one coordinator invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapingStatistics {
    /// Human-readable total duration
    pub total_time: String,
    pub total_secs: f64,
    /// UTC timestamp of the end of the invocation
    pub finished_at: String,
    pub sites: BTreeMap<String, StatLog>,
}

impl ScrapingStatistics {
    pub fn new(logs: Vec<StatLog>, elapsed: Duration) -> Self {
        Self {
            total_time: format_duration(elapsed),
            total_secs: elapsed.as_secs_f64(),
            finished_at: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            sites: logs.into_iter().map(|log| (log.site.clone(), log)).collect(),
        }
    }

    pub fn get(&self, site: &str) -> Option<&StatLog> {
        self.sites.get(site)
    }

    /// Sites whose run reached `Failed`.
    pub fn failed_sites(&self) -> Vec<&str> {
        self.sites
            .values()
            .filter(|log| log.status == RunStatus::Failed)
            .map(|log| log.site.as_str())
            .collect()
    }

    pub fn any_failed(&self) -> bool {
        !self.failed_sites().is_empty()
    }
}

/// Format a duration as `Hhr:MMmin:SSsec` above a minute, `N seconds` otherwise.
pub fn format_duration(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs > 60.0 {
        let total = elapsed.as_secs();
        let (h, rem) = (total / 3600, total % 3600);
        let (m, s) = (rem / 60, rem % 60);
        format!("{h}hr:{m:02}min:{s:02}sec")
    } else {
        format!("{secs:.2} seconds")
    }
}
