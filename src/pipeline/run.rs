// src/pipeline/run.rs

//! One site's scrape, index, and archive cycle.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{AppError, Result};
use crate::models::{KeyedDocument, RunStatus, SiteConfig, StatLog};
use crate::notify::{Notifier, format_alert};
use crate::pipeline::archive::Archiver;
use crate::pipeline::collect::PageCollector;
use crate::pipeline::index::SnapshotIndexer;
use crate::search::SearchIndex;
use crate::services::RecordSource;

/// Lifecycle of a [`ScraperRun`]. Transitions are strictly forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Discovering,
    Collecting,
    Indexing,
    Archiving,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Discovering => "discovering",
            Self::Collecting => "collecting",
            Self::Indexing => "indexing",
            Self::Archiving => "archiving",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Shared services every run uses.
#[derive(Clone)]
pub struct RunContext {
    pub collector: PageCollector,
    pub index: Arc<dyn SearchIndex>,
    pub archiver: Archiver,
    pub notifier: Arc<dyn Notifier>,
}

/// A single execution for one site.
pub struct ScraperRun<'a> {
    site: &'a SiteConfig,
    source: &'a dyn RecordSource,
    ctx: &'a RunContext,
    state: RunState,
    stats: StatLog,
}

impl<'a> ScraperRun<'a> {
    pub fn new(site: &'a SiteConfig, source: &'a dyn RecordSource, ctx: &'a RunContext) -> Self {
        Self {
            site,
            source,
            ctx,
            state: RunState::Idle,
            stats: StatLog::new(&site.name),
        }
    }

    /// Drive the run to a terminal state and hand back its finished log.
    pub async fn execute(mut self) -> StatLog {
        let started = Instant::now();
        log::info!("{}: starting run", self.site.name);

        let status = match self.drive().await {
            Ok(()) => {
                self.transition(RunState::Done);
                RunStatus::Done
            }
            Err(e) => {
                log::error!("{}: run failed while {}: {}", self.site.name, self.state, e);
                self.transition(RunState::Failed);
                self.stats.record_error(&e);
                self.ctx
                    .notifier
                    .notify(&format_alert(&self.site.name, &e))
                    .await;
                RunStatus::Failed
            }
        };

        self.stats.finish(status, started.elapsed());
        log::info!(
            "{}: {} in {:.2}s ({} records, {} failed pages)",
            self.site.name,
            self.state,
            self.stats.elapsed_secs,
            self.stats.records_found,
            self.stats.failed_pages.len()
        );
        self.stats
    }

    async fn drive(&mut self) -> Result<()> {
        self.transition(RunState::Discovering);
        let page_count = self.ctx.collector.discover(self.source).await?;

        self.transition(RunState::Collecting);
        let result = self
            .ctx
            .collector
            .collect_pages(
                self.source,
                page_count,
                &self.site.identity_field,
                &mut self.stats,
            )
            .await?;
        let current_keys = result.keys(&self.site.identity_field);
        let documents = result.into_documents(&self.site.name, &self.site.identity_field)?;

        self.transition(RunState::Indexing);
        self.index(&documents, &current_keys).await?;

        self.transition(RunState::Archiving);
        self.archive(documents).await;
        Ok(())
    }

    async fn index(
        &mut self,
        documents: &[KeyedDocument],
        current_keys: &HashSet<String>,
    ) -> Result<()> {
        let indexer = SnapshotIndexer::new(Arc::clone(&self.ctx.index), self.site.namespace());

        let receipt = indexer.index(documents).await?;
        self.stats.indexed = receipt.indexed;
        self.stats.index_failures = receipt.failed;

        match indexer.reconcile(current_keys).await {
            Ok(receipt) => {
                self.stats.added = receipt.diff.added.len();
                self.stats.deleted = receipt.deleted;
            }
            Err(e) => self.warn(e).await,
        }
        Ok(())
    }

    async fn archive(&mut self, documents: Vec<KeyedDocument>) {
        let payload: Vec<_> = documents.into_iter().map(|(_, doc)| doc).collect();
        let result = self
            .ctx
            .archiver
            .archive_json(&payload, &self.site.latest_key, &self.site.archive_template)
            .await;

        match result {
            Ok(receipt) => self.stats.archive_key = Some(receipt.historical_key),
            Err(e) => self.warn(e).await,
        }
    }

    /// Record and notify a problem that does not fail the run.
    async fn warn(&mut self, error: AppError) {
        log::warn!("{}: {}", self.site.name, error);
        self.stats.record_warning(&error);
        self.ctx
            .notifier
            .notify(&format_alert(&self.site.name, &error))
            .await;
    }

    fn transition(&mut self, next: RunState) {
        debug_assert!(!self.state.is_terminal(), "run already finished");
        log::debug!("{}: {} -> {}", self.site.name, self.state, next);
        self.state = next;
    }
}
