// src/pipeline/collect.rs

//! Page collection.
//!
//! Drives a [`RecordSource`] over pages `1..=page_count` with per-page retry.
//! A page that keeps failing is logged and skipped; the run continues.

use futures::stream::{self, StreamExt};

use crate::error::{AppError, Result};
use crate::models::{PageResult, Record, RunResult, ScraperConfig, StatLog};
use crate::services::RecordSource;
use crate::utils::retry::{RetryPolicy, with_retry};

/// Collects every page of a source into one [`RunResult`].
#[derive(Debug, Clone)]
pub struct PageCollector {
    retry: RetryPolicy,
    concurrency: usize,
}

impl PageCollector {
    pub fn new(retry: RetryPolicy, concurrency: usize) -> Self {
        Self {
            retry,
            concurrency: concurrency.max(1),
        }
    }

    pub fn from_config(config: &ScraperConfig) -> Self {
        Self::new(RetryPolicy::from_config(config), config.max_concurrent_pages)
    }

    /// Discover the page count. Not retried: a failure here fails the run.
    pub async fn discover(&self, source: &dyn RecordSource) -> Result<u32> {
        let count = source.discover_page_count().await.map_err(|e| match e {
            AppError::SourceUnavailable { .. } => e,
            other => AppError::source_unavailable(source.site(), other),
        })?;

        if count == 0 {
            return Err(AppError::source_unavailable(
                source.site(),
                "upstream reported 0 pages",
            ));
        }
        log::info!("{}: {} pages to collect", source.site(), count);
        Ok(count)
    }

    /// Fetch pages `1..=page_count` in page order.
    ///
    /// Records keep upstream order. Collection stops at the first page that
    /// comes back empty; later pages are not requested. Fails with
    /// `SourceUnavailable` when no page yielded records, so an outage never
    /// reaches the index as an empty snapshot.
    pub async fn collect_pages(
        &self,
        source: &dyn RecordSource,
        page_count: u32,
        identity_field: &str,
        stats: &mut StatLog,
    ) -> Result<RunResult> {
        stats.page_count = page_count;
        let site = source.site();

        let mut pages = stream::iter(1..=page_count)
            .map(|page| async move {
                let attempted = with_retry(&self.retry, |_| async move {
                    let records = source.fetch_page(page).await?;
                    check_identity(site, page, &records, identity_field)?;
                    Ok(PageResult {
                        page,
                        page_count,
                        records,
                    })
                })
                .await;
                (page, attempted)
            })
            .buffered(self.concurrency);

        let mut records = Vec::new();
        while let Some((page, attempted)) = pages.next().await {
            stats.retries += attempted.attempts - 1;

            match attempted.result {
                Ok(result) if result.records.is_empty() => {
                    log::info!("{}: page {} is empty, stopping", site, page);
                    stats.stopped_early_at = Some(page);
                    break;
                }
                Ok(result) => {
                    log::debug!(
                        "{}: page {}/{} -> {} records",
                        site,
                        result.page,
                        result.page_count,
                        result.records.len()
                    );
                    stats.pages_scraped += 1;
                    records.extend(result.records);
                }
                Err(e) => {
                    log::error!(
                        "{}: page {} failed after {} attempts: {}",
                        site,
                        page,
                        attempted.attempts,
                        e
                    );
                    stats.record_failed_page(page, &e);
                }
            }
        }

        stats.records_found = records.len();
        log::info!(
            "{}: collected {} records from {}/{} pages ({} failed)",
            site,
            stats.records_found,
            stats.pages_scraped,
            page_count,
            stats.failed_pages.len()
        );

        if stats.pages_scraped == 0 {
            let reason = match stats.stopped_early_at {
                Some(page) => format!("page {page} came back empty"),
                None => format!("all {page_count} pages failed"),
            };
            return Err(AppError::source_unavailable(site, reason));
        }
        Ok(RunResult::new(records))
    }

    /// Discover and collect in one call.
    pub async fn collect(
        &self,
        source: &dyn RecordSource,
        identity_field: &str,
        stats: &mut StatLog,
    ) -> Result<RunResult> {
        let page_count = self.discover(source).await?;
        self.collect_pages(source, page_count, identity_field, stats)
            .await
    }
}

/// Every record of a page must carry its identity field.
fn check_identity(site: &str, page: u32, records: &[Record], identity_field: &str) -> Result<()> {
    match records
        .iter()
        .position(|r| r.identity(identity_field).is_none())
    {
        Some(index) => Err(AppError::page_parse(
            site,
            page,
            format!("record {index} has no '{identity_field}'"),
        )),
        None => Ok(()),
    }
}
