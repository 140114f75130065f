// src/pipeline/coordinator.rs

//! Runs every configured site in order and archives the aggregate statistics.

use std::collections::HashMap;
use std::time::Instant;

use crate::error::{AppError, Result};
use crate::models::{Config, RunStatus, ScrapingStatistics, SiteConfig, StatLog, StatsConfig};
use crate::notify;
use crate::pipeline::archive::Archiver;
use crate::pipeline::collect::PageCollector;
use crate::pipeline::run::{RunContext, ScraperRun};
use crate::search;
use crate::services::{RecordSource, build_source};
use crate::storage;
use crate::utils::http::create_async_client;

/// A configured site paired with its adapter.
pub struct SiteJob {
    pub config: SiteConfig,
    pub source: Box<dyn RecordSource>,
}

/// Sequential driver over all sites of one invocation.
pub struct RunCoordinator {
    jobs: Vec<SiteJob>,
    ctx: RunContext,
    stats: StatsConfig,
}

impl RunCoordinator {
    pub fn new(ctx: RunContext, stats: StatsConfig) -> Self {
        Self {
            jobs: Vec::new(),
            ctx,
            stats,
        }
    }

    /// Append a site. Sites run in the order they are added.
    pub fn add_site(&mut self, config: SiteConfig, source: Box<dyn RecordSource>) {
        self.jobs.push(SiteJob { config, source });
    }

    /// Wire sources, index, storage and notifier from configuration.
    pub async fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let client = create_async_client(&config.scraper)?;
        let ctx = RunContext {
            collector: PageCollector::from_config(&config.scraper),
            index: search::open(&config.index, &client)?,
            archiver: Archiver::new(storage::open(&config.storage).await?),
            notifier: notify::from_config(&config.notify)?,
        };

        let mut coordinator = Self::new(ctx, config.stats.clone());
        for site in &config.sites {
            coordinator.add_site(site.clone(), build_source(site, &client)?);
        }
        Ok(coordinator)
    }

    pub fn sites(&self) -> impl Iterator<Item = &SiteConfig> {
        self.jobs.iter().map(|job| &job.config)
    }

    /// Run every site, then archive the statistics.
    pub async fn run(&self) -> ScrapingStatistics {
        let started = Instant::now();
        let mut status: HashMap<&str, RunStatus> = HashMap::new();
        let mut logs = Vec::with_capacity(self.jobs.len());

        for job in &self.jobs {
            let site = &job.config;
            let log = match blocking_dependency(site, &status) {
                Some(reason) => {
                    log::warn!("{}: skipped, {}", site.name, reason);
                    StatLog::skipped(&site.name, reason)
                }
                None => {
                    ScraperRun::new(site, job.source.as_ref(), &self.ctx)
                        .execute()
                        .await
                }
            };
            status.insert(site.name.as_str(), log.status);
            logs.push(log);
        }

        let statistics = ScrapingStatistics::new(logs, started.elapsed());
        log::info!(
            "Finished {} sites in {} ({} failed)",
            statistics.sites.len(),
            statistics.total_time,
            statistics.failed_sites().len()
        );
        self.archive_statistics(&statistics).await;
        statistics
    }

    /// Run a single site, ignoring its dependency. Statistics are not archived.
    pub async fn run_site(&self, name: &str) -> Result<StatLog> {
        let job = self
            .jobs
            .iter()
            .find(|job| job.config.name == name)
            .ok_or_else(|| AppError::config(format!("unknown site '{name}'")))?;

        Ok(ScraperRun::new(&job.config, job.source.as_ref(), &self.ctx)
            .execute()
            .await)
    }

    async fn archive_statistics(&self, statistics: &ScrapingStatistics) {
        let result = self
            .ctx
            .archiver
            .archive_json(statistics, &self.stats.latest_key, &self.stats.archive_template)
            .await;

        if let Err(e) = result {
            log::error!("Failed to archive statistics: {}", e);
            self.ctx
                .notifier
                .notify(&notify::format_alert("statistics", &e))
                .await;
        }
    }
}

/// Why a site cannot run yet, if its dependency did not finish.
fn blocking_dependency(site: &SiteConfig, status: &HashMap<&str, RunStatus>) -> Option<String> {
    let dependency = site.depends_on.as_deref()?;
    match status.get(dependency) {
        Some(RunStatus::Done) => None,
        Some(other) => Some(format!("dependency {dependency} ended {other:?}")),
        None => Some(format!("dependency {dependency} did not run")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(name: &str, depends_on: Option<&str>) -> SiteConfig {
        let mut site = Config::default().sites.remove(0);
        site.name = name.into();
        site.depends_on = depends_on.map(str::to_string);
        site
    }

    #[test]
    fn dependency_must_be_done() {
        let dependent = site("foreign_doctors", Some("doctors"));
        let mut status = HashMap::new();
        assert!(blocking_dependency(&dependent, &status).is_some());

        status.insert("doctors", RunStatus::Failed);
        let reason = blocking_dependency(&dependent, &status).unwrap();
        assert!(reason.contains("Failed"));

        status.insert("doctors", RunStatus::Done);
        assert!(blocking_dependency(&dependent, &status).is_none());
    }

    #[test]
    fn independent_site_never_blocks() {
        assert!(blocking_dependency(&site("clinical_officers", None), &HashMap::new()).is_none());
    }
}
