//! Sync pipeline.
//!
//! - `collect`: page-by-page collection with retry
//! - `index`: bulk upsert and stale-document reconciliation
//! - `archive`: latest and historical snapshot copies
//! - `run`: the per-site state machine
//! - `coordinator`: ordered execution of all sites

pub mod archive;
pub mod collect;
pub mod coordinator;
pub mod diff;
pub mod index;
pub mod run;

pub use archive::{ArchiveReceipt, Archiver};
pub use collect::PageCollector;
pub use coordinator::{RunCoordinator, SiteJob};
pub use diff::{IndexDiff, calculate_diff};
pub use index::{IndexReceipt, ReconcileReceipt, SnapshotIndexer};
pub use run::{RunContext, RunState, ScraperRun};

use crate::error::Result;
use crate::models::{Config, ScrapingStatistics};

/// Build a coordinator from configuration and run every site once.
pub async fn run_pipeline(config: &Config) -> Result<ScrapingStatistics> {
    let coordinator = RunCoordinator::from_config(config).await?;
    Ok(coordinator.run().await)
}
