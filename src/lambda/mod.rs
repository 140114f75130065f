// src/lambda/mod.rs

//! AWS Lambda handler.
//!
//! Each invocation:
//! 1. Loads `config/config.toml` from the bucket (defaults when absent)
//! 2. Applies environment secrets and pins archives to the bucket
//! 3. Runs every site, or only the requested one
//! 4. Returns a per-site summary

use std::collections::BTreeMap;

use lambda_runtime::{Error as LambdaError, LambdaEvent};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::config::{LambdaConfigLoader, apply_env};
use crate::error::Result;
use crate::models::{Config, IndexBackend, RunStatus, ScrapingStatistics, StatLog, StorageBackend};
use crate::pipeline::RunCoordinator;
use crate::storage::S3Storage;

/// Object key of the configuration file inside the bucket prefix.
pub const CONFIG_KEY: &str = "config/config.toml";

/// Only writable directory inside the Lambda sandbox.
const SCRATCH_INDEX_DIR: &str = "/tmp/healthsync/index";

/// Lambda invocation payload.
#[derive(Debug, Default, Deserialize)]
pub struct SyncRequest {
    /// Run only this site (statistics are not archived)
    #[serde(default)]
    pub site: Option<String>,
}

/// Per-site line of the response.
#[derive(Debug, Serialize)]
pub struct SiteSummary {
    pub status: RunStatus,
    pub records: usize,
    pub failed_pages: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&StatLog> for SiteSummary {
    fn from(log: &StatLog) -> Self {
        Self {
            status: log.status,
            records: log.records_found,
            failed_pages: log.failed_pages.len(),
            error: log.last_error.clone(),
        }
    }
}

/// Lambda response payload.
#[derive(Debug, Default, Serialize)]
pub struct SyncResponse {
    /// False if any site failed or the run could not start
    pub success: bool,
    pub sites: BTreeMap<String, SiteSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_ms: u64,
}

impl SyncResponse {
    fn from_statistics(statistics: &ScrapingStatistics) -> Self {
        Self {
            success: !statistics.any_failed(),
            sites: statistics
                .sites
                .iter()
                .map(|(name, log)| (name.clone(), SiteSummary::from(log)))
                .collect(),
            total_time: Some(statistics.total_time.clone()),
            ..Default::default()
        }
    }

    fn from_site(log: &StatLog) -> Self {
        Self {
            success: log.status != RunStatus::Failed,
            sites: BTreeMap::from([(log.site.clone(), SiteSummary::from(log))]),
            ..Default::default()
        }
    }
}

/// Main Lambda handler function.
#[instrument(skip(event))]
pub async fn handler(
    event: LambdaEvent<SyncRequest>,
) -> std::result::Result<SyncResponse, LambdaError> {
    let start = std::time::Instant::now();
    let (request, _context) = event.into_parts();
    info!("Starting sync: site={:?}", request.site);

    let mut response = match run_sync(&request).await {
        Ok(response) => response,
        Err(e) => {
            error!("Sync failed: {}", e);
            SyncResponse {
                error: Some(e.to_string()),
                ..Default::default()
            }
        }
    };
    response.execution_time_ms = start.elapsed().as_millis() as u64;
    info!(
        "Sync finished: success={} in {}ms",
        response.success, response.execution_time_ms
    );
    Ok(response)
}

async fn run_sync(request: &SyncRequest) -> Result<SyncResponse> {
    let bucket = std::env::var("S3_BUCKET").unwrap_or_else(|_| "healthtools".to_string());
    let prefix = std::env::var("S3_PREFIX").unwrap_or_default();
    let loader = LambdaConfigLoader::new(S3Storage::from_env(&bucket, &prefix).await, CONFIG_KEY);

    let mut config = loader.load_config().await?;
    apply_env(&mut config);
    let config = lambda_config(config, &bucket, &prefix);
    let coordinator = RunCoordinator::from_config(&config).await?;

    match &request.site {
        Some(site) => Ok(SyncResponse::from_site(&coordinator.run_site(site).await?)),
        None => Ok(SyncResponse::from_statistics(&coordinator.run().await)),
    }
}

/// Archive to the bucket the configuration came from. A local index can only
/// live in scratch space.
fn lambda_config(mut config: Config, bucket: &str, prefix: &str) -> Config {
    config.storage.backend = StorageBackend::S3;
    config.storage.bucket = bucket.to_string();
    config.storage.prefix = prefix.to_string();

    if config.index.backend == IndexBackend::Local {
        warn!(
            "Local index backend in Lambda, using {} (not persisted across invocations)",
            SCRATCH_INDEX_DIR
        );
        config.index.local_dir = SCRATCH_INDEX_DIR.to_string();
    }
    config
}
