// src/pipeline/archive.rs

//! Snapshot archiving: a latest copy plus a timestamped historical copy.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};
use crate::storage::ObjectStorage;
use crate::utils::timestamped_key;

/// Where and what was archived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveReceipt {
    pub latest_key: String,
    pub historical_key: String,
    pub bytes: usize,
    /// Hex-encoded SHA-256 of the payload
    pub sha256: String,
    pub archived_at: DateTime<Utc>,
}

/// Writes payloads to object storage.
#[derive(Clone)]
pub struct Archiver {
    storage: Arc<dyn ObjectStorage>,
}

impl Archiver {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }

    /// Write `payload` to `latest_key` and to the timestamped historical key.
    pub async fn archive(
        &self,
        payload: &[u8],
        latest_key: &str,
        historical_template: &str,
    ) -> Result<ArchiveReceipt> {
        let archived_at = Utc::now();
        let historical_key = timestamped_key(historical_template, archived_at);

        for key in [latest_key, historical_key.as_str()] {
            self.storage
                .put(key, payload)
                .await
                .map_err(|e| AppError::archive_unavailable(key, e))?;
        }

        log::info!(
            "Archived {} bytes to {} and {}",
            payload.len(),
            self.storage.location(latest_key),
            self.storage.location(&historical_key)
        );

        Ok(ArchiveReceipt {
            latest_key: latest_key.to_string(),
            historical_key,
            bytes: payload.len(),
            sha256: hex::encode(Sha256::digest(payload)),
            archived_at,
        })
    }

    /// Serialize `value` as pretty JSON and archive it.
    pub async fn archive_json<T: Serialize + ?Sized>(
        &self,
        value: &T,
        latest_key: &str,
        historical_template: &str,
    ) -> Result<ArchiveReceipt> {
        let payload = serde_json::to_vec_pretty(value)?;
        self.archive(&payload, latest_key, historical_template).await
    }
}
