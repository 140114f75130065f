// src/pipeline/index.rs

//! Snapshot indexing and reconciliation for one site namespace.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::KeyedDocument;
use crate::pipeline::diff::{IndexDiff, calculate_diff};
use crate::search::SearchIndex;

/// Outcome of a bulk upsert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReceipt {
    pub submitted: usize,
    pub indexed: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// Outcome of removing stale documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReceipt {
    pub diff: IndexDiff,
    pub deleted: usize,
    pub delete_failures: usize,
}

/// Writes one site's snapshot into its namespace and prunes stale documents.
pub struct SnapshotIndexer {
    index: Arc<dyn SearchIndex>,
    namespace: String,
}

impl SnapshotIndexer {
    pub fn new(index: Arc<dyn SearchIndex>, namespace: impl Into<String>) -> Self {
        Self {
            index,
            namespace: namespace.into(),
        }
    }

    /// Upsert every document.
    ///
    /// Fails with `IndexUnavailable` when the bulk call cannot be submitted or
    /// when not a single document was accepted.
    pub async fn index(&self, documents: &[KeyedDocument]) -> Result<IndexReceipt> {
        let outcome = self
            .index
            .bulk_upsert(&self.namespace, documents)
            .await
            .map_err(|e| AppError::index_unavailable(&self.namespace, e))?;

        if outcome.all_failed() {
            let first = outcome.errors.first().cloned().unwrap_or_default();
            return Err(AppError::index_unavailable(
                &self.namespace,
                format!("all {} documents rejected ({})", outcome.failed, first),
            ));
        }

        for error in &outcome.errors {
            log::warn!("{}: {}", self.namespace, error);
        }
        log::info!(
            "{}: indexed {}/{} documents",
            self.namespace,
            outcome.succeeded,
            documents.len()
        );

        Ok(IndexReceipt {
            submitted: documents.len(),
            indexed: outcome.succeeded,
            failed: outcome.failed,
            errors: outcome.errors,
        })
    }

    /// Delete every stored key not in `current_keys`.
    pub async fn reconcile(&self, current_keys: &HashSet<String>) -> Result<ReconcileReceipt> {
        let stored = self
            .index
            .list_keys(&self.namespace)
            .await
            .map_err(|e| AppError::index_unavailable(&self.namespace, e))?;
        let diff = calculate_diff(&stored, current_keys);

        if !diff.has_changes() {
            log::info!("{}: snapshot unchanged", self.namespace);
        }
        if diff.stale.is_empty() {
            return Ok(ReconcileReceipt {
                diff,
                ..Default::default()
            });
        }

        let outcome = self
            .index
            .bulk_delete(&self.namespace, &diff.stale)
            .await
            .map_err(|e| AppError::index_unavailable(&self.namespace, e))?;
        log::info!(
            "{}: {} changes ({} added, {} stale), {} deleted",
            self.namespace,
            diff.change_count(),
            diff.added.len(),
            diff.stale.len(),
            outcome.succeeded
        );

        Ok(ReconcileReceipt {
            diff,
            deleted: outcome.succeeded,
            delete_failures: outcome.failed,
        })
    }
}
