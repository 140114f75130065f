//! Search index backends.
//!
//! Documents are addressed by `(namespace, identity key)`. Upserting a key
//! that already exists replaces its document, so re-indexing the same
//! snapshot is idempotent.

pub mod elastic;
pub mod local;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::Result;
use crate::models::{IndexBackend, IndexConfig, KeyedDocument};

pub use elastic::ElasticIndex;
pub use local::LocalIndex;

/// Per-document outcome of a bulk request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    pub succeeded: usize,
    pub failed: usize,
    /// One line per failed document
    pub errors: Vec<String>,
}

impl BulkOutcome {
    pub fn all_failed(&self) -> bool {
        self.succeeded == 0 && self.failed > 0
    }
}

/// A keyed document store supporting bulk writes.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Insert or replace documents by key.
    async fn bulk_upsert(
        &self,
        namespace: &str,
        documents: &[KeyedDocument],
    ) -> Result<BulkOutcome>;

    /// Every key currently stored in the namespace.
    async fn list_keys(&self, namespace: &str) -> Result<HashSet<String>>;

    /// Remove documents by key. Missing keys count as removed.
    async fn bulk_delete(&self, namespace: &str, keys: &[String]) -> Result<BulkOutcome>;
}

/// Open the configured index backend.
pub fn open(config: &IndexConfig, client: &Client) -> Result<Arc<dyn SearchIndex>> {
    let index: Arc<dyn SearchIndex> = match config.backend {
        IndexBackend::Local => Arc::new(LocalIndex::new(&config.local_dir)),
        IndexBackend::Elasticsearch => Arc::new(ElasticIndex::new(config, client.clone())?),
    };
    Ok(index)
}
