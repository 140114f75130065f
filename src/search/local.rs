//! File-backed index: one JSON object per namespace, keyed by identity.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::models::KeyedDocument;
use crate::search::{BulkOutcome, SearchIndex};
use crate::storage::{LocalStorage, ObjectStorage};

type Namespace = BTreeMap<String, Value>;

/// Index stored as `{dir}/{namespace}.json`.
pub struct LocalIndex {
    storage: LocalStorage,
    // Serializes read-modify-write cycles
    lock: Mutex<()>,
}

impl LocalIndex {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            storage: LocalStorage::new(dir),
            lock: Mutex::new(()),
        }
    }

    fn key(namespace: &str) -> String {
        format!("{namespace}.json")
    }

    async fn load(&self, namespace: &str) -> Result<Namespace> {
        match self.storage.get(&Self::key(namespace)).await? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Namespace::new()),
        }
    }

    async fn save(&self, namespace: &str, documents: &Namespace) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(documents)?;
        self.storage.put(&Self::key(namespace), &bytes).await
    }

    /// Fetch one stored document.
    pub async fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>> {
        Ok(self.load(namespace).await?.remove(key))
    }
}

#[async_trait]
impl SearchIndex for LocalIndex {
    async fn bulk_upsert(
        &self,
        namespace: &str,
        documents: &[KeyedDocument],
    ) -> Result<BulkOutcome> {
        let _guard = self.lock.lock().await;
        let mut stored = self.load(namespace).await?;
        for (key, document) in documents {
            stored.insert(key.clone(), document.clone());
        }
        self.save(namespace, &stored).await?;

        Ok(BulkOutcome {
            succeeded: documents.len(),
            ..Default::default()
        })
    }

    async fn list_keys(&self, namespace: &str) -> Result<HashSet<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.load(namespace).await?.into_keys().collect())
    }

    async fn bulk_delete(&self, namespace: &str, keys: &[String]) -> Result<BulkOutcome> {
        let _guard = self.lock.lock().await;
        let mut stored = self.load(namespace).await?;
        for key in keys {
            stored.remove(key);
        }
        self.save(namespace, &stored).await?;

        Ok(BulkOutcome {
            succeeded: keys.len(),
            ..Default::default()
        })
    }
}
