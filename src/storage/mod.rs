//! Object storage for snapshot archives.
//!
//! Keys are slash-separated paths relative to the backend root:
//!
//! ```text
//! {root}/
//! ├── data/
//! │   └── doctors.json                      # latest snapshot (overwritten)
//! ├── archive/
//! │   └── doctors-20260309T040506Z.json     # historical snapshot (write-once)
//! ├── stats.json
//! └── stats/
//!     └── stats-20260309T040506Z.json
//! ```

pub mod local;
#[cfg(feature = "s3")]
pub mod s3;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{StorageBackend, StorageConfig};

pub use local::LocalStorage;
#[cfg(feature = "s3")]
pub use s3::S3Storage;

/// A key/value blob store.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Write `bytes` under `key`, replacing any previous object.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Read the object under `key`, or `None` if it does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Human-readable location of `key`, for logs.
    fn location(&self, key: &str) -> String;
}

/// Open the configured storage backend.
pub async fn open(config: &StorageConfig) -> Result<Arc<dyn ObjectStorage>> {
    match config.backend {
        StorageBackend::Local => Ok(Arc::new(LocalStorage::new(&config.local_dir))),
        #[cfg(feature = "s3")]
        StorageBackend::S3 => Ok(Arc::new(
            S3Storage::from_env(&config.bucket, &config.prefix).await,
        )),
        #[cfg(not(feature = "s3"))]
        StorageBackend::S3 => Err(crate::error::AppError::config(
            "storage backend 's3' requires the `s3` feature",
        )),
    }
}
