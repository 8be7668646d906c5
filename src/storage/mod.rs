pub mod local;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Where a payload ended up after `Storage::put`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Root-relative key, always starting with `/`.
    pub key: String,
    /// Final path segment of the key.
    pub title: String,
    pub size: u64,
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Writes `data` under `key`, creating parent directories.
    async fn put(&self, key: &str, data: Bytes) -> Result<StoredObject>;

    /// Recursively lists file keys below `prefix`, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    async fn exists(&self, key: &str) -> Result<bool>;
}
