//! Blob store abstraction.

use std::path::Path;

use async_trait::async_trait;

use crate::error::StorageResult;

/// Size and type of a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHead {
    pub size_bytes: u64,
    pub content_type: Option<String>,
}

/// Object storage operations the worker relies on.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch size and content type without the body.
    async fn head(&self, key: &str) -> StorageResult<ObjectHead>;

    /// Write the object body to `path`, creating parent directories.
    async fn download(&self, key: &str, path: &Path) -> StorageResult<()>;

    /// Store the file at `path` under `key`, overwriting any existing object.
    async fn upload(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<()>;

    /// Server-side copy; returns the size of the new object.
    async fn copy(&self, src_key: &str, dest_key: &str, content_type: &str) -> StorageResult<u64>;
}
