//! Object store provider trait for raw PDF files

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Trait for storing uploaded files by object name
///
/// Implementations:
/// - `LocalObjectStore`: Local filesystem
/// - `S3ObjectStore`: MinIO or any S3-compatible service
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create the bucket (or directory) if it does not exist yet
    async fn ensure_bucket(&self) -> Result<()>;

    /// Store an object, replacing any previous content
    async fn put(&self, name: &str, data: Vec<u8>, content_type: &str) -> Result<()>;

    /// Fetch an object's bytes
    async fn get(&self, name: &str) -> Result<Vec<u8>>;

    /// Delete an object; `false` when nothing was removed
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Time-limited direct download URL, if the backend supports one
    async fn presigned_get_url(&self, name: &str, expiry: Duration) -> Result<Option<String>>;

    /// Check if the provider is healthy
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
