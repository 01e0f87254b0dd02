//! Port definition for avatar byte storage.

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::domain::entities::{ImageExtension, UserIdentifier};

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Errors that can occur during cache operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// No file for this identifier.
    #[error("avatar not cached: {0}")]
    NotFound(String),
    /// I/O error during cache operation.
    #[error("IO error: {0}")]
    IoError(String),
}

/// Durable storage for avatar bytes, one blob per identifier and extension.
/// Implementations must be thread-safe.
#[async_trait::async_trait]
pub trait AvatarStorePort: Send + Sync {
    /// Lists the raw file names currently held by the store.
    async fn list(&self) -> CacheResult<Vec<String>>;

    /// Reads the stored bytes.
    async fn read(&self, id: &UserIdentifier, ext: ImageExtension) -> CacheResult<Bytes>;

    /// Persists bytes durably. On error nothing is visible under the final name.
    async fn write(&self, id: &UserIdentifier, ext: ImageExtension, bytes: &[u8])
    -> CacheResult<()>;

    /// Last modification time of the stored blob.
    async fn modified(&self, id: &UserIdentifier, ext: ImageExtension)
    -> CacheResult<DateTime<Utc>>;

    /// Deletes the blob. Deleting a missing blob is not an error.
    async fn delete(&self, id: &UserIdentifier, ext: ImageExtension) -> CacheResult<()>;
}
