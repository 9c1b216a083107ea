//! Blob store abstraction and backends for stash.
//!
//! This crate provides:
//! - Content-addressed blob storage with atomic publish-via-rename
//! - Per-user scratch areas for staged upload chunks
//! - Full and ranged streaming reads

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::filesystem::FilesystemStore;
pub use error::{StorageError, StorageResult};
pub use traits::{BlobStore, ByteStream, MergedBlob};

use stash_core::config::StorageConfig;
use std::sync::Arc;

/// Create a blob store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn BlobStore>> {
    let store = FilesystemStore::new(&config.base_path, &config.temp_path).await?;
    Ok(Arc::new(store))
}
