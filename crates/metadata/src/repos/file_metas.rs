//! File meta repository trait.

use crate::error::MetadataResult;
use crate::models::FileMetaRow;
use async_trait::async_trait;

/// Repository for the reference-counted physical file records.
///
/// Refcount mutation happens only inside the transactional operations of
/// `UploadRepo`; this trait is the read surface.
#[async_trait]
pub trait FileMetaRepo: Send + Sync {
    /// Get the file meta for a content hash.
    async fn get_file_meta(&self, file_hash: &str) -> MetadataResult<Option<FileMetaRow>>;

    /// All content hashes with a file meta row. Used by the reconciler to
    /// verify completed rows against real files.
    async fn file_meta_hashes(&self) -> MetadataResult<Vec<String>>;
}
