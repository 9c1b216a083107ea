//! Blob store trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use stash_core::ContentHash;
use std::pin::Pin;

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Result of merging staged chunks into a published blob.
#[derive(Clone, Debug)]
pub struct MergedBlob {
    /// Path of the published blob inside the store.
    pub path: String,
    /// Total size of the blob in bytes.
    pub size: u64,
}

/// Content-addressed blob store.
///
/// Published blobs live under a single namespace keyed by content hash; a name
/// only ever exists with content whose hash equals that name, and every
/// publish goes through a rename from a `.tmp` sibling. Staged chunks live in
/// per-user scratch areas so two tenants uploading the same hash concurrently
/// never collide on chunk indices.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Stage one chunk of an upload session.
    ///
    /// The chunk is written to a temp file and renamed into place, so a
    /// partially written chunk is never visible under its final name.
    /// Empty payloads are rejected.
    async fn write_chunk(
        &self,
        user_id: i64,
        hash: &ContentHash,
        index: u32,
        data: Bytes,
    ) -> StorageResult<()>;

    /// List staged chunk indices for a session, sorted ascending.
    ///
    /// The scratch directory listing is the source of truth for resume; an
    /// absent directory is an empty session, not an error.
    async fn list_chunks(&self, user_id: i64, hash: &ContentHash) -> StorageResult<Vec<u32>>;

    /// Concatenate chunks `0..total_chunks` into the published blob.
    ///
    /// Publishes via rename from `{hash}.tmp` and removes the scratch
    /// directory on success. A missing chunk aborts the merge with
    /// `ChunkMissing` and leaves the scratch area intact.
    async fn merge_chunks(
        &self,
        user_id: i64,
        hash: &ContentHash,
        total_chunks: u32,
    ) -> StorageResult<MergedBlob>;

    /// Remove a session's scratch directory.
    async fn cleanup_chunks(&self, user_id: i64, hash: &ContentHash) -> StorageResult<()>;

    /// Get a published blob's size in bytes.
    async fn blob_size(&self, hash: &ContentHash) -> StorageResult<u64>;

    /// Stream a published blob in full.
    async fn get_stream(&self, hash: &ContentHash) -> StorageResult<ByteStream>;

    /// Stream bytes `[start, end]` (inclusive) of a published blob.
    ///
    /// The caller is responsible for clamping the bounds to the blob size.
    async fn get_range_stream(
        &self,
        hash: &ContentHash,
        start: u64,
        end: u64,
    ) -> StorageResult<ByteStream>;

    /// Check whether a published blob exists.
    async fn exists(&self, hash: &ContentHash) -> StorageResult<bool>;

    /// Delete a published blob. Deleting an absent blob is not an error.
    async fn delete(&self, hash: &ContentHash) -> StorageResult<()>;

    /// Verify the backend is usable (directories exist and are writable).
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}
