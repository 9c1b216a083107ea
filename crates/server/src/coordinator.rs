//! Upload coordination engine.
//!
//! The state machine spanning init → chunk → merge | cancel, plus fast upload
//! and delete. It is the only writer that touches all three stores, and it
//! keeps them consistent by layering rather than by distributed transaction:
//! the metadata store is the sole authority for user-visible state, the blob
//! store is content-addressed and publishes only via rename, and the
//! coordination store holds an advisory cache plus terminal tombstones that
//! the reconciler can always rebuild from metadata.

use bytes::Bytes;
use stash_coordination::{
    CoordinationError, CoordinationStore, DistributedLock, Tombstone, TOMBSTONE_TTL,
};
use stash_core::content::{InitStatus, InitUploadResponse};
use stash_core::{ContentHash, TombstoneStatus, UploadStatus};
use stash_metadata::{
    FileMetaRepo, MetadataError, MetadataStore, UploadRepo, UserContentRepo,
};
use stash_storage::{BlobStore, MergedBlob, StorageError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

/// TTL of the init lock.
const INIT_LOCK_TTL: Duration = Duration::from_secs(30);
/// TTL of the merge lock. Merges copy every chunk, so they get the long TTL.
const MERGE_LOCK_TTL: Duration = Duration::from_secs(120);
/// TTL of the cancel lock.
const CANCEL_LOCK_TTL: Duration = Duration::from_secs(30);
/// TTL of the fast-upload lock.
const FAST_LOCK_TTL: Duration = Duration::from_secs(30);
/// TTL of the delete lock.
const DELETE_LOCK_TTL: Duration = Duration::from_secs(30);

/// Upload coordination errors.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("upload already completed")]
    AlreadyCompleted,

    #[error("upload was cancelled")]
    Cancelled,

    #[error("missing {} chunks", .0.len())]
    MissingChunks(Vec<u32>),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Coordination(#[from] CoordinationError),
}

/// Outcome of a chunk upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// The chunk was staged.
    Uploaded,
    /// The chunk was already on disk; the retry is an idempotent success.
    AlreadyUploaded,
}

/// The upload coordination engine.
pub struct UploadCoordinator {
    storage: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    coordination: Arc<dyn CoordinationStore>,
}

impl UploadCoordinator {
    /// Create a coordinator over the three stores.
    pub fn new(
        storage: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
        coordination: Arc<dyn CoordinationStore>,
    ) -> Self {
        Self {
            storage,
            metadata,
            coordination,
        }
    }

    /// Run `op` while holding the named lock, releasing it on every exit path.
    async fn with_lock<T, F, Fut>(
        &self,
        name: String,
        ttl: Duration,
        op: F,
    ) -> Result<T, UploadError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, UploadError>>,
    {
        let lock = DistributedLock::new(self.coordination.clone(), name, ttl);
        lock.acquire().await?;
        let result = op().await;
        lock.release_quietly().await;
        result
    }

    /// Read the tombstone for `(user, hash)`, degrading to "unknown" when the
    /// coordination store is unreachable.
    async fn tombstone_or_none(&self, user_id: i64, hash: &ContentHash) -> Option<Tombstone> {
        match self.coordination.get_tombstone(user_id, hash).await {
            Ok(tombstone) => tombstone,
            Err(e) => {
                tracing::warn!(user_id, hash = %hash, error = %e, "tombstone check failed");
                None
            }
        }
    }

    /// Initialize (or resume) an upload session.
    #[tracing::instrument(skip(self, file_name), fields(user_id, hash = %file_hash))]
    pub async fn init(
        &self,
        user_id: i64,
        file_name: &str,
        file_hash: &ContentHash,
    ) -> Result<InitUploadResponse, UploadError> {
        // Fast-upload check against the tombstone first.
        let tombstone = self.tombstone_or_none(user_id, file_hash).await;
        let had_tombstone = tombstone.is_some();

        if let Some(tombstone) = tombstone {
            match tombstone.status {
                TombstoneStatus::Completed => {
                    if tombstone.content_id > 0 && self.storage.exists(file_hash).await? {
                        tracing::debug!(content_id = tombstone.content_id, "fast upload hit");
                        return Ok(InitUploadResponse {
                            status: InitStatus::FastUpload,
                            content_id: tombstone.content_id,
                            uploaded_chunks: Vec::new(),
                        });
                    }
                    // The tombstone claims a blob that is not there. Drop the
                    // stale entry and run a fresh session.
                    tracing::warn!("completed tombstone without blob, repairing");
                    if let Err(e) = self.coordination.delete_tombstone(user_id, file_hash).await {
                        tracing::warn!(error = %e, "failed to delete stale tombstone");
                    }
                }
                TombstoneStatus::Cancelled => {
                    // The caller is explicitly retrying a cancelled session.
                    if let Err(e) = self.coordination.delete_tombstone(user_id, file_hash).await {
                        tracing::warn!(error = %e, "failed to delete cancelled tombstone");
                    }
                }
            }
        }

        // No tombstone known: probe the metadata store, which may have the
        // completed state the coordination store lost.
        if !had_tombstone {
            if let Some(response) = self.probe_completed(user_id, file_hash).await? {
                return Ok(response);
            }

            // Cross-user dedup: identical content already exists under some
            // other user's reference. Adopt it for this caller instead of
            // opening a byte-transfer session.
            if self.blob_recorded(file_hash).await? {
                match self.fast_upload(user_id, 0, file_name, file_hash).await {
                    Ok(content_id) => {
                        tracing::debug!(content_id, "fast upload via cross-user dedup");
                        return Ok(InitUploadResponse {
                            status: InitStatus::FastUpload,
                            content_id,
                            uploaded_chunks: Vec::new(),
                        });
                    }
                    // The file meta vanished under us (a concurrent delete of
                    // the last reference); fall through to a full session.
                    Err(UploadError::Metadata(MetadataError::NotFound(_))) => {}
                    Err(e) => return Err(e),
                }
            }
        }

        let lock_name = format!("upload:init:{user_id}:{file_hash}");
        self.with_lock(lock_name, INIT_LOCK_TTL, || async {
            let content_id = self
                .metadata
                .begin_upload(user_id, file_name, file_hash.as_str(), OffsetDateTime::now_utc())
                .await?;

            // Resume strictly from the filesystem. The chunk accelerator may
            // have lost entries across a coordination-store restart.
            let uploaded_chunks = match self.storage.list_chunks(user_id, file_hash).await {
                Ok(chunks) => chunks,
                Err(e) => {
                    tracing::warn!(error = %e, "chunk listing failed, treating session as new");
                    Vec::new()
                }
            };

            let status = if uploaded_chunks.is_empty() {
                InitStatus::New
            } else {
                InitStatus::Resumable
            };

            Ok(InitUploadResponse {
                status,
                content_id,
                uploaded_chunks,
            })
        })
        .await
    }

    /// Check that the hash is recorded in metadata and the blob really exists.
    async fn blob_recorded(&self, file_hash: &ContentHash) -> Result<bool, UploadError> {
        match self.metadata.get_file_meta(file_hash.as_str()).await? {
            Some(meta) if !meta.file_path.is_empty() => {}
            _ => return Ok(false),
        }
        Ok(self.storage.exists(file_hash).await?)
    }

    /// Metadata-side fast-upload probe: a COMPLETED user content plus a file
    /// meta verified against the blob store yields a fast upload and repairs
    /// the missing tombstone.
    async fn probe_completed(
        &self,
        user_id: i64,
        file_hash: &ContentHash,
    ) -> Result<Option<InitUploadResponse>, UploadError> {
        let user_content = match self
            .metadata
            .get_user_content_by_hash(user_id, file_hash.as_str())
            .await?
        {
            Some(uc) if uc.status == UploadStatus::Completed.as_i64() => uc,
            _ => return Ok(None),
        };

        if !self.blob_recorded(file_hash).await? {
            return Ok(None);
        }

        let tombstone = Tombstone::new(
            user_id,
            file_hash.clone(),
            user_content.content_id,
            TombstoneStatus::Completed,
        );
        if let Err(e) = self.coordination.put_tombstone(&tombstone, None).await {
            tracing::warn!(error = %e, "failed to repair completed tombstone");
        }

        Ok(Some(InitUploadResponse {
            status: InitStatus::FastUpload,
            content_id: user_content.content_id,
            uploaded_chunks: Vec::new(),
        }))
    }

    /// Stage one chunk of an upload session.
    ///
    /// No lock is taken: each index maps to a distinct filename and the blob
    /// store publishes chunks atomically, so concurrent writers are safe.
    #[tracing::instrument(skip(self, data), fields(user_id, hash = %file_hash, chunk_index, size = data.len()))]
    pub async fn upload_chunk(
        &self,
        user_id: i64,
        file_hash: &ContentHash,
        chunk_index: u32,
        data: Bytes,
    ) -> Result<ChunkOutcome, UploadError> {
        if let Some(tombstone) = self.tombstone_or_none(user_id, file_hash).await {
            match tombstone.status {
                TombstoneStatus::Completed => return Err(UploadError::AlreadyCompleted),
                TombstoneStatus::Cancelled => return Err(UploadError::Cancelled),
            }
        }

        // Idempotence against the filesystem, not the accelerator.
        let existing = self
            .storage
            .list_chunks(user_id, file_hash)
            .await
            .unwrap_or_default();
        if existing.contains(&chunk_index) {
            tracing::debug!("chunk already staged");
            return Ok(ChunkOutcome::AlreadyUploaded);
        }

        self.storage
            .write_chunk(user_id, file_hash, chunk_index, data)
            .await?;

        // Accelerator update is best-effort; the directory listing stays
        // authoritative.
        if let Err(e) = self
            .coordination
            .record_chunk(user_id, file_hash, chunk_index)
            .await
        {
            tracing::warn!(error = %e, "failed to record chunk in accelerator");
        }

        Ok(ChunkOutcome::Uploaded)
    }

    /// Merge staged chunks into the published blob and commit the metadata.
    #[tracing::instrument(skip(self, file_name), fields(user_id, hash = %file_hash, total_chunks))]
    pub async fn merge(
        &self,
        user_id: i64,
        content_id: i64,
        file_name: &str,
        file_hash: &ContentHash,
        total_chunks: u32,
    ) -> Result<MergedBlob, UploadError> {
        let lock_name = format!("upload:merge:{user_id}:{file_hash}");
        self.with_lock(lock_name, MERGE_LOCK_TTL, || async {
            // A concurrent merge may have won while we waited on the lock; the
            // loser observes the completed state and succeeds idempotently.
            if let Some(tombstone) = self.tombstone_or_none(user_id, file_hash).await {
                if tombstone.status == TombstoneStatus::Completed {
                    if let Some(meta) = self.metadata.get_file_meta(file_hash.as_str()).await? {
                        tracing::debug!("merge raced a completed session");
                        return Ok(MergedBlob {
                            path: meta.file_path,
                            size: meta.file_size as u64,
                        });
                    }
                }
            }

            let uploaded = self.storage.list_chunks(user_id, file_hash).await?;
            let missing = missing_indices(&uploaded, total_chunks);
            if !missing.is_empty() {
                return Err(UploadError::MissingChunks(missing));
            }

            let merged = self
                .storage
                .merge_chunks(user_id, file_hash, total_chunks)
                .await?;

            if let Err(e) = self
                .metadata
                .finish_merge(
                    user_id,
                    content_id,
                    file_name,
                    file_hash.as_str(),
                    &merged.path,
                    merged.size as i64,
                    OffsetDateTime::now_utc(),
                )
                .await
            {
                // The blob published but the metadata commit failed: roll the
                // blob back best-effort and let the caller retry the merge.
                tracing::error!(error = %e, "metadata commit failed after merge, rolling back blob");
                if let Err(del) = self.storage.delete(file_hash).await {
                    tracing::warn!(error = %del, "failed to roll back merged blob");
                }
                return Err(e.into());
            }

            if let Err(e) = self.coordination.clear_chunks(user_id, file_hash).await {
                tracing::warn!(error = %e, "failed to clear chunk accelerator");
            }

            let tombstone = Tombstone::new(
                user_id,
                file_hash.clone(),
                content_id,
                TombstoneStatus::Completed,
            );
            if let Err(e) = self.coordination.put_tombstone(&tombstone, None).await {
                tracing::warn!(error = %e, "failed to write completed tombstone");
            }

            Ok(merged)
        })
        .await
    }

    /// Complete an upload by reference only.
    #[tracing::instrument(skip(self, file_name), fields(user_id, hash = %file_hash))]
    pub async fn fast_upload(
        &self,
        user_id: i64,
        content_id: i64,
        file_name: &str,
        file_hash: &ContentHash,
    ) -> Result<i64, UploadError> {
        let lock_name = format!("upload:fast:{user_id}:{file_hash}");
        self.with_lock(lock_name, FAST_LOCK_TTL, || async {
            let content_id = self
                .metadata
                .adopt_for_fast_upload(
                    user_id,
                    content_id,
                    file_name,
                    file_hash.as_str(),
                    OffsetDateTime::now_utc(),
                )
                .await?;

            let tombstone = Tombstone::new(
                user_id,
                file_hash.clone(),
                content_id,
                TombstoneStatus::Completed,
            );
            if let Err(e) = self.coordination.put_tombstone(&tombstone, None).await {
                tracing::warn!(error = %e, "failed to write completed tombstone");
            }

            Ok(content_id)
        })
        .await
    }

    /// Cancel an in-flight upload session.
    #[tracing::instrument(skip(self), fields(user_id, hash = %file_hash))]
    pub async fn cancel(
        &self,
        user_id: i64,
        content_id: i64,
        file_hash: &ContentHash,
    ) -> Result<(), UploadError> {
        let lock_name = format!("upload:cancel:{user_id}:{file_hash}");
        self.with_lock(lock_name, CANCEL_LOCK_TTL, || async {
            self.metadata
                .cancel_uploading(user_id, content_id, OffsetDateTime::now_utc())
                .await?;

            if let Err(e) = self.storage.cleanup_chunks(user_id, file_hash).await {
                tracing::warn!(error = %e, "failed to remove scratch chunks");
            }
            if let Err(e) = self.coordination.clear_chunks(user_id, file_hash).await {
                tracing::warn!(error = %e, "failed to clear chunk accelerator");
            }

            let tombstone = Tombstone::new(
                user_id,
                file_hash.clone(),
                content_id,
                TombstoneStatus::Cancelled,
            );
            self.coordination
                .put_tombstone(&tombstone, Some(TOMBSTONE_TTL))
                .await?;

            Ok(())
        })
        .await
    }

    /// Delete a user's reference to a blob, dropping the blob itself when the
    /// last reference goes away.
    #[tracing::instrument(skip(self), fields(user_id, hash = %file_hash))]
    pub async fn delete(&self, user_id: i64, file_hash: &ContentHash) -> Result<(), UploadError> {
        let lock_name = format!("file:delete:{user_id}:{file_hash}");
        self.with_lock(lock_name, DELETE_LOCK_TTL, || async {
            let outcome = self
                .metadata
                .delete_user_file(user_id, file_hash.as_str())
                .await?;

            if outcome.blob_released {
                // The metadata row is gone; a missing blob is tolerated.
                if let Err(e) = self.storage.delete(file_hash).await {
                    tracing::warn!(error = %e, "failed to delete released blob");
                }
            }

            if let Err(e) = self.coordination.delete_tombstone(user_id, file_hash).await {
                tracing::warn!(error = %e, "failed to delete tombstone");
            }

            Ok(())
        })
        .await
    }
}

/// Compute the indices in `0..total` absent from the sorted `uploaded` list.
fn missing_indices(uploaded: &[u32], total: u32) -> Vec<u32> {
    let present: std::collections::HashSet<u32> = uploaded.iter().copied().collect();
    (0..total).filter(|i| !present.contains(i)).collect()
}
