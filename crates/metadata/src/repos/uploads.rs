//! Upload transaction repository trait.
//!
//! These are the multi-step operations the upload coordinator drives. Each
//! runs inside a single database transaction so the row-lock orderings the
//! state machine depends on (content row on init, file meta row on
//! merge/fast/delete) hold against concurrent writers.

use crate::error::MetadataResult;
use crate::models::DeleteOutcome;
use async_trait::async_trait;
use time::OffsetDateTime;

/// Transactional operations backing the upload state machine.
#[async_trait]
pub trait UploadRepo: Send + Sync {
    /// Find-or-create the content keyed by `(owner, hash)` and the matching
    /// user content, (re)setting it to UPLOADING. Returns the content id.
    async fn begin_upload(
        &self,
        user_id: i64,
        file_name: &str,
        file_hash: &str,
        now: OffsetDateTime,
    ) -> MetadataResult<i64>;

    /// Record a successful merge: insert the file meta with refcount 1 (or
    /// bump an existing one), and flip the user content to COMPLETED.
    ///
    /// A user content already COMPLETED for this hash does not bump the
    /// refcount again, keeping repeated merges idempotent.
    async fn finish_merge(
        &self,
        user_id: i64,
        content_id: i64,
        file_name: &str,
        file_hash: &str,
        file_path: &str,
        file_size: i64,
        now: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Complete an upload by reference only. The file meta must already
    /// exist. When `content_id` is not owned by the caller, a content owned
    /// by the caller is found-or-created for the hash, so dedup works across
    /// users. Returns the content id actually linked.
    async fn adopt_for_fast_upload(
        &self,
        user_id: i64,
        content_id: i64,
        file_name: &str,
        file_hash: &str,
        now: OffsetDateTime,
    ) -> MetadataResult<i64>;

    /// Delete the user's records for a hash and decrement the refcount,
    /// flooring at zero. Drops the file meta row when the count reaches zero
    /// and reports that the blob should be deleted.
    async fn delete_user_file(&self, user_id: i64, file_hash: &str)
        -> MetadataResult<DeleteOutcome>;
}
