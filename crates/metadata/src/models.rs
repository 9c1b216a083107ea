//! Database models mapping to the metadata schema.

use sqlx::FromRow;
use time::OffsetDateTime;

/// User record.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub user_id: i64,
    pub username: String,
    pub password_hash: String,
    pub created_at: OffsetDateTime,
}

/// A user's logical upload record.
///
/// Each user owns their own content rows; dedup happens one level down in
/// `file_metas`, never by sharing contents across users.
#[derive(Debug, Clone, FromRow)]
pub struct ContentRow {
    pub content_id: i64,
    pub owner_id: i64,
    /// Content hash at first upload. Empty for interim rows.
    pub source_hash: String,
    pub title: String,
    pub created_at: OffsetDateTime,
}

/// Reference-counted physical file record, keyed by content hash.
///
/// Exists iff the blob store holds the object. `ref_count` equals the number
/// of COMPLETED `user_contents` rows carrying this hash; when it reaches zero
/// the row and the blob are both deleted.
#[derive(Debug, Clone, FromRow)]
pub struct FileMetaRow {
    pub file_hash: String,
    pub content_id: i64,
    pub file_path: String,
    pub file_size: i64,
    pub format: Option<String>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub ref_count: i64,
    pub created_at: OffsetDateTime,
}

/// Per-user view linking a user to a content.
#[derive(Debug, Clone, FromRow)]
pub struct UserContentRow {
    pub id: i64,
    pub user_id: i64,
    pub content_id: i64,
    pub file_name: String,
    pub file_hash: String,
    /// See `stash_core::UploadStatus` for the mapping.
    pub status: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Projection used by the startup reconciler.
#[derive(Debug, Clone, FromRow)]
pub struct ReconcileRow {
    pub user_id: i64,
    pub file_hash: String,
    pub content_id: i64,
    pub status: i64,
}

/// Outcome of a user-level delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Number of `user_contents` rows removed.
    pub rows_deleted: u64,
    /// True when the refcount reached zero and the `file_metas` row was
    /// dropped; the caller must then delete the blob.
    pub blob_released: bool,
}
