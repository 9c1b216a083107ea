//! User content repository trait.

use crate::error::MetadataResult;
use crate::models::UserContentRow;
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for the per-user content views.
#[async_trait]
pub trait UserContentRepo: Send + Sync {
    /// Get a user's record for a content hash (most recent when several exist).
    async fn get_user_content_by_hash(
        &self,
        user_id: i64,
        file_hash: &str,
    ) -> MetadataResult<Option<UserContentRow>>;

    /// Get a user's record for a content id.
    async fn get_user_content(
        &self,
        user_id: i64,
        content_id: i64,
    ) -> MetadataResult<Option<UserContentRow>>;

    /// List a user's records, newest first.
    async fn list_user_contents(&self, user_id: i64) -> MetadataResult<Vec<UserContentRow>>;

    /// Mark an UPLOADING session CANCELLED. A session in any other state is
    /// left untouched; returns the number of rows changed.
    async fn cancel_uploading(
        &self,
        user_id: i64,
        content_id: i64,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<u64>;
}
