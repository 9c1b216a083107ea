//! Content repository trait.

use crate::error::MetadataResult;
use crate::models::ContentRow;
use async_trait::async_trait;

/// Repository for content records.
#[async_trait]
pub trait ContentRepo: Send + Sync {
    /// Get a content owned by the given user.
    async fn get_content(&self, owner_id: i64, content_id: i64)
        -> MetadataResult<Option<ContentRow>>;

    /// List a user's contents, newest first.
    async fn list_contents(&self, owner_id: i64) -> MetadataResult<Vec<ContentRow>>;
}
