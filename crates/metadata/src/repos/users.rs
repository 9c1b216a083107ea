//! User repository trait.

use crate::error::MetadataResult;
use crate::models::UserRow;
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for user accounts.
#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Create a user. Fails with `AlreadyExists` on a duplicate username.
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        created_at: OffsetDateTime,
    ) -> MetadataResult<UserRow>;

    /// Look up a user by username.
    async fn get_user_by_username(&self, username: &str) -> MetadataResult<Option<UserRow>>;

    /// Look up a user by id.
    async fn get_user(&self, user_id: i64) -> MetadataResult<Option<UserRow>>;
}
