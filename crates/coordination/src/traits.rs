//! Coordination store trait definitions.

use crate::error::CoordinationResult;
use async_trait::async_trait;
use stash_core::{ContentHash, TombstoneStatus};
use std::time::Duration;

/// Terminal-state marker for a `(user, hash)` upload session.
///
/// A `completed` tombstone implies the metadata store holds a matching
/// `FileMeta` row and the blob store holds the object; it is what makes fast
/// upload instant. A `cancelled` tombstone rejects stragglers from a
/// cancelled session until it expires.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tombstone {
    pub user_id: i64,
    pub file_hash: ContentHash,
    pub content_id: i64,
    pub status: TombstoneStatus,
    /// Unix timestamp (seconds) of creation.
    pub created_at: i64,
}

impl Tombstone {
    /// Create a tombstone stamped with the current time.
    pub fn new(
        user_id: i64,
        file_hash: ContentHash,
        content_id: i64,
        status: TombstoneStatus,
    ) -> Self {
        Self {
            user_id,
            file_hash,
            content_id,
            status,
            created_at: time::OffsetDateTime::now_utc().unix_timestamp(),
        }
    }
}

/// Key of a tombstone entry.
pub fn tombstone_key(user_id: i64, hash: &ContentHash) -> String {
    format!("tombstone:{user_id}:{hash}")
}

/// Key of a chunk-set accelerator entry.
pub fn chunk_set_key(user_id: i64, hash: &ContentHash) -> String {
    format!("chunks:{user_id}:{hash}")
}

/// Key of a mutex entry.
pub fn lock_key(name: &str) -> String {
    format!("lock:{name}")
}

/// Ephemeral coordination store.
///
/// The mutex contract is the only safety-critical part: `unlock` and
/// `extend_lock` must compare the owner token and act in a single atomic step,
/// so a TTL expiry between read and delete can never release another owner's
/// lock.
#[async_trait]
pub trait CoordinationStore: Send + Sync + 'static {
    /// Try to take the named mutex. Returns false if it is held.
    async fn try_lock(&self, name: &str, owner: &str, ttl: Duration) -> CoordinationResult<bool>;

    /// Release the named mutex if (and only if) `owner` holds it.
    /// Returns false when the lock is absent or held by someone else.
    async fn unlock(&self, name: &str, owner: &str) -> CoordinationResult<bool>;

    /// Refresh the TTL of the named mutex if `owner` holds it.
    async fn extend_lock(&self, name: &str, owner: &str, ttl: Duration)
        -> CoordinationResult<bool>;

    /// Write a tombstone. `ttl = None` means the entry never expires.
    async fn put_tombstone(
        &self,
        tombstone: &Tombstone,
        ttl: Option<Duration>,
    ) -> CoordinationResult<()>;

    /// Read the tombstone for `(user, hash)`, if any.
    async fn get_tombstone(
        &self,
        user_id: i64,
        hash: &ContentHash,
    ) -> CoordinationResult<Option<Tombstone>>;

    /// Delete the tombstone for `(user, hash)`. Absent entries are fine.
    async fn delete_tombstone(&self, user_id: i64, hash: &ContentHash) -> CoordinationResult<()>;

    /// Bulk-write tombstones (pipelined where the backend supports it).
    /// Used by the startup reconciler.
    async fn publish_tombstones(
        &self,
        tombstones: &[(Tombstone, Option<Duration>)],
    ) -> CoordinationResult<()>;

    /// Record an uploaded chunk index in the accelerator set.
    async fn record_chunk(
        &self,
        user_id: i64,
        hash: &ContentHash,
        index: u32,
    ) -> CoordinationResult<()>;

    /// Read the accelerator set. May be stale or empty; advisory only.
    async fn chunk_indices(
        &self,
        user_id: i64,
        hash: &ContentHash,
    ) -> CoordinationResult<Vec<u32>>;

    /// Drop the accelerator set for a session.
    async fn clear_chunks(&self, user_id: i64, hash: &ContentHash) -> CoordinationResult<()>;

    /// Verify backend connectivity.
    async fn health_check(&self) -> CoordinationResult<()>;
}
