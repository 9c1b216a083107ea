//! Distributed mutex helper.

use crate::error::{CoordinationError, CoordinationResult};
use crate::traits::CoordinationStore;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Delay between lock acquisition attempts.
const RETRY_DELAY: Duration = Duration::from_millis(50);

/// Maximum acquisition attempts (~5 s ceiling at 50 ms per attempt).
const MAX_ATTEMPTS: u32 = 100;

/// A named distributed mutex with a random owner token.
///
/// The owner token makes release safe: only the instance that acquired the
/// lock can release or extend it, even after its TTL has lapsed and another
/// caller has taken it over.
pub struct DistributedLock {
    store: Arc<dyn CoordinationStore>,
    name: String,
    owner: String,
    ttl: Duration,
}

impl DistributedLock {
    /// Create a lock handle for the given name and TTL.
    pub fn new(store: Arc<dyn CoordinationStore>, name: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            name: name.into(),
            owner: Uuid::new_v4().to_string(),
            ttl,
        }
    }

    /// The lock name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Try to acquire without blocking.
    pub async fn try_acquire(&self) -> CoordinationResult<bool> {
        self.store.try_lock(&self.name, &self.owner, self.ttl).await
    }

    /// Acquire the lock, polling until it frees up or attempts are exhausted.
    pub async fn acquire(&self) -> CoordinationResult<()> {
        for _ in 0..MAX_ATTEMPTS {
            if self.try_acquire().await? {
                return Ok(());
            }
            tokio::time::sleep(RETRY_DELAY).await;
        }
        Err(CoordinationError::LockContended(self.name.clone()))
    }

    /// Release the lock. Fails with `LockNotHeld` when the TTL already lapsed
    /// and someone else holds it (or nobody does).
    pub async fn release(&self) -> CoordinationResult<()> {
        if self.store.unlock(&self.name, &self.owner).await? {
            Ok(())
        } else {
            Err(CoordinationError::LockNotHeld(self.name.clone()))
        }
    }

    /// Release, logging instead of failing when the lock was lost.
    ///
    /// Used on operation exit paths where losing an expired lock is not an
    /// error worth surfacing to the caller.
    pub async fn release_quietly(&self) {
        match self.release().await {
            Ok(()) => {}
            Err(CoordinationError::LockNotHeld(name)) => {
                tracing::warn!(lock = %name, "lock expired before release");
            }
            Err(e) => {
                tracing::warn!(lock = %self.name, error = %e, "failed to release lock");
            }
        }
    }

    /// Refresh the TTL while still holding the lock.
    pub async fn extend(&self, ttl: Duration) -> CoordinationResult<()> {
        if self.store.extend_lock(&self.name, &self.owner, ttl).await? {
            Ok(())
        } else {
            Err(CoordinationError::LockNotHeld(self.name.clone()))
        }
    }
}
