//! In-process coordination backend.
//!
//! Single-node stand-in for Redis, used by tests and deployments without an
//! external coordination service. Expiry is lazy: entries are checked against
//! their deadline on access.

use crate::error::CoordinationResult;
use crate::traits::{chunk_set_key, lock_key, tombstone_key, CoordinationStore, Tombstone};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use stash_core::ContentHash;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

struct LockEntry {
    owner: String,
    expires_at: Instant,
}

struct TombstoneEntry {
    tombstone: Tombstone,
    expires_at: Option<Instant>,
}

struct ChunkSetEntry {
    indices: BTreeSet<u32>,
    expires_at: Instant,
}

/// In-memory coordination store.
#[derive(Default)]
pub struct MemoryCoordination {
    locks: DashMap<String, LockEntry>,
    tombstones: DashMap<String, TombstoneEntry>,
    chunk_sets: DashMap<String, ChunkSetEntry>,
}

impl MemoryCoordination {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CoordinationStore for MemoryCoordination {
    async fn try_lock(&self, name: &str, owner: &str, ttl: Duration) -> CoordinationResult<bool> {
        let now = Instant::now();
        // The dashmap entry holds the shard lock, making check-then-set atomic.
        match self.locks.entry(lock_key(name)) {
            Entry::Occupied(mut entry) => {
                if entry.get().expires_at > now {
                    return Ok(false);
                }
                entry.insert(LockEntry {
                    owner: owner.to_string(),
                    expires_at: now + ttl,
                });
                Ok(true)
            }
            Entry::Vacant(entry) => {
                entry.insert(LockEntry {
                    owner: owner.to_string(),
                    expires_at: now + ttl,
                });
                Ok(true)
            }
        }
    }

    async fn unlock(&self, name: &str, owner: &str) -> CoordinationResult<bool> {
        let now = Instant::now();
        let removed = self
            .locks
            .remove_if(&lock_key(name), |_, entry| {
                entry.owner == owner && entry.expires_at > now
            })
            .is_some();
        Ok(removed)
    }

    async fn extend_lock(
        &self,
        name: &str,
        owner: &str,
        ttl: Duration,
    ) -> CoordinationResult<bool> {
        let now = Instant::now();
        match self.locks.entry(lock_key(name)) {
            Entry::Occupied(mut entry) => {
                let held = entry.get().owner == owner && entry.get().expires_at > now;
                if held {
                    entry.get_mut().expires_at = now + ttl;
                }
                Ok(held)
            }
            Entry::Vacant(_) => Ok(false),
        }
    }

    async fn put_tombstone(
        &self,
        tombstone: &Tombstone,
        ttl: Option<Duration>,
    ) -> CoordinationResult<()> {
        let key = tombstone_key(tombstone.user_id, &tombstone.file_hash);
        self.tombstones.insert(
            key,
            TombstoneEntry {
                tombstone: tombstone.clone(),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn get_tombstone(
        &self,
        user_id: i64,
        hash: &ContentHash,
    ) -> CoordinationResult<Option<Tombstone>> {
        let key = tombstone_key(user_id, hash);
        if let Some(entry) = self.tombstones.get(&key) {
            match entry.expires_at {
                Some(deadline) if deadline <= Instant::now() => {}
                _ => return Ok(Some(entry.tombstone.clone())),
            }
        } else {
            return Ok(None);
        }
        // Expired: drop it and report absence.
        self.tombstones.remove(&key);
        Ok(None)
    }

    async fn delete_tombstone(&self, user_id: i64, hash: &ContentHash) -> CoordinationResult<()> {
        self.tombstones.remove(&tombstone_key(user_id, hash));
        Ok(())
    }

    async fn publish_tombstones(
        &self,
        tombstones: &[(Tombstone, Option<Duration>)],
    ) -> CoordinationResult<()> {
        for (tombstone, ttl) in tombstones {
            self.put_tombstone(tombstone, *ttl).await?;
        }
        Ok(())
    }

    async fn record_chunk(
        &self,
        user_id: i64,
        hash: &ContentHash,
        index: u32,
    ) -> CoordinationResult<()> {
        let mut entry = self
            .chunk_sets
            .entry(chunk_set_key(user_id, hash))
            .or_insert_with(|| ChunkSetEntry {
                indices: BTreeSet::new(),
                expires_at: Instant::now() + crate::CHUNK_SET_TTL,
            });
        entry.indices.insert(index);
        entry.expires_at = Instant::now() + crate::CHUNK_SET_TTL;
        Ok(())
    }

    async fn chunk_indices(
        &self,
        user_id: i64,
        hash: &ContentHash,
    ) -> CoordinationResult<Vec<u32>> {
        let key = chunk_set_key(user_id, hash);
        if let Some(entry) = self.chunk_sets.get(&key) {
            if entry.expires_at > Instant::now() {
                return Ok(entry.indices.iter().copied().collect());
            }
        } else {
            return Ok(Vec::new());
        }
        self.chunk_sets.remove(&key);
        Ok(Vec::new())
    }

    async fn clear_chunks(&self, user_id: i64, hash: &ContentHash) -> CoordinationResult<()> {
        self.chunk_sets.remove(&chunk_set_key(user_id, hash));
        Ok(())
    }

    async fn health_check(&self) -> CoordinationResult<()> {
        Ok(())
    }
}
