//! Ephemeral coordination store for stash.
//!
//! This crate provides the three coordination primitives the upload
//! coordinator relies on:
//! - a distributed mutex with owner-tagged release and TTL-bound auto-expiry
//! - terminal-state tombstones keyed by `(user, content hash)`
//! - an advisory set of uploaded chunk indices
//!
//! Everything here is rebuildable from the metadata store; the coordination
//! store is a cache plus terminal markers, never the source of truth.

pub mod backends;
pub mod error;
pub mod lock;
pub mod traits;

pub use backends::memory::MemoryCoordination;
pub use backends::redis::RedisCoordination;
pub use error::{CoordinationError, CoordinationResult};
pub use lock::DistributedLock;
pub use traits::{CoordinationStore, Tombstone};

use stash_core::config::CoordinationConfig;
use std::sync::Arc;
use std::time::Duration;

/// TTL for cancelled tombstones. Completed tombstones never expire so fast
/// upload keeps working; cancelled ones must lapse so an abandoned hash
/// becomes uploadable again.
pub const TOMBSTONE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// TTL for the chunk-set accelerator. Advisory only; the blob store's
/// directory listing is authoritative.
pub const CHUNK_SET_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Create a coordination store from configuration.
pub async fn from_config(
    config: &CoordinationConfig,
) -> CoordinationResult<Arc<dyn CoordinationStore>> {
    match config {
        CoordinationConfig::Redis { addr, password, db } => {
            let store = RedisCoordination::connect(addr, password.as_deref(), *db).await?;
            Ok(Arc::new(store))
        }
        CoordinationConfig::Memory => Ok(Arc::new(MemoryCoordination::new())),
    }
}
