//! Redis coordination backend.
//!
//! Mutex release and extension run as Lua scripts so the owner comparison and
//! the delete/pexpire happen in one atomic step on the server. Expressing
//! either as read-then-write would let a TTL expiry between the two calls
//! delete a lock that a different owner has since acquired.

use crate::error::{CoordinationError, CoordinationResult};
use crate::traits::{chunk_set_key, lock_key, tombstone_key, CoordinationStore, Tombstone};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use stash_core::{ContentHash, TombstoneStatus};
use std::collections::HashMap;
use std::time::Duration;

const UNLOCK_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

const EXTEND_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("pexpire", KEYS[1], ARGV[2])
else
    return 0
end
"#;

/// Redis-backed coordination store.
pub struct RedisCoordination {
    conn: ConnectionManager,
    unlock: Script,
    extend: Script,
}

impl RedisCoordination {
    /// Connect to Redis and verify the connection with a ping.
    pub async fn connect(
        addr: &str,
        password: Option<&str>,
        db: i64,
    ) -> CoordinationResult<Self> {
        let url = match password {
            Some(password) if !password.is_empty() => {
                format!("redis://:{password}@{addr}/{db}")
            }
            _ => format!("redis://{addr}/{db}"),
        };
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        let store = Self {
            conn,
            unlock: Script::new(UNLOCK_SCRIPT),
            extend: Script::new(EXTEND_SCRIPT),
        };
        store.health_check().await?;
        Ok(store)
    }

    fn tombstone_fields(tombstone: &Tombstone) -> [(&'static str, String); 5] {
        [
            ("user_id", tombstone.user_id.to_string()),
            ("file_hash", tombstone.file_hash.to_string()),
            ("content_id", tombstone.content_id.to_string()),
            ("status", tombstone.status.as_str().to_string()),
            ("created_at", tombstone.created_at.to_string()),
        ]
    }

    fn parse_tombstone(
        key: &str,
        fields: HashMap<String, String>,
    ) -> CoordinationResult<Tombstone> {
        let get = |name: &str| {
            fields.get(name).cloned().ok_or_else(|| {
                CoordinationError::Malformed {
                    key: key.to_string(),
                    reason: format!("missing field {name}"),
                }
            })
        };
        let malformed = |reason: String| CoordinationError::Malformed {
            key: key.to_string(),
            reason,
        };

        Ok(Tombstone {
            user_id: get("user_id")?
                .parse()
                .map_err(|e| malformed(format!("user_id: {e}")))?,
            file_hash: ContentHash::parse(&get("file_hash")?)
                .map_err(|e| malformed(format!("file_hash: {e}")))?,
            content_id: get("content_id")?
                .parse()
                .map_err(|e| malformed(format!("content_id: {e}")))?,
            status: TombstoneStatus::parse(&get("status")?)
                .map_err(|e| malformed(format!("status: {e}")))?,
            created_at: get("created_at")?
                .parse()
                .map_err(|e| malformed(format!("created_at: {e}")))?,
        })
    }
}

#[async_trait]
impl CoordinationStore for RedisCoordination {
    async fn try_lock(&self, name: &str, owner: &str, ttl: Duration) -> CoordinationResult<bool> {
        let mut conn = self.conn.clone();
        let result: Option<String> = redis::cmd("SET")
            .arg(lock_key(name))
            .arg(owner)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        Ok(result.is_some())
    }

    async fn unlock(&self, name: &str, owner: &str) -> CoordinationResult<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .unlock
            .key(lock_key(name))
            .arg(owner)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted > 0)
    }

    async fn extend_lock(
        &self,
        name: &str,
        owner: &str,
        ttl: Duration,
    ) -> CoordinationResult<bool> {
        let mut conn = self.conn.clone();
        let extended: i64 = self
            .extend
            .key(lock_key(name))
            .arg(owner)
            .arg(ttl.as_millis() as u64)
            .invoke_async(&mut conn)
            .await?;
        Ok(extended > 0)
    }

    async fn put_tombstone(
        &self,
        tombstone: &Tombstone,
        ttl: Option<Duration>,
    ) -> CoordinationResult<()> {
        let mut conn = self.conn.clone();
        let key = tombstone_key(tombstone.user_id, &tombstone.file_hash);
        let fields = Self::tombstone_fields(tombstone);

        let mut pipe = redis::pipe();
        pipe.hset_multiple(&key, &fields).ignore();
        match ttl {
            Some(ttl) => {
                pipe.cmd("PEXPIRE")
                    .arg(&key)
                    .arg(ttl.as_millis() as u64)
                    .ignore();
            }
            None => {
                // A completed entry may overwrite a cancelled one that still
                // carries a TTL; drop it so the entry never expires.
                pipe.cmd("PERSIST").arg(&key).ignore();
            }
        }
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn get_tombstone(
        &self,
        user_id: i64,
        hash: &ContentHash,
    ) -> CoordinationResult<Option<Tombstone>> {
        let mut conn = self.conn.clone();
        let key = tombstone_key(user_id, hash);
        let fields: HashMap<String, String> = conn.hgetall(&key).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self::parse_tombstone(&key, fields)?))
    }

    async fn delete_tombstone(&self, user_id: i64, hash: &ContentHash) -> CoordinationResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(tombstone_key(user_id, hash)).await?;
        Ok(())
    }

    async fn publish_tombstones(
        &self,
        tombstones: &[(Tombstone, Option<Duration>)],
    ) -> CoordinationResult<()> {
        if tombstones.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for (tombstone, ttl) in tombstones {
            let key = tombstone_key(tombstone.user_id, &tombstone.file_hash);
            pipe.hset_multiple(&key, &Self::tombstone_fields(tombstone))
                .ignore();
            if let Some(ttl) = ttl {
                pipe.cmd("PEXPIRE")
                    .arg(&key)
                    .arg(ttl.as_millis() as u64)
                    .ignore();
            }
        }
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn record_chunk(
        &self,
        user_id: i64,
        hash: &ContentHash,
        index: u32,
    ) -> CoordinationResult<()> {
        let mut conn = self.conn.clone();
        let key = chunk_set_key(user_id, hash);
        let mut pipe = redis::pipe();
        pipe.sadd(&key, index).ignore();
        pipe.cmd("PEXPIRE")
            .arg(&key)
            .arg(crate::CHUNK_SET_TTL.as_millis() as u64)
            .ignore();
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn chunk_indices(
        &self,
        user_id: i64,
        hash: &ContentHash,
    ) -> CoordinationResult<Vec<u32>> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.smembers(chunk_set_key(user_id, hash)).await?;
        let mut indices: Vec<u32> = members
            .into_iter()
            .filter_map(|m| m.parse().ok())
            .collect();
        indices.sort_unstable();
        Ok(indices)
    }

    async fn clear_chunks(&self, user_id: i64, hash: &ContentHash) -> CoordinationResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(chunk_set_key(user_id, hash)).await?;
        Ok(())
    }

    async fn health_check(&self) -> CoordinationResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
