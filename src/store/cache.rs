//! Redis adapter.
//!
//! Every durable value lives here: JSON blobs for session records, hashes for
//! user profiles, sets for session membership. All components go through this
//! adapter, so serialization and TTL policy stay centralized.
//!
//! Failure policy: transport and protocol errors are caught at this boundary,
//! logged, and converted into neutral results (`None` / `false` / `0` /
//! empty). Callers treat a store failure as "not found" or "no-op". A store
//! outage therefore degrades silently rather than failing loudly.

use std::collections::HashMap;
use std::time::Duration;

use redis::{
    aio::{ConnectionManager, ConnectionManagerConfig},
    AsyncCommands, Client, RedisResult,
};
use serde::{de::DeserializeOwned, Serialize};

#[derive(Clone)]
pub struct CacheStore {
    conn: ConnectionManager,
}

impl CacheStore {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(2)
            .set_connection_timeout(Duration::from_secs(2));

        let client = Client::open(redis_url)?;
        let conn = client.get_connection_manager_with_config(config).await?;
        Ok(Self { conn })
    }

    fn conn(&self) -> ConnectionManager {
        // ConnectionManager multiplexes over one connection; cloning is cheap.
        self.conn.clone()
    }

    pub async fn ping(&self) -> bool {
        let mut conn = self.conn();
        let res: RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
        res.is_ok()
    }

    // ---------- Core JSON get/set ----------

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = self.conn();
        let raw: RedisResult<Option<String>> = conn.get(key).await;
        match raw {
            Ok(Some(payload)) => match serde_json::from_str(&payload) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(key = key, error = %e, "Corrupt JSON value in store");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key = key, error = %e, "Store get failed");
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Option<u64>) -> bool {
        let payload = match serde_json::to_string(value) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(key = key, error = %e, "Failed to serialize value");
                return false;
            }
        };
        let mut conn = self.conn();
        let res: RedisResult<()> = match ttl {
            Some(secs) => conn.set_ex(key, payload, secs).await,
            None => conn.set(key, payload).await,
        };
        if let Err(e) = &res {
            tracing::warn!(key = key, error = %e, "Store set failed");
        }
        res.is_ok()
    }

    // ---------- Hash fields ----------

    pub async fn hset(&self, key: &str, fields: &[(String, String)]) -> bool {
        if fields.is_empty() {
            return true;
        }
        let mut conn = self.conn();
        let res: RedisResult<()> = conn.hset_multiple(key, fields).await;
        if let Err(e) = &res {
            tracing::warn!(key = key, error = %e, "Store hset failed");
        }
        res.is_ok()
    }

    /// Set hash fields only where the field is not already present, as one
    /// transaction. An existing profile is never overwritten, even when a
    /// transient read failure made it look absent.
    pub async fn hset_if_absent(&self, key: &str, fields: &[(String, String)]) -> bool {
        if fields.is_empty() {
            return true;
        }
        self.exec_atomic(&hsetnx_pipe(key, fields)).await
    }

    pub async fn hgetall(&self, key: &str) -> HashMap<String, String> {
        let mut conn = self.conn();
        let res: RedisResult<HashMap<String, String>> = conn.hgetall(key).await;
        match res {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(key = key, error = %e, "Store hgetall failed");
                HashMap::new()
            }
        }
    }

    /// Atomic field increment. Returns the post-increment value, or 0 on
    /// store failure.
    pub async fn hincrby(&self, key: &str, field: &str, delta: i64) -> i64 {
        let mut conn = self.conn();
        let res: RedisResult<i64> = conn.hincr(key, field, delta).await;
        match res {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key = key, field = field, error = %e, "Store hincrby failed");
                0
            }
        }
    }

    // ---------- Sets ----------

    pub async fn srem(&self, key: &str, member: &str) -> u64 {
        let mut conn = self.conn();
        let res: RedisResult<u64> = conn.srem(key, member).await;
        match res {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(key = key, error = %e, "Store srem failed");
                0
            }
        }
    }

    pub async fn smembers(&self, key: &str) -> Vec<String> {
        let mut conn = self.conn();
        let res: RedisResult<Vec<String>> = conn.smembers(key).await;
        match res {
            Ok(members) => members,
            Err(e) => {
                tracing::warn!(key = key, error = %e, "Store smembers failed");
                Vec::new()
            }
        }
    }

    pub async fn scard(&self, key: &str) -> u64 {
        let mut conn = self.conn();
        let res: RedisResult<u64> = conn.scard(key).await;
        match res {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(key = key, error = %e, "Store scard failed");
                0
            }
        }
    }

    pub async fn sismember(&self, key: &str, member: &str) -> bool {
        let mut conn = self.conn();
        let res: RedisResult<bool> = conn.sismember(key, member).await;
        match res {
            Ok(is_member) => is_member,
            Err(e) => {
                tracing::warn!(key = key, error = %e, "Store sismember failed");
                false
            }
        }
    }

    /// Run an atomic MULTI/EXEC batch. Either every command applies or the
    /// visible state is unaffected.
    pub async fn exec_atomic(&self, pipe: &redis::Pipeline) -> bool {
        let mut conn = self.conn();
        let res: RedisResult<()> = pipe.query_async(&mut conn).await;
        if let Err(e) = &res {
            tracing::warn!(error = %e, "Atomic pipeline failed");
        }
        res.is_ok()
    }
}

fn hsetnx_pipe(key: &str, fields: &[(String, String)]) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic();
    for (field, value) in fields {
        pipe.hset_nx(key, field, value).ignore();
    }
    pipe
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packed_contains(pipe: &redis::Pipeline, needle: &[u8]) -> bool {
        let packed = pipe.get_packed_pipeline();
        packed.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn absent_only_writes_use_hsetnx_in_a_transaction() {
        let pipe = hsetnx_pipe(
            "user:u1:profile",
            &[("xp".into(), "0".into()), ("coins".into(), "0".into())],
        );
        assert!(packed_contains(&pipe, b"MULTI"));
        assert!(packed_contains(&pipe, b"EXEC"));
        assert!(packed_contains(&pipe, b"HSETNX"));
        assert!(packed_contains(&pipe, b"user:u1:profile"));
    }
}
