//! Redis-backed key-value store (optional, feature `redis`).
//!
//! Uses the blocking `redis::Commands` API: every trait call is one
//! synchronous round-trip on a connection taken from the shared client.
//! Key enumeration uses `SCAN ... MATCH` instead of `KEYS` so large keyspaces
//! don't stall the server.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use redis::Commands;
use tracing::instrument;

use super::r#trait::{KeyValueStore, StoreError, StoreResult};
use crate::config::RegistryConfig;

/// Number of keys requested per `SCAN` page.
const SCAN_PAGE_SIZE: usize = 200;

#[derive(Debug, Clone)]
pub struct RedisKeyValueStore {
    client: Arc<redis::Client>,
}

impl RedisKeyValueStore {
    /// Create a store for the given Redis URL (e.g. "redis://localhost:6379").
    ///
    /// Only parses the URL; the first command opens the connection.
    pub fn new(redis_url: impl AsRef<str>) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| StoreError::command(format!("invalid redis url: {e}")))?;
        Ok(Self {
            client: Arc::new(client),
        })
    }

    pub fn from_config(config: &RegistryConfig) -> StoreResult<Self> {
        Self::new(&config.redis_url)
    }

    fn connection(&self) -> StoreResult<redis::Connection> {
        self.client
            .get_connection()
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}

fn map_redis_error(op: &str, key: &str, err: redis::RedisError) -> StoreError {
    if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
        return StoreError::Connection(format!("{op} {key}: {err}"));
    }
    if err.code() == Some("WRONGTYPE") {
        return StoreError::WrongType {
            key: key.to_string(),
            expected: expected_type(op),
        };
    }
    StoreError::Command {
        message: format!("{op} {key}: {err}"),
        transient: err.is_timeout() || err.code() == Some("BUSY") || err.code() == Some("LOADING"),
    }
}

fn expected_type(op: &str) -> &'static str {
    match op {
        "HSET" | "HGET" | "HGETALL" => "hash",
        "RPUSH" | "LRANGE" => "list",
        "SADD" | "SREM" | "SMEMBERS" => "set",
        _ => "any",
    }
}

/// Escape glob metacharacters so `prefix` matches literally in `SCAN MATCH`.
fn glob_escape(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('*');
    out
}

impl KeyValueStore for RedisKeyValueStore {
    fn hset_multiple(&self, key: &str, fields: &[(&str, &str)]) -> StoreResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection()?;
        conn.hset_multiple::<_, _, _, ()>(key, fields)
            .map_err(|e| map_redis_error("HSET", key, e))
    }

    fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let mut conn = self.connection()?;
        conn.hget(key, field)
            .map_err(|e| map_redis_error("HGET", key, e))
    }

    fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let mut conn = self.connection()?;
        conn.hgetall(key)
            .map_err(|e| map_redis_error("HGETALL", key, e))
    }

    fn rpush(&self, key: &str, value: &str) -> StoreResult<usize> {
        let mut conn = self.connection()?;
        conn.rpush(key, value)
            .map_err(|e| map_redis_error("RPUSH", key, e))
    }

    fn lrange(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>> {
        let mut conn = self.connection()?;
        conn.lrange(key, start, stop)
            .map_err(|e| map_redis_error("LRANGE", key, e))
    }

    fn del(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.connection()?;
        let removed: u64 = conn.del(key).map_err(|e| map_redis_error("DEL", key, e))?;
        Ok(removed > 0)
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.connection()?;
        conn.exists(key)
            .map_err(|e| map_redis_error("EXISTS", key, e))
    }

    fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.connection()?;
        let Some(millis) = pexpire_millis(ttl, Utc::now().timestamp_millis()) else {
            // Past the server clock's range: keep the key with no deadline.
            let exists: bool = conn
                .exists(key)
                .map_err(|e| map_redis_error("EXISTS", key, e))?;
            if exists {
                let _: i64 = redis::cmd("PERSIST")
                    .arg(key)
                    .query(&mut conn)
                    .map_err(|e| map_redis_error("PERSIST", key, e))?;
            }
            return Ok(exists);
        };
        let applied: i64 = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(millis)
            .query(&mut conn)
            .map_err(|e| map_redis_error("PEXPIRE", key, e))?;
        Ok(applied == 1)
    }

    fn expire_at(&self, key: &str, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut conn = self.connection()?;
        let applied: i64 = redis::cmd("PEXPIREAT")
            .arg(key)
            .arg(at.timestamp_millis())
            .query(&mut conn)
            .map_err(|e| map_redis_error("PEXPIREAT", key, e))?;
        Ok(applied == 1)
    }

    fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut conn = self.connection()?;
        let added: u64 = conn
            .sadd(key, member)
            .map_err(|e| map_redis_error("SADD", key, e))?;
        Ok(added > 0)
    }

    fn srem(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut conn = self.connection()?;
        let removed: u64 = conn
            .srem(key, member)
            .map_err(|e| map_redis_error("SREM", key, e))?;
        Ok(removed > 0)
    }

    fn smembers(&self, key: &str) -> StoreResult<HashSet<String>> {
        let mut conn = self.connection()?;
        conn.smembers(key)
            .map_err(|e| map_redis_error("SMEMBERS", key, e))
    }

    #[instrument(skip(self), err)]
    fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.connection()?;
        let pattern = glob_escape(prefix);

        // SCAN may return a key more than once across pages.
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, page): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_PAGE_SIZE)
                .query(&mut conn)
                .map_err(|e| map_redis_error("SCAN", prefix, e))?;

            for key in page {
                if seen.insert(key.clone()) {
                    keys.push(key);
                }
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(keys)
    }
}

/// `PEXPIRE` argument for `ttl`.
///
/// A non-zero TTL below one millisecond rounds up to 1 ms, since `PEXPIRE 0`
/// deletes the key. `None` when `now + ttl` overflows the server's
/// millisecond clock.
fn pexpire_millis(ttl: Duration, now_millis: i64) -> Option<i64> {
    if ttl.is_zero() {
        return Some(0);
    }
    let millis = i64::try_from(ttl.as_millis()).ok()?.max(1);
    now_millis.checked_add(millis).map(|_| millis)
}
