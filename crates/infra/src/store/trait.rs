use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised by a key-value backend.
///
/// Each variant knows whether retrying the same operation could succeed; the
/// registry never retries on its own, callers pick the policy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The backend could not be reached (refused, dropped, timed out).
    #[error("store connection error: {0}")]
    Connection(String),

    /// The backend rejected or failed a command.
    #[error("store command error: {message}")]
    Command { message: String, transient: bool },

    /// The key holds a different structure than the operation expects.
    #[error("wrong type for key {key}: expected {expected}")]
    WrongType { key: String, expected: &'static str },

    /// Internal lock poisoning (in-process backends only).
    #[error("store lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub fn command(message: impl Into<String>) -> Self {
        Self::Command {
            message: message.into(),
            transient: false,
        }
    }

    /// Whether retrying the failed operation could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Connection(_) => true,
            StoreError::Command { transient, .. } => *transient,
            StoreError::WrongType { .. } | StoreError::Poisoned => false,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Synchronous key-value backend with hashes, lists, sets and expiration.
///
/// Every method is one round-trip and individually atomic. No multi-key
/// transactions are offered. Reads of absent keys return empty values rather
/// than errors (missing hash field -> `None`, missing list -> empty vec).
pub trait KeyValueStore: Send + Sync {
    /// Set several fields of a hash, creating it if needed.
    fn hset_multiple(&self, key: &str, fields: &[(&str, &str)]) -> StoreResult<()>;

    fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    /// All fields of a hash (empty when the key is absent).
    fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    /// Append to the tail of a list, creating it if needed. Returns the new length.
    fn rpush(&self, key: &str, value: &str) -> StoreResult<usize>;

    /// Inclusive range with Redis index semantics (`-1` is the last element).
    fn lrange(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>>;

    /// Delete a key of any type. Returns whether it existed.
    fn del(&self, key: &str) -> StoreResult<bool>;

    fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Expire `key` after `ttl`. Returns `false` when the key is absent.
    ///
    /// A zero TTL deletes the key immediately; a TTL too large to turn into a
    /// deadline leaves the key without one.
    fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Expire `key` at an absolute instant. A deadline in the past deletes the
    /// key immediately. Returns `false` when the key is absent.
    fn expire_at(&self, key: &str, at: DateTime<Utc>) -> StoreResult<bool>;

    /// Add a set member. Returns whether it was newly added.
    fn sadd(&self, key: &str, member: &str) -> StoreResult<bool>;

    /// Remove a set member. Returns whether it was present.
    fn srem(&self, key: &str, member: &str) -> StoreResult<bool>;

    fn smembers(&self, key: &str) -> StoreResult<HashSet<String>>;

    /// All live keys starting with `prefix`, in backend order.
    fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>>;
}

impl<S> KeyValueStore for Arc<S>
where
    S: KeyValueStore + ?Sized,
{
    fn hset_multiple(&self, key: &str, fields: &[(&str, &str)]) -> StoreResult<()> {
        (**self).hset_multiple(key, fields)
    }

    fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        (**self).hget(key, field)
    }

    fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        (**self).hgetall(key)
    }

    fn rpush(&self, key: &str, value: &str) -> StoreResult<usize> {
        (**self).rpush(key, value)
    }

    fn lrange(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>> {
        (**self).lrange(key, start, stop)
    }

    fn del(&self, key: &str) -> StoreResult<bool> {
        (**self).del(key)
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        (**self).exists(key)
    }

    fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        (**self).expire(key, ttl)
    }

    fn expire_at(&self, key: &str, at: DateTime<Utc>) -> StoreResult<bool> {
        (**self).expire_at(key, at)
    }

    fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        (**self).sadd(key, member)
    }

    fn srem(&self, key: &str, member: &str) -> StoreResult<bool> {
        (**self).srem(key, member)
    }

    fn smembers(&self, key: &str) -> StoreResult<HashSet<String>> {
        (**self).smembers(key)
    }

    fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        (**self).keys_with_prefix(prefix)
    }
}
