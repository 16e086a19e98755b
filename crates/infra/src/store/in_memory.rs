use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use super::r#trait::{KeyValueStore, StoreError, StoreResult};

#[derive(Debug, Clone)]
enum Value {
    Hash(HashMap<String, String>),
    List(Vec<String>),
    Set(HashSet<String>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Hash(_) => "hash",
            Value::List(_) => "list",
            Value::Set(_) => "set",
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Outcome of turning a TTL or absolute instant into a monotonic deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deadline {
    /// Zero or negative: the key goes away right now.
    Passed,
    At(Instant),
    /// Too far out for `Instant` to represent.
    Never,
}

impl Deadline {
    fn after(ttl: Duration) -> Self {
        if ttl.is_zero() {
            return Deadline::Passed;
        }
        Instant::now()
            .checked_add(ttl)
            .map_or(Deadline::Never, Deadline::At)
    }

    fn at(at: DateTime<Utc>) -> Self {
        // Negative deltas fail the conversion.
        match (at - Utc::now()).to_std() {
            Ok(delta) => Self::after(delta),
            Err(_) => Deadline::Passed,
        }
    }
}

/// In-memory key-value store.
///
/// Intended for tests/dev. Expired keys are treated as absent on read and
/// dropped on the next write that touches them.
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_live<T>(
        &self,
        key: &str,
        f: impl FnOnce(Option<&Value>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        let now = Instant::now();
        f(entries.get(key).filter(|e| e.is_live(now)).map(|e| &e.value))
    }

    /// Run `f` against the live entry for `key`, creating it with `init` when
    /// absent or expired.
    fn write_or_insert<T>(
        &self,
        key: &str,
        init: impl FnOnce() -> Value,
        f: impl FnOnce(&mut Value) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        let now = Instant::now();
        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
        }
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(init()));
        f(&mut entry.value)
    }

    /// Run `f` against the live entry for `key` if there is one, dropping the
    /// key afterwards when `f` left its collection empty (Redis semantics).
    fn write_existing<T>(
        &self,
        key: &str,
        absent: T,
        f: impl FnOnce(&mut Value) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        let now = Instant::now();
        match entries.get(key).map(|e| e.is_live(now)) {
            None => return Ok(absent),
            Some(false) => {
                entries.remove(key);
                return Ok(absent);
            }
            Some(true) => {}
        }
        let Some(entry) = entries.get_mut(key) else {
            return Ok(absent);
        };

        let out = f(&mut entry.value)?;
        let emptied = match &entry.value {
            Value::Hash(h) => h.is_empty(),
            Value::List(l) => l.is_empty(),
            Value::Set(s) => s.is_empty(),
        };
        if emptied {
            entries.remove(key);
        }
        Ok(out)
    }

    fn set_deadline(&self, key: &str, deadline: Deadline) -> StoreResult<bool> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        let now = Instant::now();
        match entries.get(key).map(|e| e.is_live(now)) {
            None => Ok(false),
            Some(false) => {
                entries.remove(key);
                Ok(false)
            }
            Some(true) => {
                let expires_at = match deadline {
                    Deadline::Passed => {
                        entries.remove(key);
                        return Ok(true);
                    }
                    Deadline::At(at) => Some(at),
                    Deadline::Never => None,
                };
                if let Some(entry) = entries.get_mut(key) {
                    entry.expires_at = expires_at;
                }
                Ok(true)
            }
        }
    }
}

fn wrong_type(key: &str, expected: &'static str, found: &Value) -> StoreError {
    tracing::debug!(key, expected, found = found.type_name(), "wrong type");
    StoreError::WrongType {
        key: key.to_string(),
        expected,
    }
}

/// Resolve Redis-style inclusive `start..=stop` indices against `len`.
fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len || stop < 0 {
        return None;
    }
    Some((start as usize, stop as usize))
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn hset_multiple(&self, key: &str, fields: &[(&str, &str)]) -> StoreResult<()> {
        self.write_or_insert(
            key,
            || Value::Hash(HashMap::new()),
            |value| match value {
                Value::Hash(hash) => {
                    for (field, v) in fields {
                        hash.insert((*field).to_string(), (*v).to_string());
                    }
                    Ok(())
                }
                other => Err(wrong_type(key, "hash", other)),
            },
        )
    }

    fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        self.read_live(key, |value| match value {
            None => Ok(None),
            Some(Value::Hash(hash)) => Ok(hash.get(field).cloned()),
            Some(other) => Err(wrong_type(key, "hash", other)),
        })
    }

    fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        self.read_live(key, |value| match value {
            None => Ok(HashMap::new()),
            Some(Value::Hash(hash)) => Ok(hash.clone()),
            Some(other) => Err(wrong_type(key, "hash", other)),
        })
    }

    fn rpush(&self, key: &str, value: &str) -> StoreResult<usize> {
        self.write_or_insert(
            key,
            || Value::List(Vec::new()),
            |existing| match existing {
                Value::List(list) => {
                    list.push(value.to_string());
                    Ok(list.len())
                }
                other => Err(wrong_type(key, "list", other)),
            },
        )
    }

    fn lrange(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>> {
        self.read_live(key, |value| match value {
            None => Ok(Vec::new()),
            Some(Value::List(list)) => Ok(match resolve_range(list.len(), start, stop) {
                Some((from, to)) => list[from..=to].to_vec(),
                None => Vec::new(),
            }),
            Some(other) => Err(wrong_type(key, "list", other)),
        })
    }

    fn del(&self, key: &str) -> StoreResult<bool> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        let now = Instant::now();
        Ok(entries.remove(key).is_some_and(|e| e.is_live(now)))
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        self.read_live(key, |value| Ok(value.is_some()))
    }

    fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.set_deadline(key, Deadline::after(ttl))
    }

    fn expire_at(&self, key: &str, at: DateTime<Utc>) -> StoreResult<bool> {
        self.set_deadline(key, Deadline::at(at))
    }

    fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.write_or_insert(
            key,
            || Value::Set(HashSet::new()),
            |value| match value {
                Value::Set(set) => Ok(set.insert(member.to_string())),
                other => Err(wrong_type(key, "set", other)),
            },
        )
    }

    fn srem(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.write_existing(key, false, |value| match value {
            Value::Set(set) => Ok(set.remove(member)),
            other => Err(wrong_type(key, "set", other)),
        })
    }

    fn smembers(&self, key: &str) -> StoreResult<HashSet<String>> {
        self.read_live(key, |value| match value {
            None => Ok(HashSet::new()),
            Some(Value::Set(set)) => Ok(set.clone()),
            Some(other) => Err(wrong_type(key, "set", other)),
        })
    }

    fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        let now = Instant::now();
        Ok(entries
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && e.is_live(now))
            .map(|(k, _)| k.clone())
            .collect())
    }
}
