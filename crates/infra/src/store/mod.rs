//! Key-value store boundary.
//!
//! The registry only needs hashes, lists, sets, expiration and prefix key
//! enumeration. Backends implement [`KeyValueStore`]; the in-memory one is
//! for tests/dev, the Redis one is the production backend.

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod r#trait;

pub use in_memory::InMemoryKeyValueStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisKeyValueStore;
pub use r#trait::{KeyValueStore, StoreError, StoreResult};
