//! Infrastructure layer: key-value persistence of jobs, dispatch queue, config.

pub mod config;
pub mod queue;
pub mod registry;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use config::{ConfigError, RegistryConfig};
pub use queue::{DispatchQueue, QueueError};
pub use registry::{JobRegistry, RegistryError, RegistryResult};
pub use store::{InMemoryKeyValueStore, KeyValueStore, StoreError, StoreResult};
