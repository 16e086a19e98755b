//! Durable job registry.
//!
//! Each job is encoded as one hash (`job:<uid>`), one ordered list of image
//! keys (`images:<uid>`) and one hash per image (`<uid>-<name>`). Two flat sets
//! (`archives-set`, `uuid-set`) are maintained for external cleanup logic.
//!
//! Multi-key writes are not atomic. Creation writes children before the parent
//! and deletion removes the parent first, so a job hash is never visible
//! without its images; a crash can leave orphaned image records behind.

pub mod job_registry;
pub mod keys;

pub use job_registry::{JobRegistry, RegistryError, RegistryResult};
