//! `imgjobs-core`: domain model for image-processing jobs.
//!
//! This crate contains **pure domain** types (no infrastructure concerns).
//! Persistence lives in `imgjobs-infra`.

pub mod error;
pub mod job;

pub use error::{DomainError, DomainResult};
pub use job::{fields, Image, Job};
