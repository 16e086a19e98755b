//! Image-processing job and its images.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};

/// Field names and flag values of the persisted job hash.
pub mod fields {
    pub const UUID: &str = "uuid";
    pub const FILTER: &str = "filter";
    pub const IMAGES: &str = "images";
    pub const COMPLETED: &str = "completed";
    pub const STARTED_PROCESSING: &str = "started-processing";

    pub const NAME: &str = "name";
    pub const PATH: &str = "path";

    pub const FLAG_UNSET: &str = "0";
    pub const FLAG_SET: &str = "1";
}

/// One input/output file reference, owned by exactly one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub name: String,
    pub path: String,
}

impl Image {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// A unit of image-processing work.
///
/// `images` is ordered: the order given at creation is the order read back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub uid: String,
    pub filter: String,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub started_processing: bool,
}

impl Job {
    /// Create a pending job with a freshly generated uid.
    ///
    /// Uses UUIDv7 (time-ordered). Prefer `with_uid` in tests for determinism.
    pub fn new(filter: impl Into<String>) -> Self {
        Self::with_uid(Uuid::now_v7().to_string(), filter)
    }

    pub fn with_uid(uid: impl Into<String>, filter: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            filter: filter.into(),
            images: Vec::new(),
            completed: false,
            started_processing: false,
        }
    }

    pub fn with_image(mut self, image: Image) -> Self {
        self.images.push(image);
        self
    }

    pub fn push_image(&mut self, image: Image) {
        self.images.push(image);
    }

    /// Check the job can be persisted without key collisions.
    ///
    /// Image records are keyed by `<uid>-<name>`, so names must be non-empty and
    /// unique within a job.
    pub fn validate(&self) -> DomainResult<()> {
        if self.uid.trim().is_empty() {
            return Err(DomainError::invalid_id("job uid must not be empty"));
        }

        let mut seen = HashSet::with_capacity(self.images.len());
        for (idx, image) in self.images.iter().enumerate() {
            if image.name.is_empty() {
                return Err(DomainError::validation(format!(
                    "image at index {idx} has an empty name"
                )));
            }
            if !seen.insert(image.name.as_str()) {
                return Err(DomainError::validation(format!(
                    "duplicate image name '{}' in job {}",
                    image.name, self.uid
                )));
            }
        }

        Ok(())
    }
}
