//! Job registry over a [`KeyValueStore`].

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use imgjobs_core::{fields, DomainError, Image, Job};

use super::keys::{
    image_key, images_key, job_key, uid_from_job_key, ARCHIVES_SET, JOB_KEY_PREFIX, UUID_SET,
};
use crate::store::{KeyValueStore, StoreError};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid job: {0}")]
    Domain(#[from] DomainError),

    #[error("job not found: {0}")]
    JobNotFound(String),
}

impl RegistryError {
    /// Whether retrying the failed call could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            RegistryError::Store(e) => e.is_transient(),
            RegistryError::Domain(_) | RegistryError::JobNotFound(_) => false,
        }
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Maps job ids to their persisted records.
///
/// Holds no in-process lock: concurrent calls interleave their store
/// round-trips. Writers to the same job id race per field (last write wins) and
/// must be serialized against `delete_job` by the caller.
#[derive(Debug, Clone)]
pub struct JobRegistry<S> {
    store: S,
}

impl<S: KeyValueStore> JobRegistry<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Persist a new job: image hashes and the image list first, in order, then
    /// the job hash with both flags unset.
    ///
    /// Not atomic. A failure part-way leaves the records written so far in
    /// place; the job hash is only written once every image is. The image list
    /// is rebuilt from scratch, so retrying after a failure converges on the
    /// same records.
    #[instrument(skip(self, job), fields(job_id = %job.uid, images = job.images.len()), err)]
    pub fn add_job(&self, job: &Job) -> RegistryResult<()> {
        job.validate()?;

        let list_key = images_key(&job.uid);
        self.store.del(&list_key)?;
        for image in &job.images {
            let key = image_key(&job.uid, &image.name);
            self.store.hset_multiple(
                &key,
                &[(fields::NAME, image.name.as_str()), (fields::PATH, image.path.as_str())],
            )?;
            self.store.rpush(&list_key, &key)?;
        }

        self.store.hset_multiple(
            &job_key(&job.uid),
            &[
                (fields::UUID, job.uid.as_str()),
                (fields::FILTER, job.filter.as_str()),
                (fields::IMAGES, list_key.as_str()),
                (fields::COMPLETED, fields::FLAG_UNSET),
                (fields::STARTED_PROCESSING, fields::FLAG_UNSET),
            ],
        )?;

        debug!("job registered");
        Ok(())
    }

    /// Expire the job hash after `ttl`. Image hashes and the list are left alone.
    #[instrument(skip(self), err)]
    pub fn add_expiration_to_job(&self, job_id: &str, ttl: Duration) -> RegistryResult<()> {
        if self.store.expire(&job_key(job_id), ttl)? {
            Ok(())
        } else {
            Err(RegistryError::JobNotFound(job_id.to_string()))
        }
    }

    /// Expire the job hash at an absolute deadline.
    #[instrument(skip(self), err)]
    pub fn add_expiration_to_job_at(&self, job_id: &str, at: DateTime<Utc>) -> RegistryResult<()> {
        if self.store.expire_at(&job_key(job_id), at)? {
            Ok(())
        } else {
            Err(RegistryError::JobNotFound(job_id.to_string()))
        }
    }

    /// Upsert one field of the job hash. `key` is not checked against the known
    /// field names.
    #[instrument(skip(self), err)]
    pub fn update_job_key(&self, job_id: &str, key: &str, value: &str) -> RegistryResult<()> {
        self.store.hset_multiple(&job_key(job_id), &[(key, value)])?;
        Ok(())
    }

    /// Flag an existing job as picked up by a worker.
    pub fn mark_started_processing(&self, job_id: &str) -> RegistryResult<()> {
        self.ensure_job_exists(job_id)?;
        self.update_job_key(job_id, fields::STARTED_PROCESSING, fields::FLAG_SET)
    }

    /// Flag an existing job as completed, optionally expiring its hash.
    pub fn complete_job(&self, job_id: &str, ttl: Option<Duration>) -> RegistryResult<()> {
        self.ensure_job_exists(job_id)?;
        self.update_job_key(job_id, fields::COMPLETED, fields::FLAG_SET)?;
        if let Some(ttl) = ttl {
            self.add_expiration_to_job(job_id, ttl)?;
        }
        Ok(())
    }

    pub fn add_archive(&self, archive_id: &str) -> RegistryResult<()> {
        self.store.sadd(ARCHIVES_SET, archive_id)?;
        Ok(())
    }

    pub fn remove_archive(&self, archive_id: &str) -> RegistryResult<()> {
        self.store.srem(ARCHIVES_SET, archive_id)?;
        Ok(())
    }

    pub fn add_uuid(&self, uuid: &str) -> RegistryResult<()> {
        self.store.sadd(UUID_SET, uuid)?;
        Ok(())
    }

    pub fn remove_uuid(&self, uuid: &str) -> RegistryResult<()> {
        self.store.srem(UUID_SET, uuid)?;
        Ok(())
    }

    pub fn get_all_archives(&self) -> RegistryResult<HashSet<String>> {
        Ok(self.store.smembers(ARCHIVES_SET)?)
    }

    pub fn get_all_uuids(&self) -> RegistryResult<HashSet<String>> {
        Ok(self.store.smembers(UUID_SET)?)
    }

    /// All jobs whose `completed` flag is unset, fully reconstructed.
    ///
    /// Order follows the store's key enumeration and is not stable. Keys that
    /// vanish (or lack a `completed` field) between enumeration and read are
    /// skipped, as are keys under the job prefix that are not hashes.
    #[instrument(skip(self), err)]
    pub fn get_all_jobs(&self) -> RegistryResult<Vec<Job>> {
        let keys = self.store.keys_with_prefix(JOB_KEY_PREFIX)?;

        let mut jobs = Vec::new();
        for key in keys {
            let completed = match self.store.hget(&key, fields::COMPLETED) {
                Ok(completed) => completed,
                Err(StoreError::WrongType { .. }) => {
                    debug!(key = %key, "skipping non-hash key");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            match completed.as_deref() {
                Some(fields::FLAG_UNSET) => {}
                Some(_) => continue,
                None => {
                    debug!(key = %key, "skipping key without completion flag");
                    continue;
                }
            }

            if let Some(job) = self.reconstruct(&key)? {
                jobs.push(job);
            }
        }

        Ok(jobs)
    }

    /// Reconstruct one job by id, completed or not. `None` when the job hash is
    /// absent.
    #[instrument(skip(self), err)]
    pub fn get_job(&self, job_id: &str) -> RegistryResult<Option<Job>> {
        self.reconstruct(&job_key(job_id))
    }

    /// Remove the job hash, every image hash named by the image list, then the
    /// list. Absent keys are skipped, so repeating a delete is harmless.
    #[instrument(skip(self), err)]
    pub fn delete_job(&self, job_id: &str) -> RegistryResult<()> {
        self.store.del(&job_key(job_id))?;

        let list_key = images_key(job_id);
        let images = self.store.lrange(&list_key, 0, -1)?;
        for image in &images {
            self.store.del(image)?;
        }

        self.store.del(&list_key)?;
        debug!(images = images.len(), "job deleted");
        Ok(())
    }

    fn ensure_job_exists(&self, job_id: &str) -> RegistryResult<()> {
        if self.store.exists(&job_key(job_id))? {
            Ok(())
        } else {
            Err(RegistryError::JobNotFound(job_id.to_string()))
        }
    }

    /// Rebuild a job from its hash, list and image hashes.
    ///
    /// Missing image records come back as images with empty fields rather than
    /// an error.
    fn reconstruct(&self, key: &str) -> RegistryResult<Option<Job>> {
        let mut record = self.store.hgetall(key)?;
        if record.is_empty() {
            return Ok(None);
        }

        let uid = match record.remove(fields::UUID) {
            Some(uid) => uid,
            None => uid_from_job_key(key).unwrap_or(key).to_string(),
        };
        let list_key = record
            .remove(fields::IMAGES)
            .unwrap_or_else(|| images_key(&uid));

        let flag = |name: &str| record.get(name).map(String::as_str) == Some(fields::FLAG_SET);
        let mut job = Job {
            uid,
            filter: record.get(fields::FILTER).cloned().unwrap_or_default(),
            images: Vec::new(),
            completed: flag(fields::COMPLETED),
            started_processing: flag(fields::STARTED_PROCESSING),
        };

        for image in self.store.lrange(&list_key, 0, -1)? {
            let name = self.store.hget(&image, fields::NAME)?;
            let path = self.store.hget(&image, fields::PATH)?;
            if name.is_none() && path.is_none() {
                warn!(job_id = %job.uid, image_key = %image, "image record missing");
            }
            job.push_image(Image {
                name: name.unwrap_or_default(),
                path: path.unwrap_or_default(),
            });
        }

        Ok(Some(job))
    }
}
