//! Persisted key layout.
//!
//! | Key | Type |
//! |---|---|
//! | `job:<uid>` | hash |
//! | `images:<uid>` | list of image keys |
//! | `<uid>-<imageName>` | hash |
//! | `archives-set` | set |
//! | `uuid-set` | set |

pub const JOB_KEY_PREFIX: &str = "job:";
pub const IMAGES_KEY_PREFIX: &str = "images:";
pub const ARCHIVES_SET: &str = "archives-set";
pub const UUID_SET: &str = "uuid-set";

pub fn job_key(uid: &str) -> String {
    format!("{JOB_KEY_PREFIX}{uid}")
}

pub fn images_key(uid: &str) -> String {
    format!("{IMAGES_KEY_PREFIX}{uid}")
}

pub fn image_key(uid: &str, image_name: &str) -> String {
    format!("{uid}-{image_name}")
}

/// Recover the uid from a `job:<uid>` key.
pub fn uid_from_job_key(key: &str) -> Option<&str> {
    key.strip_prefix(JOB_KEY_PREFIX)
}
