//! Registry tests against a live Redis server.
//!
//! Run with `--features redis-tests -- --ignored` and `REDIS_URL` pointing at
//! a disposable instance.

#![cfg(feature = "redis-tests")]

use std::time::Duration;

use imgjobs_core::{Image, Job};
use imgjobs_infra::store::RedisKeyValueStore;
use imgjobs_infra::{JobRegistry, KeyValueStore, RegistryConfig, RegistryError};

fn registry() -> JobRegistry<RedisKeyValueStore> {
    let config = RegistryConfig::from_env().unwrap();
    JobRegistry::new(RedisKeyValueStore::from_config(&config).unwrap())
}

/// Unique uid so parallel runs don't collide.
fn uid(tag: &str) -> String {
    format!("test-{tag}-{}", uuid::Uuid::now_v7())
}

#[test]
#[ignore]
fn round_trip_and_delete() {
    let registry = registry();
    let id = uid("roundtrip");
    let job = Job::with_uid(&id, "grayscale")
        .with_image(Image::new("a.png", "/in/a.png"))
        .with_image(Image::new("b.png", "/in/b.png"));

    registry.add_job(&job).unwrap();
    assert_eq!(registry.get_job(&id).unwrap(), Some(job));
    assert!(registry.get_all_jobs().unwrap().iter().any(|j| j.uid == id));

    registry.update_job_key(&id, "completed", "1").unwrap();
    assert!(!registry.get_all_jobs().unwrap().iter().any(|j| j.uid == id));

    registry.delete_job(&id).unwrap();
    let store = registry.store();
    for key in [
        format!("job:{id}"),
        format!("images:{id}"),
        format!("{id}-a.png"),
        format!("{id}-b.png"),
    ] {
        assert!(!store.exists(&key).unwrap(), "{key} should be gone");
    }
}

#[test]
#[ignore]
fn expiration_and_membership() {
    let registry = registry();
    let id = uid("expire");
    registry.add_job(&Job::with_uid(&id, "blur")).unwrap();

    registry
        .add_expiration_to_job(&id, Duration::from_millis(200))
        .unwrap();
    std::thread::sleep(Duration::from_millis(400));
    assert_eq!(registry.get_job(&id).unwrap(), None);
    assert!(matches!(
        registry.add_expiration_to_job(&id, Duration::from_secs(1)),
        Err(RegistryError::JobNotFound(_))
    ));

    let archive = format!("{id}.zip");
    registry.add_archive(&archive).unwrap();
    registry.add_archive(&archive).unwrap();
    assert!(registry.get_all_archives().unwrap().contains(&archive));
    registry.remove_archive(&archive).unwrap();
    registry.remove_archive(&archive).unwrap();
    assert!(!registry.get_all_archives().unwrap().contains(&archive));
}

#[test]
#[ignore]
fn unrepresentable_ttl_keeps_job() {
    let registry = registry();
    let id = uid("ttl");
    registry.add_job(&Job::with_uid(&id, "blur")).unwrap();

    registry
        .add_expiration_to_job(&id, Duration::from_secs(u64::MAX))
        .unwrap();
    std::thread::sleep(Duration::from_millis(20));
    assert!(registry.get_job(&id).unwrap().is_some());

    registry.delete_job(&id).unwrap();
}
