//! Integration tests for the registry + dispatch pipeline.
//!
//! Tests: submit → JobRegistry → DispatchQueue → worker → completion → sweep
//!
//! Verifies:
//! - Jobs survive a "restart" (new registry over the same store)
//! - Completed jobs leave the pending set and can be swept
//! - The worker loop shuts down cleanly when the queue closes

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use imgjobs_core::{Image, Job};

    use crate::config::RegistryConfig;
    use crate::queue::{DispatchQueue, QueueError};
    use crate::registry::JobRegistry;
    use crate::store::{InMemoryKeyValueStore, KeyValueStore};

    type Registry = JobRegistry<Arc<InMemoryKeyValueStore>>;

    fn setup() -> (Arc<InMemoryKeyValueStore>, Arc<Registry>, Arc<DispatchQueue>) {
        imgjobs_observability::init_with_default("debug");
        let store = Arc::new(InMemoryKeyValueStore::new());
        let registry = Arc::new(JobRegistry::new(Arc::clone(&store)));
        (store, registry, Arc::new(DispatchQueue::new()))
    }

    fn submit(registry: &Registry, queue: &DispatchQueue, job: Job) {
        registry.add_job(&job).unwrap();
        queue.enqueue(job).unwrap();
    }

    /// Worker loop: pull, mark started, "process", complete.
    fn spawn_worker(
        registry: Arc<Registry>,
        queue: Arc<DispatchQueue>,
        config: RegistryConfig,
    ) -> thread::JoinHandle<Vec<String>> {
        thread::spawn(move || {
            let mut processed = Vec::new();
            loop {
                match queue.dequeue_timeout(config.dequeue_timeout) {
                    Ok(job) => {
                        registry.mark_started_processing(&job.uid).unwrap();
                        registry
                            .complete_job(&job.uid, config.completed_job_ttl)
                            .unwrap();
                        processed.push(job.uid);
                    }
                    Err(QueueError::Timeout) => continue,
                    Err(_) => break,
                }
            }
            processed
        })
    }

    #[test]
    fn example_scenario_add_list_delete() {
        let (store, registry, _) = setup();
        let job = Job::with_uid("job1", "grayscale")
            .with_image(Image::new("a.png", "/in/a.png"))
            .with_image(Image::new("b.png", "/in/b.png"));
        registry.add_job(&job).unwrap();

        let jobs = registry.get_all_jobs().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].uid, "job1");
        assert_eq!(jobs[0].filter, "grayscale");
        let names: Vec<_> = jobs[0].images.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["a.png", "b.png"]);

        registry.delete_job("job1").unwrap();
        assert!(registry.get_all_jobs().unwrap().is_empty());
        for key in ["job:job1", "images:job1", "job1-a.png", "job1-b.png"] {
            assert!(!store.exists(key).unwrap(), "{key} should be gone");
        }
    }

    #[test]
    fn pending_jobs_survive_restart() {
        let (store, registry, _) = setup();
        registry.add_job(&Job::with_uid("j1", "blur")).unwrap();
        registry
            .add_job(&Job::with_uid("j2", "sepia").with_image(Image::new("x.png", "/in/x.png")))
            .unwrap();
        registry.complete_job("j1", None).unwrap();
        drop(registry);

        // A fresh process sees the same store and re-queues what is pending.
        let restarted = JobRegistry::new(Arc::clone(&store));
        let queue: DispatchQueue = DispatchQueue::new();
        for job in restarted.get_all_jobs().unwrap() {
            queue.enqueue(job).unwrap();
        }

        assert_eq!(queue.len(), 1);
        let job = queue.try_dequeue().unwrap();
        assert_eq!(job.uid, "j2");
        assert_eq!(job.images, vec![Image::new("x.png", "/in/x.png")]);
    }

    #[test]
    fn worker_drains_queue_and_completes_jobs() {
        let (_, registry, queue) = setup();
        let config = RegistryConfig {
            dequeue_timeout: Duration::from_millis(20),
            ..RegistryConfig::default()
        };

        let worker = spawn_worker(Arc::clone(&registry), Arc::clone(&queue), config);

        for i in 0..5 {
            let job = Job::with_uid(format!("job-{i}"), "invert")
                .with_image(Image::new(format!("{i}.png"), format!("/in/{i}.png")));
            submit(&registry, &queue, job);
        }

        // Give the worker time to drain, then stop it.
        while !queue.is_empty() {
            thread::sleep(Duration::from_millis(5));
        }
        queue.close();
        let processed = worker.join().unwrap();

        assert_eq!(
            processed,
            (0..5).map(|i| format!("job-{i}")).collect::<Vec<_>>()
        );
        assert!(registry.get_all_jobs().unwrap().is_empty());
        for i in 0..5 {
            let job = registry.get_job(&format!("job-{i}")).unwrap().unwrap();
            assert!(job.completed);
            assert!(job.started_processing);
        }
    }

    #[test]
    fn sweep_deletes_completed_jobs_and_archives() {
        let (store, registry, _) = setup();
        registry.add_job(&Job::with_uid("keep", "blur")).unwrap();
        registry
            .add_job(&Job::with_uid("done", "blur").with_image(Image::new("a.png", "/out/a.png")))
            .unwrap();
        registry.complete_job("done", None).unwrap();
        registry.add_archive("done.zip").unwrap();
        registry.add_uuid("done").unwrap();

        // Sweep: anything not pending goes, together with its index entries.
        let pending: Vec<String> = registry
            .get_all_jobs()
            .unwrap()
            .into_iter()
            .map(|j| j.uid)
            .collect();
        for uuid in registry.get_all_uuids().unwrap() {
            if !pending.contains(&uuid) {
                registry.delete_job(&uuid).unwrap();
                registry.remove_archive(&format!("{uuid}.zip")).unwrap();
                registry.remove_uuid(&uuid).unwrap();
            }
        }

        assert!(registry.get_all_archives().unwrap().is_empty());
        assert!(registry.get_all_uuids().unwrap().is_empty());
        assert!(!store.exists("job:done").unwrap());
        assert!(!store.exists("done-a.png").unwrap());
        assert!(store.exists("job:keep").unwrap());
    }

    #[test]
    fn concurrent_producers_do_not_conflict() {
        let (_, registry, queue) = setup();

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let registry = Arc::clone(&registry);
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..10 {
                        let job = Job::with_uid(format!("p{p}-{i}"), "resize")
                            .with_image(Image::new("in.png", format!("/in/p{p}/{i}.png")));
                        submit(&registry, &queue, job);
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        assert_eq!(queue.len(), 40);
        let jobs = registry.get_all_jobs().unwrap();
        assert_eq!(jobs.len(), 40);
        for job in jobs {
            assert_eq!(job.images.len(), 1);
            assert_eq!(job.images[0].name, "in.png");
        }
    }
}
