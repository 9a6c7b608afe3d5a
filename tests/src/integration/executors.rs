//! # Executor Flows
//!
//! Tier routing as a registered service sees it, per-key serial queues on
//! the shared tier, and result handles.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};
    use std::thread;
    use std::time::Duration;

    use kernel_runtime::{
        Executor, Inject, InjectionPoint, Service, ServiceExecutor, TaskError,
    };
    use parking_lot::Mutex;

    use crate::integration::{eventually, isolated_kernel, isolated_kernel_with};

    #[derive(Default)]
    struct Worker {
        exec: Inject<ServiceExecutor>,
    }

    impl Service for Worker {
        fn injection_points(&self) -> Vec<InjectionPoint<'_>> {
            vec![InjectionPoint::by_type("exec", &self.exec)]
        }
    }

    fn thread_name() -> String {
        thread::current().name().unwrap_or_default().to_string()
    }

    // =========================================================================
    // ROUTING
    // =========================================================================

    #[test]
    fn test_idle_shared_tier_takes_service_work() {
        let kernel = isolated_kernel();
        let worker = Arc::new(Worker::default());
        kernel.add("worker", Arc::clone(&worker));
        let exec = worker.exec.get().unwrap();

        let name = exec.submit(thread_name).join().unwrap();
        assert!(name.starts_with("sys-"), "ran on {name}");
        assert!(exec.local().is_none());
        kernel.shutdown();
    }

    #[test]
    fn test_saturated_shared_tier_overflows_to_local() {
        let kernel = isolated_kernel_with(&[
            ("sys.exec.corePoolSize", "1"),
            ("sys.exec.maximumPoolSize", "1"),
            ("worker.exec.corePoolSize", "1"),
            ("worker.exec.maximumPoolSize", "2"),
        ]);
        let worker = Arc::new(Worker::default());
        kernel.add("worker", Arc::clone(&worker));
        let exec = worker.exec.get().unwrap();

        let (release_tx, release_rx) = mpsc::channel::<()>();
        kernel.shared_pool().execute(Box::new(move || {
            let _ = release_rx.recv_timeout(Duration::from_secs(5));
        }));
        assert!(eventually(Duration::from_secs(2), || {
            kernel.shared_pool().active_count() == 1
        }));

        let name = exec.submit(thread_name).join().unwrap();
        assert!(name.starts_with("worker-"), "ran on {name}");
        let local = Arc::clone(exec.local().unwrap());
        assert_eq!(local.config().core_size, 1);
        assert_eq!(local.config().max_size, 2);

        drop(release_tx);
        kernel.shutdown();
        assert!(local.is_shutdown());
        assert!(kernel.shared_pool().is_shutdown());
    }

    #[test]
    fn test_view_shutdown_leaves_tiers_running() {
        let kernel = isolated_kernel();
        let worker = Arc::new(Worker::default());
        kernel.add("worker", Arc::clone(&worker));
        let exec = worker.exec.get().unwrap();

        exec.shutdown();
        assert!(!kernel.shared_pool().is_shutdown());
        assert_eq!(exec.submit(|| 2 + 2).join(), Ok(4));
        kernel.shutdown();
    }

    #[test]
    fn test_panicking_task_reported_to_submitter() {
        let kernel = isolated_kernel();
        let exec = kernel.executor_for(None);
        let outcome = exec.submit(|| -> u32 { panic!("boom") }).join();
        assert!(matches!(outcome, Err(TaskError::Panicked(msg)) if msg.contains("boom")));

        // the worker survived
        assert_eq!(exec.submit(|| 7).join(), Ok(7));
        kernel.shutdown();
    }

    #[test]
    fn test_work_after_shutdown_runs_on_caller() {
        let kernel = isolated_kernel();
        kernel.shutdown();
        let exec = kernel.executor_for(None);
        let caller = thread_name();
        assert_eq!(exec.submit(thread_name).join(), Ok(caller));
    }

    #[tokio::test]
    async fn test_task_handle_awaits() {
        let kernel = isolated_kernel();
        let handle = kernel.executor_for(None).submit(|| "done");
        assert_eq!(handle.await, Ok("done"));
        kernel.shutdown();
    }

    // =========================================================================
    // SERIAL QUEUES
    // =========================================================================

    #[test]
    fn test_keys_are_serial_and_independent() {
        let kernel = isolated_kernel();
        let log: Arc<Mutex<Vec<(String, usize)>>> = Arc::new(Mutex::new(Vec::new()));
        let in_flight: Arc<Vec<AtomicUsize>> =
            Arc::new((0..3).map(|_| AtomicUsize::new(0)).collect());
        let overlap = Arc::new(AtomicUsize::new(0));

        for i in 0..30 {
            for (k, key) in ["a", "b", "c"].into_iter().enumerate() {
                let log = Arc::clone(&log);
                let in_flight = Arc::clone(&in_flight);
                let overlap = Arc::clone(&overlap);
                kernel.queue_with(
                    key,
                    Box::new(move || {
                        if in_flight[k].fetch_add(1, Ordering::SeqCst) > 0 {
                            overlap.fetch_add(1, Ordering::SeqCst);
                        }
                        thread::sleep(Duration::from_micros(100));
                        log.lock().push((key.to_string(), i));
                        in_flight[k].fetch_sub(1, Ordering::SeqCst);
                    }),
                );
            }
        }

        assert!(eventually(Duration::from_secs(10), || log.lock().len() == 90));
        assert_eq!(overlap.load(Ordering::SeqCst), 0);
        for key in ["a", "b", "c"] {
            let order: Vec<usize> = log
                .lock()
                .iter()
                .filter(|(k, _)| k == key)
                .map(|(_, i)| *i)
                .collect();
            assert_eq!(order, (0..30).collect::<Vec<_>>(), "queue {key}");
        }
        kernel.shutdown();
    }

    #[test]
    fn test_queue_handle_is_shared() {
        let kernel = isolated_kernel();
        let first = kernel.queue("mail");
        let second = kernel.queue("mail");
        let (tx, rx) = mpsc::channel();
        let gate = Arc::new(Mutex::new(()));
        let held = gate.lock();

        let g = Arc::clone(&gate);
        first.offer(Box::new(move || {
            let _wait = g.lock();
        }));
        second.offer(Box::new(move || tx.send(()).unwrap()));
        assert!(eventually(Duration::from_secs(2), || second.pending() == 1));
        assert!(first.is_running());

        drop(held);
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
        kernel.shutdown();
    }
}
