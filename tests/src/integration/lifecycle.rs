//! # Lifecycle Flows
//!
//! Phase order as services observe it, completion after async listeners,
//! the heartbeat through a scheduler service and through the built-in
//! timer, and idempotent shutdown.

#[cfg(test)]
mod tests {
    use std::any::TypeId;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use kernel_bus::{DispatchError, EventContext, EventDispatch, Handler, Payload, SourceId};
    use kernel_runtime::kernel::{Deferred, SCHED_AFTER};
    use kernel_runtime::{
        BeanRequest, ConfigStore, EventScope, Inject, InjectionPoint, Kernel, KernelError, Phase,
        Service, ServiceExecutor, ShutdownTrigger,
    };
    use parking_lot::Mutex;

    use crate::integration::{eventually, isolated_kernel, isolated_kernel_with};

    // =========================================================================
    // FIXTURES
    // =========================================================================

    /// Records every phase it sees; its `starting` work runs asynchronously.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<&'static str>>,
        warmed_up: AtomicBool,
        started_after_warmup: AtomicBool,
    }

    impl Service for Recorder {
        fn handlers(self: Arc<Self>) -> Vec<Handler> {
            let mut handlers = Vec::new();
            for phase in [Phase::Inited, Phase::Starting, Phase::Started, Phase::Stopping] {
                let me = Arc::clone(&self);
                handlers.push(
                    Handler::on(phase.event()).run(move |_| me.seen.lock().push(phase.event())),
                );
            }
            let warm = Arc::clone(&self);
            handlers.push(
                Handler::on("sys.starting")
                    .order(10.0)
                    .asynchronous()
                    .run(move |_| {
                        thread::sleep(Duration::from_millis(50));
                        warm.warmed_up.store(true, Ordering::SeqCst);
                    }),
            );
            let check = Arc::clone(&self);
            handlers.push(Handler::on("sys.started").run(move |_| {
                check
                    .started_after_warmup
                    .store(check.warmed_up.load(Ordering::SeqCst), Ordering::SeqCst);
            }));
            handlers
        }
    }

    /// Holds a scope and tries to fire phases it does not own.
    #[derive(Default)]
    struct Rogue {
        events: Inject<EventScope>,
    }

    impl Service for Rogue {
        fn injection_points(&self) -> Vec<InjectionPoint<'_>> {
            vec![InjectionPoint::by_type("events", &self.events)]
        }
    }

    /// Bean nobody registers; only a resolver can supply it.
    struct Clock;

    /// Wants a [`Clock`] that shows up only once startup completes.
    #[derive(Default)]
    struct Timekeeper {
        clock: Inject<Arc<Clock>>,
    }

    impl Service for Timekeeper {
        fn injection_points(&self) -> Vec<InjectionPoint<'_>> {
            vec![InjectionPoint::by_type("clock", &self.clock)]
        }
    }

    /// Collects `sched.after` requests and runs them shortly after.
    #[derive(Default)]
    struct Scheduler {
        delays: Mutex<Vec<Duration>>,
        budget: AtomicUsize,
    }

    impl Service for Scheduler {
        fn handlers(self: Arc<Self>) -> Vec<Handler> {
            vec![Handler::on(SCHED_AFTER).run(move |ctx| {
                let (Some(delay), Some(task)) = (
                    ctx.arg_as::<Duration>(0).copied(),
                    ctx.arg_as::<Arc<Deferred>>(1).cloned(),
                ) else {
                    return;
                };
                self.delays.lock().push(delay);
                if self.budget.fetch_sub(1, Ordering::SeqCst) > 1 {
                    thread::spawn(move || {
                        thread::sleep(Duration::from_millis(5));
                        task.run();
                    });
                }
            })]
        }
    }

    // =========================================================================
    // PHASES
    // =========================================================================

    #[test]
    fn test_services_see_phases_in_order() {
        let kernel = isolated_kernel();
        let recorder = Arc::new(Recorder::default());
        kernel.add("recorder", Arc::clone(&recorder));

        kernel.start().unwrap();
        kernel
            .wait_for(Phase::Started, Duration::from_secs(5))
            .unwrap();
        assert!(eventually(Duration::from_secs(2), || recorder.seen.lock().len() == 3));
        kernel.shutdown();

        assert_eq!(
            *recorder.seen.lock(),
            vec!["sys.inited", "sys.starting", "sys.started", "sys.stopping"]
        );
    }

    #[test]
    fn test_started_waits_for_async_starting_listeners() {
        let kernel = isolated_kernel();
        let recorder = Arc::new(Recorder::default());
        kernel.add("recorder", Arc::clone(&recorder));

        kernel.start().unwrap();
        kernel
            .wait_for(Phase::Started, Duration::from_secs(5))
            .unwrap();
        assert!(eventually(Duration::from_secs(2), || {
            recorder.seen.lock().contains(&"sys.started")
        }));
        assert!(recorder.started_after_warmup.load(Ordering::SeqCst));
        kernel.shutdown();
    }

    #[test]
    fn test_starting_completion_order() {
        let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let hook_log = Arc::clone(&log);
        let kernel = Kernel::builder()
            .config(ConfigStore::builder().without_working_dir())
            .shutdown_hook(move |_trigger: ShutdownTrigger| hook_log.lock().push("hook"))
            .build();

        let keeper = Arc::new(Timekeeper::default());
        kernel.add("timekeeper", Arc::clone(&keeper));
        assert!(!keeper.clock.is_filled());

        let inject_log = Arc::clone(&log);
        kernel.add_resolver(5.0, move |request: &BeanRequest| -> Option<Payload> {
            (request.type_id == TypeId::of::<Arc<Clock>>()).then(|| {
                inject_log.lock().push("inject");
                Arc::new(Arc::new(Clock)) as Payload
            })
        });
        let started_log = Arc::clone(&log);
        kernel.dispatcher().listen(
            &SourceId::new("watcher"),
            Handler::on("sys.started").run(move |_| started_log.lock().push("started")),
        );

        kernel.start().unwrap();
        kernel
            .wait_for(Phase::Started, Duration::from_secs(5))
            .unwrap();
        assert!(eventually(Duration::from_secs(2), || log.lock().len() >= 3));

        assert_eq!(*log.lock(), vec!["hook", "inject", "started"]);
        assert!(keeper.clock.is_filled());
        kernel.shutdown();
    }

    #[test]
    fn test_service_cannot_fire_reserved_phase() {
        let kernel = isolated_kernel();
        let rogue = Arc::new(Rogue::default());
        kernel.add("rogue", Arc::clone(&rogue));
        kernel.start().unwrap();
        kernel
            .wait_for(Phase::Started, Duration::from_secs(5))
            .unwrap();

        let scope = rogue.events.get().unwrap();
        for phase in ["sys.inited", "sys.starting", "sys.started", "sys.stopping"] {
            let err = scope.fire_simple(phase).unwrap_err();
            assert!(matches!(err, DispatchError::Permission { .. }));
        }
        // a spoofed source label does not help
        let spoof = EventContext::of(&SourceId::new("sys"));
        assert!(kernel.fire("sys.stopping", spoof).is_err());

        assert_eq!(kernel.phase(), Some(Phase::Started));
        assert!(scope.fire_simple("rogue.custom").is_ok());
        kernel.shutdown();
    }

    #[test]
    fn test_shutdown_is_idempotent_and_final() {
        let kernel = isolated_kernel();
        let stops = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&stops);
        kernel.dispatcher().listen(
            &SourceId::new("watcher"),
            Handler::on("sys.stopping").run(move |_| {
                s.fetch_add(1, Ordering::SeqCst);
            }),
        );

        kernel.start().unwrap();
        kernel.shutdown();
        kernel.shutdown();
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert!(kernel.is_shutdown());
        assert!(kernel.shared_pool().is_shutdown());
        assert!(matches!(kernel.start(), Err(KernelError::AlreadyStarted(_))));
    }

    #[test]
    fn test_wait_for_times_out_before_start() {
        let kernel = isolated_kernel();
        let err = kernel
            .wait_for(Phase::Started, Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, KernelError::PhaseTimeout { phase: Phase::Started, .. }));
    }

    // =========================================================================
    // HEARTBEAT
    // =========================================================================

    #[test]
    fn test_heartbeat_rescheduled_through_scheduler_service() {
        let kernel = isolated_kernel_with(&[
            ("sys.heartbeat.minInterval", "2"),
            ("sys.heartbeat.randomInterval", "3"),
        ]);
        let scheduler = Arc::new(Scheduler {
            budget: AtomicUsize::new(3),
            ..Scheduler::default()
        });
        kernel.add("scheduler", Arc::clone(&scheduler));

        let beats = Arc::new(AtomicUsize::new(0));
        let b = Arc::clone(&beats);
        kernel.dispatcher().listen(
            &SourceId::new("watcher"),
            Handler::on("sys.heartbeat").run(move |_| {
                b.fetch_add(1, Ordering::SeqCst);
            }),
        );

        kernel.start().unwrap();
        assert!(eventually(Duration::from_secs(5), || {
            scheduler.delays.lock().len() >= 3
        }));
        assert_eq!(beats.load(Ordering::SeqCst), 3);
        for delay in scheduler.delays.lock().iter() {
            assert!(*delay >= Duration::from_secs(2));
            assert!(*delay < Duration::from_secs(5));
        }
        kernel.shutdown();
    }

    #[test]
    fn test_heartbeat_falls_back_to_timer() {
        let kernel = isolated_kernel_with(&[
            ("sys.heartbeat.minInterval", "0"),
            ("sys.heartbeat.randomInterval", "0"),
        ]);
        let beats = Arc::new(AtomicUsize::new(0));
        let b = Arc::clone(&beats);
        kernel.dispatcher().listen(
            &SourceId::new("watcher"),
            Handler::on("sys.heartbeat").run(move |_| {
                b.fetch_add(1, Ordering::SeqCst);
            }),
        );

        kernel.start().unwrap();
        assert!(eventually(Duration::from_secs(5), || {
            beats.load(Ordering::SeqCst) >= 3
        }));

        kernel.shutdown();
        let after_stop = beats.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert!(beats.load(Ordering::SeqCst) <= after_stop + 1);
    }

    #[test]
    fn test_start_refused_after_shutdown() {
        let kernel = isolated_kernel();
        kernel.shutdown();
        assert!(kernel.start().is_err());
        assert_eq!(kernel.phase(), Some(Phase::Stopping));
    }
}
