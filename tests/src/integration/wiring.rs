//! # Wiring Flows
//!
//! Injection through a live kernel: capability lookup, name resolution,
//! caller-scoped executors and event scopes, extra resolvers on the bus.

#[cfg(test)]
mod tests {
    use std::any::TypeId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use kernel_bus::{DispatchError, EventContext, EventDispatch, Handler, Payload, SourceId};
    use kernel_runtime::{
        BeanRequest, EventScope, Exposure, Inject, InjectionPoint, Kernel, Phase, Service,
        ServiceExecutor,
    };
    use parking_lot::Mutex;

    use crate::integration::{eventually, isolated_kernel};

    // =========================================================================
    // FIXTURES
    // =========================================================================

    trait Storage: Send + Sync {
        fn label(&self) -> String;
    }

    struct Disk(&'static str);

    impl Storage for Disk {
        fn label(&self) -> String {
            format!("disk:{}", self.0)
        }
    }

    impl Service for Disk {
        fn exposes(self: Arc<Self>, exposure: &mut Exposure) {
            exposure.expose::<Arc<dyn Storage>>(self);
        }
    }

    /// Wants one storage by type and one by explicit name.
    #[derive(Default)]
    struct Catalog {
        any_storage: Inject<Arc<dyn Storage>>,
        archive: Inject<Arc<dyn Storage>>,
        exec: Inject<ServiceExecutor>,
        events: Inject<EventScope>,
        kernel: Inject<Arc<Kernel>>,
        seen_sources: Mutex<Vec<SourceId>>,
    }

    impl Service for Catalog {
        fn injection_points(&self) -> Vec<InjectionPoint<'_>> {
            vec![
                InjectionPoint::by_type("any_storage", &self.any_storage),
                InjectionPoint::named("archive", "cold", &self.archive),
                InjectionPoint::by_type("exec", &self.exec),
                InjectionPoint::by_type("events", &self.events),
                InjectionPoint::by_type("kernel", &self.kernel),
            ]
        }

        fn handlers(self: Arc<Self>) -> Vec<Handler> {
            vec![Handler::on("catalog.ping").run(move |ctx| {
                if let Some(source) = ctx.source() {
                    self.seen_sources.lock().push(source.clone());
                }
            })]
        }
    }

    // =========================================================================
    // LOOKUP AND INJECTION
    // =========================================================================

    #[test]
    fn test_capability_lookup_first_registered_wins() {
        let kernel = isolated_kernel();
        kernel
            .add("hot", Arc::new(Disk("hot")))
            .add("cold", Arc::new(Disk("cold")));

        let first = kernel.bean::<Arc<dyn Storage>>(None).unwrap();
        assert_eq!(first.label(), "disk:hot");
        let named = kernel.bean::<Arc<dyn Storage>>(Some("cold")).unwrap();
        assert_eq!(named.label(), "disk:cold");
        assert!(kernel.bean::<Arc<Disk>>(Some("hot")).is_some());
    }

    #[test]
    fn test_injection_by_type_name_and_synthetic() {
        let kernel = isolated_kernel();
        let catalog = Arc::new(Catalog::default());
        kernel
            .add("hot", Arc::new(Disk("hot")))
            .add("cold", Arc::new(Disk("cold")))
            .add("catalog", Arc::clone(&catalog));

        assert_eq!(catalog.any_storage.get().map(|s| s.label()).as_deref(), Some("disk:hot"));
        assert_eq!(catalog.archive.get().map(|s| s.label()).as_deref(), Some("disk:cold"));
        assert_eq!(catalog.exec.get().and_then(|e| e.owner()), Some("catalog"));
        assert!(catalog
            .kernel
            .get()
            .is_some_and(|k| Arc::ptr_eq(k, &kernel)));

        let bean = kernel.registry().get("catalog").unwrap();
        assert_eq!(catalog.events.get().map(|s| s.source()), Some(bean.source()));
    }

    #[test]
    fn test_caller_supplied_slot_is_kept() {
        let kernel = isolated_kernel();
        kernel.add("hot", Arc::new(Disk("hot")));
        let mine: Arc<dyn Storage> = Arc::new(Disk("mine"));
        let catalog = Arc::new(Catalog {
            any_storage: Inject::with(mine),
            ..Catalog::default()
        });
        kernel.add("catalog", Arc::clone(&catalog));
        assert_eq!(catalog.any_storage.get().map(|s| s.label()).as_deref(), Some("disk:mine"));
    }

    #[test]
    fn test_unresolved_points_filled_when_starting_completes() {
        let kernel = isolated_kernel();
        let catalog = Arc::new(Catalog::default());
        kernel.add("catalog", Arc::clone(&catalog));
        assert!(!catalog.any_storage.is_filled());
        assert!(!catalog.archive.is_filled());

        kernel.add("cold", Arc::new(Disk("cold")));
        kernel.start().unwrap();
        kernel
            .wait_for(Phase::Started, Duration::from_secs(5))
            .unwrap();

        assert!(catalog.any_storage.is_filled());
        assert!(catalog.archive.is_filled());
        kernel.shutdown();
    }

    #[test]
    fn test_resolver_answers_what_registry_cannot() {
        let kernel = isolated_kernel();
        let asked = Arc::new(AtomicUsize::new(0));
        let a = Arc::clone(&asked);
        kernel.add_resolver(10.0, move |request: &BeanRequest| -> Option<Payload> {
            a.fetch_add(1, Ordering::SeqCst);
            (request.type_id == TypeId::of::<Arc<dyn Storage>>()).then(|| {
                let remote: Arc<dyn Storage> = Arc::new(Disk("remote"));
                Arc::new(remote) as Payload
            })
        });

        let found = kernel.bean::<Arc<dyn Storage>>(None).unwrap();
        assert_eq!(found.label(), "disk:remote");

        // a registered bean answers first; the resolver is not consulted
        kernel.add("hot", Arc::new(Disk("hot")));
        let before = asked.load(Ordering::SeqCst);
        assert_eq!(kernel.bean::<Arc<dyn Storage>>(None).unwrap().label(), "disk:hot");
        assert_eq!(asked.load(Ordering::SeqCst), before);
    }

    #[test]
    fn test_bean_get_event_reachable_from_bus() {
        let kernel = isolated_kernel();
        kernel.add("hot", Arc::new(Disk("hot")));
        let request = BeanRequest::of::<Arc<dyn Storage>>(Some("hot"));
        let answer = kernel
            .fire("bean.get", EventContext::new().sync().arg(request))
            .unwrap()
            .unwrap();
        let storage = answer.downcast_ref::<Arc<dyn Storage>>().unwrap();
        assert_eq!(storage.label(), "disk:hot");
    }

    // =========================================================================
    // EVENT SCOPES
    // =========================================================================

    #[test]
    fn test_scope_stamps_its_service_source() {
        let kernel = isolated_kernel();
        let catalog = Arc::new(Catalog::default());
        kernel.add("catalog", Arc::clone(&catalog));

        let scope = catalog.events.get().unwrap();
        scope.fire_simple("catalog.ping").unwrap();

        let explicit = SourceId::new("explicit");
        scope
            .fire("catalog.ping", EventContext::of(&explicit))
            .unwrap();

        let seen = catalog.seen_sources.lock().clone();
        assert_eq!(seen, vec![scope.source().clone(), explicit]);
    }

    #[test]
    fn test_scope_removes_only_its_own_handlers() {
        let kernel = isolated_kernel();
        let catalog = Arc::new(Catalog::default());
        kernel.add("catalog", Arc::clone(&catalog));
        let scope = catalog.events.get().unwrap();

        let other = kernel.scope_for(None);
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        other.listen(
            other.source(),
            Handler::on("catalog.ping").run(move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let err = scope
            .remove_event("catalog.ping", Some(other.source()))
            .unwrap_err();
        assert!(matches!(err, DispatchError::Permission { action: "remove", .. }));

        // removing its own leaves the other source's handler in place
        scope.remove_event("catalog.ping", None).unwrap();
        scope.fire_simple("catalog.ping").unwrap();
        assert!(catalog.seen_sources.lock().is_empty());
        assert!(eventually(Duration::from_secs(1), || hits.load(Ordering::SeqCst) == 1));
    }

    #[test]
    fn test_inject_event_for_unregistered_service() {
        let kernel = isolated_kernel();
        kernel.add("hot", Arc::new(Disk("hot")));
        let loose = Arc::new(Catalog::default());
        let as_service: Arc<dyn Service> = loose.clone();

        kernel
            .fire("inject", EventContext::new().arg(as_service))
            .unwrap();

        assert!(loose.any_storage.is_filled());
        // not registered, so no local tier of its own
        assert!(loose.exec.get().is_some_and(|e| e.owner().is_none()));
    }
}
