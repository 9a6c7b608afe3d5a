//! # Kernel
//!
//! Owns the configuration, the registry, both executor tiers and the
//! lifecycle of every registered service.
//!
//! ```text
//!   start()
//!     │
//!     ├─► sys.inited
//!     ├─► sys.starting ──(complete)──► hook, inject all, log duration
//!     │                                    │
//!     │                                    └─► sys.started ──(complete)──► heartbeat
//!     │
//!   shutdown()
//!     └─► sys.stopping (sync) ──(complete)──► heartbeat off, shared tier down
//! ```
//!
//! Only the kernel's own [`SourceId`] may fire the four phase events.

mod heartbeat;
mod lifecycle;

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once, Weak};
use std::time::{Duration, Instant};

use kernel_bus::{
    EventContext, EventDispatch, Handler, InMemoryEventBus, Payload, SourceId, Spawner, Task,
};
use kernel_telemetry::metrics::{HEARTBEATS, SERVICES_REGISTERED, STARTUP_DURATION};
use parking_lot::{Mutex, RwLock};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{debug, error, info, trace, warn};

pub use heartbeat::{next_delay, Deferred, Timer, SCHED_AFTER};
pub use lifecycle::Phase;

use self::heartbeat::Heartbeat;
use self::lifecycle::Lifecycle;
use crate::config::{ConfigStore, ConfigStoreBuilder, ProcessProperties};
use crate::error::KernelError;
use crate::exec::{Executor, LocalTier, PoolConfig, SerialQueue, ServiceExecutor, ThreadPool};
use crate::lazy::LazySingleton;
use crate::registry::{BeanRegistry, BeanRequest, BeanResolver, Service};
use crate::wiring::{EventScope, PhaseGuard};

/// Event answering bean lookups.
pub const BEAN_GET: &str = "bean.get";
/// Event asking the kernel to inject an `Arc<dyn Service>`.
pub const INJECT: &str = "inject";
/// Event fired on every beat.
pub const HEARTBEAT: &str = "sys.heartbeat";

const DEFAULT_NAME: &str = "app";

/// Callback that stops the kernel.
pub type ShutdownTrigger = Box<dyn Fn() + Send + Sync>;

/// Connects the kernel to whatever ends the process (signals, a service
/// manager, a test). Installed once, when `sys.starting` completes.
pub trait ShutdownHook: Send + Sync {
    fn install(&self, trigger: ShutdownTrigger);
}

impl<F> ShutdownHook for F
where
    F: Fn(ShutdownTrigger) + Send + Sync,
{
    fn install(&self, trigger: ShutdownTrigger) {
        self(trigger)
    }
}

/// Runs async bus handlers on the shared tier.
struct SharedTierSpawner(Weak<Kernel>);

impl Spawner for SharedTierSpawner {
    fn spawn(&self, task: Task) {
        match self.0.upgrade() {
            Some(kernel) => kernel.shared_pool().execute(task),
            None => task(),
        }
    }
}

/// Builder for [`Kernel`].
pub struct KernelBuilder {
    config: ConfigStoreBuilder,
    dispatcher: Option<Arc<dyn EventDispatch>>,
    shutdown_hook: Option<Box<dyn ShutdownHook>>,
}

impl Default for KernelBuilder {
    fn default() -> Self {
        Self {
            config: ConfigStore::builder(),
            dispatcher: None,
            shutdown_hook: None,
        }
    }
}

impl KernelBuilder {
    /// Replace the configuration sources.
    #[must_use]
    pub fn config(mut self, config: ConfigStoreBuilder) -> Self {
        self.config = config;
        self
    }

    /// Add one process property.
    #[must_use]
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config = self.config.property(key, value);
        self
    }

    #[must_use]
    pub fn properties(mut self, props: ProcessProperties) -> Self {
        self.config = self.config.properties(props);
        self
    }

    /// Use `dispatcher` instead of the built-in [`InMemoryEventBus`].
    #[must_use]
    pub fn dispatcher(mut self, dispatcher: Arc<dyn EventDispatch>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    #[must_use]
    pub fn shutdown_hook(mut self, hook: impl ShutdownHook + 'static) -> Self {
        self.shutdown_hook = Some(Box::new(hook));
        self
    }

    pub fn build(self) -> Arc<Kernel> {
        let Self {
            config,
            dispatcher,
            shutdown_hook,
        } = self;

        let kernel = Arc::new_cyclic(|me: &Weak<Kernel>| {
            let source = SourceId::new("sys");
            let raw: Arc<dyn EventDispatch> = match dispatcher {
                Some(dispatcher) => dispatcher,
                None => Arc::new(InMemoryEventBus::with_spawner(Arc::new(
                    SharedTierSpawner(me.clone()),
                ))),
            };

            let env = LazySingleton::new(move || config.build());
            let name = {
                let me = me.clone();
                LazySingleton::new(move || {
                    me.upgrade()
                        .and_then(|k| k.env().get_as::<String>("sys.name"))
                        .unwrap_or_else(|| DEFAULT_NAME.to_string())
                })
            };
            let id = {
                let me = me.clone();
                LazySingleton::new(move || match me.upgrade() {
                    Some(k) => k
                        .env()
                        .get_as::<String>("sys.id")
                        .unwrap_or_else(|| format!("{}_{}", k.name(), random_suffix())),
                    None => format!("{DEFAULT_NAME}_{}", random_suffix()),
                })
            };
            let shared = {
                let me = me.clone();
                LazySingleton::new(move || {
                    let config = match me.upgrade() {
                        Some(k) => PoolConfig::shared(k.env()),
                        None => PoolConfig::shared(&ConfigStore::default()),
                    };
                    info!(
                        core = config.core_size,
                        max = config.max_size,
                        "[exec] Creating shared executor tier"
                    );
                    Arc::new(ThreadPool::new(config))
                })
            };

            Kernel {
                me: me.clone(),
                dispatcher: Arc::new(PhaseGuard::new(source.clone(), raw)),
                source,
                env,
                name,
                id,
                registry: BeanRegistry::new(),
                shared,
                local_tiers: Mutex::new(HashMap::new()),
                queues: RwLock::new(HashMap::new()),
                lifecycle: Lifecycle::default(),
                heartbeat: Heartbeat::default(),
                shutdown_hook,
                hook_installed: Once::new(),
                stop_requested: AtomicBool::new(false),
            }
        });
        kernel.listen_core_events();
        kernel
    }
}

/// The application kernel.
pub struct Kernel {
    me: Weak<Kernel>,
    source: SourceId,
    dispatcher: Arc<PhaseGuard>,
    env: LazySingleton<ConfigStore>,
    name: LazySingleton<String>,
    id: LazySingleton<String>,
    registry: BeanRegistry,
    shared: LazySingleton<Arc<ThreadPool>>,
    local_tiers: Mutex<HashMap<String, LocalTier>>,
    queues: RwLock<HashMap<String, SerialQueue>>,
    lifecycle: Lifecycle,
    heartbeat: Heartbeat,
    shutdown_hook: Option<Box<dyn ShutdownHook>>,
    hook_installed: Once,
    stop_requested: AtomicBool,
}

impl Kernel {
    pub fn builder() -> KernelBuilder {
        KernelBuilder::default()
    }

    /// Kernel with default configuration sources and the in-memory bus.
    pub fn new() -> Arc<Self> {
        Self::builder().build()
    }

    /// Identity used for the phase events.
    pub fn source(&self) -> &SourceId {
        &self.source
    }

    /// The environment, built on first access.
    pub fn env(&self) -> &ConfigStore {
        self.env.get()
    }

    /// `sys.name`, or `app`.
    pub fn name(&self) -> &str {
        self.name.get()
    }

    /// `sys.id`, or the name plus a random suffix.
    pub fn id(&self) -> &str {
        self.id.get()
    }

    pub fn registry(&self) -> &BeanRegistry {
        &self.registry
    }

    /// Guarded dispatcher; firing a phase event through it needs the
    /// kernel's source.
    pub fn dispatcher(&self) -> Arc<dyn EventDispatch> {
        Arc::clone(&self.dispatcher) as Arc<dyn EventDispatch>
    }

    /// Fire through the guarded dispatcher.
    pub fn fire(&self, event: &str, ctx: EventContext) -> Result<Option<Payload>, KernelError> {
        Ok(self.dispatcher.fire(event, ctx)?)
    }

    pub fn phase(&self) -> Option<Phase> {
        self.lifecycle.current()
    }

    /// Block until `phase` (or a later one) was entered.
    pub fn wait_for(&self, phase: Phase, timeout: Duration) -> Result<(), KernelError> {
        if self.lifecycle.wait_for(phase, timeout) {
            Ok(())
        } else {
            Err(KernelError::PhaseTimeout { phase, timeout })
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// Register `service` as `name`, inject it and subscribe its handlers.
    ///
    /// Reserved and taken names are logged and ignored.
    pub fn add<S: Service>(&self, name: &str, service: Arc<S>) -> &Self {
        let source = SourceId::new(name);
        let Some(bean) = self
            .registry
            .insert(name, source.clone(), Arc::clone(&service))
        else {
            return self;
        };
        SERVICES_REGISTERED.set(self.registry.len() as i64);

        self.inject_as(service.as_ref(), Some(&source));
        let handlers = service.handlers();
        if !handlers.is_empty() {
            self.dispatcher.add_listener_source(&source, handlers);
        }
        info!(name, kind = bean.type_name(), "[kernel] Service registered");
        self
    }

    /// Consult `resolver` on every lookup the registry cannot answer.
    /// Lower `order` is asked first; the registry itself answers at -1.
    pub fn add_resolver(&self, order: f32, resolver: impl BeanResolver + 'static) -> &Self {
        self.dispatcher.listen(
            &self.source,
            Handler::on(BEAN_GET).order(order).reply(move |ctx| {
                if ctx.result().is_some() {
                    return None;
                }
                ctx.arg_as::<BeanRequest>(0)
                    .and_then(|request| resolver.resolve(request))
            }),
        );
        self
    }

    /// Look up a bean of type `T`, by name when given.
    pub fn bean<T: Any + Clone>(&self, name: Option<&str>) -> Option<T> {
        self.resolve(BeanRequest::of::<T>(name))
            .and_then(|payload| payload.downcast_ref::<T>().cloned())
    }

    /// The service registered as `name`, whatever its type.
    pub fn lookup_any(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.registry.get(name).map(|bean| Arc::clone(bean.service()))
    }

    /// Run a full resolution through `bean.get`.
    pub fn resolve(&self, request: BeanRequest) -> Option<Payload> {
        let ctx = EventContext::of(&self.source).sync().arg(request);
        match self.dispatcher.fire(BEAN_GET, ctx) {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "[kernel] Bean lookup failed");
                None
            }
        }
    }

    /// Fill the empty slots of `service`. Returns how many were filled.
    pub fn inject(&self, service: &dyn Service) -> usize {
        self.inject_as(service, None)
    }

    fn inject_as(&self, service: &dyn Service, caller: Option<&SourceId>) -> usize {
        let mut filled = 0;
        for point in service.injection_points() {
            let target = point.target();
            if target.is_filled() {
                continue;
            }
            let request = BeanRequest {
                type_id: target.wanted_type(),
                type_name: target.wanted_type_name(),
                name: point.bean_name().map(str::to_string),
                caller: caller.cloned(),
            };
            match self.resolve(request) {
                Some(payload) if target.accept(&payload) => {
                    trace!(field = point.field(), "[kernel] Injected");
                    filled += 1;
                }
                Some(_) => warn!(
                    field = point.field(),
                    wanted = target.wanted_type_name(),
                    "[kernel] Resolved bean has the wrong type, skipped"
                ),
                None => debug!(
                    field = point.field(),
                    wanted = target.wanted_type_name(),
                    bean = ?point.bean_name(),
                    "[kernel] Nothing to inject, skipped"
                ),
            }
        }
        filled
    }

    /// The kernel's own answer to `bean.get`.
    fn resolve_local(&self, request: &BeanRequest) -> Option<Payload> {
        if request.name.is_none() {
            let caller = request.caller.as_ref();
            if request.type_id == TypeId::of::<ServiceExecutor>() {
                return Some(Arc::new(self.executor_for(caller)) as Payload);
            }
            if request.type_id == TypeId::of::<EventScope>() {
                return Some(Arc::new(self.scope_for(caller)) as Payload);
            }
            if request.type_id == TypeId::of::<Arc<Kernel>>() {
                return self.me.upgrade().map(|kernel| Arc::new(kernel) as Payload);
            }
        }
        self.registry
            .lookup(request.type_id, request.name.as_deref())
    }

    fn listen_core_events(&self) {
        let me = self.me.clone();
        self.dispatcher.listen(
            &self.source,
            Handler::on(BEAN_GET).order(-1.0).reply(move |ctx| {
                if ctx.result().is_some() {
                    return None;
                }
                let request = ctx.arg_as::<BeanRequest>(0)?;
                me.upgrade()?.resolve_local(request)
            }),
        );

        let me = self.me.clone();
        self.dispatcher.listen(
            &self.source,
            Handler::on(INJECT).run(move |ctx| {
                let (Some(kernel), Some(service)) =
                    (me.upgrade(), ctx.arg_as::<Arc<dyn Service>>(0))
                else {
                    return;
                };
                let caller = kernel
                    .registry
                    .by_instance(service)
                    .map(|bean| bean.source().clone());
                kernel.inject_as(service.as_ref(), caller.as_ref());
            }),
        );
    }

    // ------------------------------------------------------------------
    // Executors
    // ------------------------------------------------------------------

    /// The shared tier, created on first use.
    pub fn shared_pool(&self) -> &Arc<ThreadPool> {
        self.shared.get()
    }

    /// Executor view for `caller`. Registered services get their own local
    /// tier; anyone else only the shared one.
    pub fn executor_for(&self, caller: Option<&SourceId>) -> ServiceExecutor {
        let shared = Arc::clone(self.shared_pool());
        match caller.and_then(|source| self.registry.by_source(source)) {
            Some(bean) => ServiceExecutor::new(bean.name(), shared, self.local_tier(bean.name())),
            None => ServiceExecutor::shared_only(shared),
        }
    }

    /// Executor view of the service registered as `name`.
    pub fn executor_of(&self, name: &str) -> Option<ServiceExecutor> {
        self.registry
            .get(name)
            .map(|bean| self.executor_for(Some(bean.source())))
    }

    fn local_tier(&self, service: &str) -> LocalTier {
        let mut tiers = self.local_tiers.lock();
        let tier = tiers.entry(service.to_string()).or_insert_with(|| {
            let me = self.me.clone();
            let service = service.to_string();
            Arc::new(LazySingleton::new(move || {
                let kernel = me.upgrade();
                let config = match &kernel {
                    Some(k) => PoolConfig::local(&service, k.env()),
                    None => PoolConfig::local(&service, &ConfigStore::default()),
                };
                info!(
                    service = %service,
                    core = config.core_size,
                    max = config.max_size,
                    "[exec] Creating local executor tier"
                );
                let pool = Arc::new(ThreadPool::new(config));
                match &kernel {
                    Some(k) if !k.is_shutdown() => {
                        let stopping = Arc::clone(&pool);
                        k.dispatcher.listen(
                            &k.source,
                            Handler::on(Phase::Stopping.event())
                                .order(1.0)
                                .asynchronous()
                                .limit(1)
                                .run(move |_| stopping.shutdown()),
                        );
                    }
                    _ => pool.shutdown(),
                }
                pool
            }))
        });
        Arc::clone(tier)
    }

    /// Serial queue `name`, created on first use on the shared tier.
    pub fn queue(&self, name: &str) -> SerialQueue {
        if let Some(queue) = self.queues.read().get(name) {
            return queue.clone();
        }
        let mut queues = self.queues.write();
        queues
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(queue = name, "[exec] Creating serial queue");
                SerialQueue::new(name, Arc::clone(self.shared_pool()) as Arc<dyn Executor>)
            })
            .clone()
    }

    /// Offer `task` to queue `name`.
    pub fn queue_with(&self, name: &str, task: Task) -> SerialQueue {
        let queue = self.queue(name);
        queue.offer(task);
        queue
    }

    /// Event façade for `caller`; anonymous callers get a fresh identity.
    pub fn scope_for(&self, caller: Option<&SourceId>) -> EventScope {
        let source = caller.cloned().unwrap_or_else(SourceId::anonymous);
        EventScope::new(source, self.dispatcher())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Run `inited` and `starting`. `started` follows once every
    /// `starting` listener has finished.
    pub fn start(&self) -> Result<(), KernelError> {
        self.lifecycle.begin().map_err(KernelError::AlreadyStarted)?;
        let started_at = Instant::now();
        info!(
            name = %self.name(),
            id = %self.id(),
            profile = self.env().profile().unwrap_or("<none>"),
            services = self.registry.len(),
            "[kernel] Starting"
        );
        self.apply_tracked_events();

        self.dispatcher
            .fire(Phase::Inited.event(), EventContext::of(&self.source))?;

        self.lifecycle.advance(Phase::Starting);
        let me = self.me.clone();
        self.dispatcher.fire(
            Phase::Starting.event(),
            EventContext::of(&self.source).on_complete(move |_| {
                if let Some(kernel) = me.upgrade() {
                    kernel.starting_complete(started_at);
                }
            }),
        )?;
        Ok(())
    }

    fn starting_complete(&self, started_at: Instant) {
        self.install_shutdown_hook();

        for bean in self.registry.beans() {
            self.inject_as(bean.service().as_ref(), Some(bean.source()));
        }

        let elapsed = started_at.elapsed();
        STARTUP_DURATION.observe(elapsed.as_secs_f64());
        info!(
            name = %self.name(),
            elapsed_ms = elapsed.as_millis() as u64,
            "[kernel] Started"
        );

        if !self.lifecycle.advance(Phase::Started) {
            return;
        }
        let me = self.me.clone();
        let fired = self.dispatcher.fire(
            Phase::Started.event(),
            EventContext::of(&self.source).on_complete(move |_| {
                if let Some(kernel) = me.upgrade() {
                    kernel.beat();
                }
            }),
        );
        if let Err(e) = fired {
            error!(error = %e, "[kernel] Failed to fire sys.started");
        }
    }

    fn install_shutdown_hook(&self) {
        self.hook_installed.call_once(|| match &self.shutdown_hook {
            Some(hook) => {
                let me = self.me.clone();
                hook.install(Box::new(move || {
                    if let Some(kernel) = me.upgrade() {
                        kernel.shutdown();
                    }
                }));
                debug!("[kernel] Shutdown hook installed");
            }
            None => debug!("[kernel] No shutdown hook configured"),
        });
    }

    fn apply_tracked_events(&self) {
        if let Some(tracked) = self.env().get("bus.track") {
            for event in tracked.split(',').map(str::trim).filter(|e| !e.is_empty()) {
                self.dispatcher.add_track_event(event);
            }
        }
    }

    /// Fire `sys.heartbeat` and schedule the next beat.
    fn beat(&self) {
        if self.heartbeat.is_stopped() {
            return;
        }
        HEARTBEATS.inc();
        if let Err(e) = self
            .dispatcher
            .fire(HEARTBEAT, EventContext::of(&self.source))
        {
            warn!(error = %e, "[kernel] Heartbeat fire failed");
        }

        let env = self.env();
        let delay = next_delay(
            env.get_or("sys.heartbeat.minInterval", 60),
            env.get_or("sys.heartbeat.randomInterval", 180),
        );
        let me = self.me.clone();
        let next: Task = Box::new(move || {
            if let Some(kernel) = me.upgrade() {
                kernel.beat();
            }
        });

        if self.dispatcher.exists(SCHED_AFTER) {
            trace!(delay_s = delay.as_secs(), "[kernel] Next heartbeat via scheduler");
            let ctx = EventContext::of(&self.source)
                .arg(delay)
                .arg(Arc::new(Deferred::new(next)));
            if let Err(e) = self.dispatcher.fire(SCHED_AFTER, ctx) {
                warn!(error = %e, "[kernel] Could not schedule heartbeat");
            }
        } else {
            trace!(delay_s = delay.as_secs(), "[kernel] Next heartbeat via timer");
            self.heartbeat.schedule(delay, next);
        }
    }

    /// Fire `sys.stopping` with every listener on this thread, then stop
    /// the heartbeat and the shared tier. Repeated calls do nothing.
    pub fn shutdown(&self) {
        if self.stop_requested.swap(true, Ordering::AcqRel) {
            debug!("[kernel] Shutdown already requested");
            return;
        }
        info!(name = %self.name(), "[kernel] Stopping");
        self.lifecycle.advance(Phase::Stopping);

        let me = self.me.clone();
        let fired = self.dispatcher.fire(
            Phase::Stopping.event(),
            EventContext::of(&self.source).sync().on_complete(move |_| {
                if let Some(kernel) = me.upgrade() {
                    kernel.stopping_complete();
                }
            }),
        );
        if let Err(e) = fired {
            error!(error = %e, "[kernel] Failed to fire sys.stopping");
            self.stopping_complete();
        }
    }

    fn stopping_complete(&self) {
        self.heartbeat.stop();
        self.shared_pool().shutdown();
        info!(name = %self.name(), "[kernel] Stopped");
    }
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect()
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("phase", &self.phase())
            .field("services", &self.registry.names())
            .field("shared_created", &self.shared.done())
            .finish()
    }
}
