//! # In-Memory Event Bus
//!
//! Reference implementation of [`EventDispatch`]. Handlers are kept per event
//! name, sorted by order. Asynchronous handlers are handed to a [`Spawner`];
//! the kernel plugs its shared executor in there.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::context::{EventContext, Payload};
use crate::dispatch::{DispatchError, EventDispatch};
use crate::handler::Handler;
use crate::source::SourceId;
use crate::Task;

/// Runs asynchronous handlers.
pub trait Spawner: Send + Sync {
    fn spawn(&self, task: Task);
}

/// Spawner that starts one short-lived thread per asynchronous handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSpawner;

impl Spawner for ThreadSpawner {
    fn spawn(&self, task: Task) {
        let slot = Arc::new(Mutex::new(Some(task)));
        let worker_slot = Arc::clone(&slot);
        let spawned = thread::Builder::new()
            .name("bus-async".to_string())
            .spawn(move || {
                if let Some(task) = worker_slot.lock().take() {
                    task();
                }
            });
        if let Err(e) = spawned {
            error!(error = %e, "[bus] Failed to spawn handler thread, running inline");
            if let Some(task) = slot.lock().take() {
                task();
            }
        }
    }
}

struct Registered {
    source: SourceId,
    handler: Handler,
    remaining: Option<AtomicU32>,
}

impl Registered {
    fn claim(&self) -> bool {
        match &self.remaining {
            None => true,
            Some(left) => left
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                .is_ok(),
        }
    }

    fn exhausted(&self) -> bool {
        matches!(&self.remaining, Some(left) if left.load(Ordering::Acquire) == 0)
    }
}

/// In-process dispatcher.
pub struct InMemoryEventBus {
    handlers: RwLock<HashMap<String, Vec<Arc<Registered>>>>,
    tracked: RwLock<HashSet<String>>,
    spawner: Arc<dyn Spawner>,
    events_fired: AtomicU64,
}

impl InMemoryEventBus {
    /// Bus that runs asynchronous handlers on dedicated threads.
    #[must_use]
    pub fn new() -> Self {
        Self::with_spawner(Arc::new(ThreadSpawner))
    }

    /// Bus that runs asynchronous handlers on `spawner`.
    #[must_use]
    pub fn with_spawner(spawner: Arc<dyn Spawner>) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            tracked: RwLock::new(HashSet::new()),
            spawner,
            events_fired: AtomicU64::new(0),
        }
    }

    /// Total number of fires, including fires nobody listened to.
    pub fn events_fired(&self) -> u64 {
        self.events_fired.load(Ordering::Relaxed)
    }

    /// Number of handlers currently bound to `event`.
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.read().get(event).map_or(0, Vec::len)
    }

    pub fn is_tracked(&self, event: &str) -> bool {
        self.tracked.read().contains(event)
    }

    fn prune(&self, event: &str) {
        let mut handlers = self.handlers.write();
        if let Some(list) = handlers.get_mut(event) {
            list.retain(|r| !r.exhausted());
            if list.is_empty() {
                handlers.remove(event);
            }
        }
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatch for InMemoryEventBus {
    fn fire(&self, event: &str, ctx: EventContext) -> Result<Option<Payload>, DispatchError> {
        self.events_fired.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        let listeners: Vec<Arc<Registered>> = self
            .handlers
            .read()
            .get(event)
            .cloned()
            .unwrap_or_default();
        let claimed: Vec<Arc<Registered>> = listeners.into_iter().filter(|r| r.claim()).collect();
        if claimed.iter().any(|r| r.exhausted()) {
            self.prune(event);
        }

        let ctx = Arc::new(ctx);
        let force_sync = ctx.is_sync_forced();
        let handler_count = claimed.len();
        // One extra slot held by this thread until every handler is dispatched.
        let pending = Arc::new(AtomicUsize::new(handler_count + 1));

        for registered in claimed {
            if registered.handler.is_async && !force_sync {
                let ctx = Arc::clone(&ctx);
                let pending = Arc::clone(&pending);
                let event = event.to_string();
                self.spawner.spawn(Box::new(move || {
                    invoke(&event, &registered, &ctx);
                    finish(&event, &pending, &ctx);
                }));
            } else {
                invoke(event, &registered, &ctx);
                finish(event, &pending, &ctx);
            }
        }

        let result = ctx.result();
        finish(event, &pending, &ctx);

        if self.is_tracked(event) {
            info!(
                event,
                source = ?ctx.source(),
                handlers = handler_count,
                answered = result.is_some(),
                elapsed_us = started.elapsed().as_micros() as u64,
                "[bus] Tracked event fired"
            );
        }
        Ok(result)
    }

    fn listen(&self, source: &SourceId, handler: Handler) {
        debug!(
            event = %handler.event,
            source = %source,
            order = handler.order,
            is_async = handler.is_async,
            "[bus] Handler registered"
        );
        let registered = Arc::new(Registered {
            source: source.clone(),
            remaining: handler.limit.map(AtomicU32::new),
            handler,
        });
        let mut handlers = self.handlers.write();
        let list = handlers.entry(registered.handler.event.clone()).or_default();
        let at = list
            .iter()
            .position(|r| r.handler.order > registered.handler.order)
            .unwrap_or(list.len());
        list.insert(at, registered);
    }

    fn remove_event(&self, event: &str, source: Option<&SourceId>) -> Result<(), DispatchError> {
        let mut handlers = self.handlers.write();
        match source {
            Some(source) => {
                if let Some(list) = handlers.get_mut(event) {
                    list.retain(|r| &r.source != source);
                    if list.is_empty() {
                        handlers.remove(event);
                    }
                }
            }
            None => {
                handlers.remove(event);
            }
        }
        debug!(event, source = ?source, "[bus] Handlers removed");
        Ok(())
    }

    fn exists(&self, event: &str) -> bool {
        self.handlers
            .read()
            .get(event)
            .is_some_and(|list| !list.is_empty())
    }

    fn add_track_event(&self, event: &str) {
        self.tracked.write().insert(event.to_string());
    }

    fn del_track_event(&self, event: &str) {
        self.tracked.write().remove(event);
    }
}

fn invoke(event: &str, registered: &Registered, ctx: &EventContext) {
    match panic::catch_unwind(AssertUnwindSafe(|| (registered.handler.func)(ctx))) {
        Ok(Some(value)) => ctx.offer_result(value),
        Ok(None) => {}
        Err(panic) => error!(
            event,
            source = %registered.source,
            "[bus] Handler panicked: {}",
            panic_message(panic.as_ref())
        ),
    }
}

fn finish(event: &str, pending: &AtomicUsize, ctx: &EventContext) {
    if pending.fetch_sub(1, Ordering::AcqRel) != 1 {
        return;
    }
    if let Some(complete) = ctx.take_completion() {
        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| complete(ctx))) {
            error!(
                event,
                "[bus] Completion callback panicked: {}",
                panic_message(panic.as_ref())
            );
        }
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic>".to_string()
    }
}
