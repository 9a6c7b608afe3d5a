//! # Thread Pool
//!
//! Fixed-policy worker pool used for both executor tiers.
//!
//! ```text
//!   execute(task)
//!     │
//!     ├─ pool < core ............... new worker runs it
//!     ├─ admission accepts ......... queue (wake an idle worker)
//!     ├─ pool < max ................ new worker runs it
//!     └─ saturated / shut down ..... caller runs it
//! ```
//!
//! Workers above core (or every worker when core time-out is enabled)
//! retire after `keep_alive` without work. Shutdown lets workers drain the
//! queue before they exit.

use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use kernel_bus::bus::panic_message;
use kernel_telemetry::metrics::{
    HistogramTimer, EXEC_CALLER_RUNS, EXEC_POOL_SIZE, EXEC_TASKS_EXECUTED, EXEC_TASK_DURATION,
    EXEC_TASK_PANICS,
};
use parking_lot::{Condvar, Mutex};
use prometheus::{Histogram, IntCounter, IntGauge};
use tracing::{debug, error, info};

use super::admission::{Admission, PoolLoad};
use super::{Executor, Task};
use crate::config::ConfigStore;

const HOUR: Duration = Duration::from_secs(3600);

/// Sizing and policy of one pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Thread name prefix; workers are `<name>-<n>`.
    pub name: String,
    pub core_size: usize,
    pub max_size: usize,
    pub keep_alive: Duration,
    pub admission: Admission,
    pub allow_core_timeout: bool,
}

impl PoolConfig {
    /// Shared tier settings from `sys.exec.*`.
    pub fn shared(config: &ConfigStore) -> Self {
        let default_core = if num_cpus::get() >= 8 { 8 } else { 4 };
        let core_size = config.get_or("sys.exec.corePoolSize", default_core);
        let max_size = core_size.max(config.get_or("sys.exec.maximumPoolSize", 16));
        Self {
            name: "sys".to_string(),
            core_size,
            max_size,
            keep_alive: HOUR * config.get_or("sys.exec.keepAliveTime", 4u32),
            admission: Admission::Bounded {
                capacity: config.get_or("sys.exec.queueCapacity", 100_000),
            },
            allow_core_timeout: config.get_or("sys.exec.allowCoreThreadTimeOut", false),
        }
        .normalized()
    }

    /// Local tier settings for `service` from `<service>.exec.*`.
    pub fn local(service: &str, config: &ConfigStore) -> Self {
        let key = |suffix: &str| format!("{service}.exec.{suffix}");
        let cpus = num_cpus::get();
        let default_max = if cpus <= 12 {
            12
        } else {
            (cpus as f64 * 1.5).round() as usize
        };
        let core_size = config.get_or(&key("corePoolSize"), 2);
        let max_size = core_size.max(config.get_or(&key("maximumPoolSize"), default_max));
        let up_threshold = config
            .get_as(&key("upThreshold"))
            .unwrap_or_else(|| config.get_or("sys.exec.upThreshold", 2));
        Self {
            name: service.to_string(),
            core_size,
            max_size,
            keep_alive: HOUR * config.get_or(&key("keepAliveTime"), 2u32),
            admission: Admission::Threshold { up_threshold },
            allow_core_timeout: config.get_or(&key("allowCoreThreadTimeOut"), true),
        }
        .normalized()
    }

    fn normalized(mut self) -> Self {
        self.max_size = self.max_size.max(self.core_size).max(1);
        self
    }
}

/// Point-in-time counters of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub pool_size: usize,
    pub active_count: usize,
    pub queue_len: usize,
    pub largest_pool_size: usize,
    pub completed_count: u64,
}

struct PoolState {
    queue: VecDeque<Task>,
    pool_size: usize,
    active: usize,
    largest_pool_size: usize,
    completed: u64,
    next_worker: usize,
    shutdown: bool,
}

impl PoolState {
    fn load(&self, config: &PoolConfig) -> PoolLoad {
        PoolLoad {
            queued: self.queue.len(),
            pool_size: self.pool_size,
            active: self.active,
            core_size: config.core_size,
            max_size: config.max_size,
        }
    }
}

struct PoolMetrics {
    executed: IntCounter,
    caller_runs: IntCounter,
    panics: IntCounter,
    size: IntGauge,
    duration: Histogram,
}

impl PoolMetrics {
    fn new(name: &str) -> Self {
        Self {
            executed: EXEC_TASKS_EXECUTED.with_label_values(&[name]),
            caller_runs: EXEC_CALLER_RUNS.with_label_values(&[name]),
            panics: EXEC_TASK_PANICS.with_label_values(&[name]),
            size: EXEC_POOL_SIZE.with_label_values(&[name]),
            duration: EXEC_TASK_DURATION.with_label_values(&[name]),
        }
    }
}

struct Inner {
    config: PoolConfig,
    state: Mutex<PoolState>,
    work_available: Condvar,
    terminated: Condvar,
    metrics: PoolMetrics,
}

/// Worker pool with pluggable queue admission and caller-run fallback.
pub struct ThreadPool {
    inner: Arc<Inner>,
}

impl ThreadPool {
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        let config = config.normalized();
        debug!(
            pool = %config.name,
            core = config.core_size,
            max = config.max_size,
            admission = ?config.admission,
            "[exec] Pool created"
        );
        Self {
            inner: Arc::new(Inner {
                metrics: PoolMetrics::new(&config.name),
                config,
                state: Mutex::new(PoolState {
                    queue: VecDeque::new(),
                    pool_size: 0,
                    active: 0,
                    largest_pool_size: 0,
                    completed: 0,
                    next_worker: 0,
                    shutdown: false,
                }),
                work_available: Condvar::new(),
                terminated: Condvar::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn core_size(&self) -> usize {
        self.inner.config.core_size
    }

    pub fn max_size(&self) -> usize {
        self.inner.config.max_size
    }

    pub fn pool_size(&self) -> usize {
        self.inner.state.lock().pool_size
    }

    /// Workers currently running a task.
    pub fn active_count(&self) -> usize {
        self.inner.state.lock().active
    }

    /// Tasks waiting for a worker.
    pub fn queue_len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn largest_pool_size(&self) -> usize {
        self.inner.state.lock().largest_pool_size
    }

    pub fn completed_count(&self) -> u64 {
        self.inner.state.lock().completed
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            pool_size: state.pool_size,
            active_count: state.active,
            queue_len: state.queue.len(),
            largest_pool_size: state.largest_pool_size,
            completed_count: state.completed,
        }
    }

    /// Stop accepting work. Queued tasks still run.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        if state.shutdown {
            return;
        }
        state.shutdown = true;
        let (queued, workers) = (state.queue.len(), state.pool_size);
        self.inner.work_available.notify_all();
        if workers == 0 {
            self.inner.terminated.notify_all();
        }
        drop(state);
        info!(pool = %self.name(), queued, workers, "[exec] Pool shutting down");
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.state.lock().shutdown
    }

    /// Shut down and every worker has exited.
    pub fn is_terminated(&self) -> bool {
        let state = self.inner.state.lock();
        state.shutdown && state.pool_size == 0
    }

    /// Block until terminated or `timeout` elapses. Returns whether the pool
    /// terminated.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while !(state.shutdown && state.pool_size == 0) {
            if self
                .inner
                .terminated
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return state.shutdown && state.pool_size == 0;
            }
        }
        true
    }
}

impl Executor for ThreadPool {
    fn execute(&self, task: Task) {
        let inner = &self.inner;
        let config = &inner.config;
        let rejected = {
            let mut state = inner.state.lock();
            if state.shutdown {
                Some(task)
            } else if state.pool_size < config.core_size {
                Inner::add_worker(inner, &mut state, Some(task)).err().flatten()
            } else if config.admission.accepts(&state.load(config)) {
                state.queue.push_back(task);
                if state.pool_size == 0 {
                    match Inner::add_worker(inner, &mut state, None) {
                        Ok(()) => None,
                        Err(_) => state.queue.pop_back(),
                    }
                } else {
                    inner.work_available.notify_one();
                    None
                }
            } else if state.pool_size < config.max_size {
                Inner::add_worker(inner, &mut state, Some(task)).err().flatten()
            } else {
                Some(task)
            }
        };

        if let Some(task) = rejected {
            inner.run_on_caller(task);
        }
    }
}

impl Inner {
    /// Start a worker, optionally with its first task. On spawn failure the
    /// task is handed back.
    fn add_worker(
        this: &Arc<Self>,
        state: &mut PoolState,
        first: Option<Task>,
    ) -> Result<(), Option<Task>> {
        state.next_worker += 1;
        let thread_name = format!("{}-{}", this.config.name, state.next_worker);
        let has_first = first.is_some();

        let slot = Arc::new(Mutex::new(first));
        let worker_slot = Arc::clone(&slot);
        let worker_inner = Arc::clone(this);
        let spawned = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let first = worker_slot.lock().take();
                worker_inner.work(first);
            });

        match spawned {
            Ok(_) => {
                state.pool_size += 1;
                if has_first {
                    state.active += 1;
                }
                state.largest_pool_size = state.largest_pool_size.max(state.pool_size);
                this.metrics.size.set(state.pool_size as i64);
                debug!(thread = %thread_name, pool_size = state.pool_size, "[exec] Worker started");
                Ok(())
            }
            Err(e) => {
                error!(pool = %this.config.name, error = %e, "[exec] Failed to start worker");
                let first = slot.lock().take();
                Err(first)
            }
        }
    }

    fn work(&self, first: Option<Task>) {
        let mut next = first;
        loop {
            let task = match next.take() {
                Some(task) => task,
                None => match self.next_task() {
                    Some(task) => task,
                    None => return,
                },
            };
            self.run(task);
            let mut state = self.state.lock();
            state.active -= 1;
            state.completed += 1;
        }
    }

    /// Wait for queued work. `None` means this worker must exit; the pool
    /// size is already decremented.
    fn next_task(&self) -> Option<Task> {
        let mut state = self.state.lock();
        let mut timed_out = false;
        loop {
            if let Some(task) = state.queue.pop_front() {
                state.active += 1;
                return Some(task);
            }
            let may_retire = self.config.allow_core_timeout || state.pool_size > self.config.core_size;
            if state.shutdown || (may_retire && timed_out) {
                state.pool_size -= 1;
                self.metrics.size.set(state.pool_size as i64);
                if state.pool_size == 0 && state.shutdown {
                    self.terminated.notify_all();
                }
                debug!(pool = %self.config.name, pool_size = state.pool_size, "[exec] Worker exiting");
                return None;
            }
            if may_retire {
                timed_out = self
                    .work_available
                    .wait_for(&mut state, self.config.keep_alive)
                    .timed_out();
            } else {
                self.work_available.wait(&mut state);
            }
        }
    }

    fn run(&self, task: Task) {
        let outcome = {
            let _timer = HistogramTimer::new(&self.metrics.duration);
            panic::catch_unwind(AssertUnwindSafe(task))
        };
        self.metrics.executed.inc();
        if let Err(panic) = outcome {
            self.metrics.panics.inc();
            error!(
                pool = %self.config.name,
                "[exec] Task panicked: {}",
                panic_message(panic.as_ref())
            );
        }
    }

    fn run_on_caller(&self, task: Task) {
        self.metrics.caller_runs.inc();
        debug!(pool = %self.config.name, "[exec] Pool saturated, running task on caller");
        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(task)) {
            self.metrics.panics.inc();
            error!(
                pool = %self.config.name,
                "[exec] Caller-run task panicked: {}",
                panic_message(panic.as_ref())
            );
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Idle workers hold the inner state alive; let them go.
        if Arc::strong_count(&self.inner) > 1 {
            self.shutdown();
        }
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("name", &self.inner.config.name)
            .field("stats", &self.stats())
            .finish()
    }
}
