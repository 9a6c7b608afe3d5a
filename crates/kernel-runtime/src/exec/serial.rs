//! Per-key serial queue.
//!
//! Tasks offered to one queue run one at a time, in offer order, on the
//! backing executor. Each finished task schedules the next one, so a busy
//! key never pins a worker for its whole backlog.
//!
//! When the executor runs that hand-off on the current thread (saturated or
//! shut down) the drain loop picks the next task up itself instead of
//! nesting another `run_next` frame.

use std::cell::Cell;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use kernel_bus::bus::panic_message;
use kernel_telemetry::metrics::SERIAL_TASKS;
use parking_lot::Mutex;
use tracing::error;

use super::{Executor, Task};

thread_local! {
    /// Queue this thread is draining, by address.
    static DRAINING: Cell<Option<usize>> = const { Cell::new(None) };
    /// Set when a hand-off for the draining queue came back inline.
    static RESUMED: Cell<bool> = const { Cell::new(false) };
}

struct SerialState {
    pending: VecDeque<Task>,
    running: bool,
}

struct SerialInner {
    name: String,
    executor: Arc<dyn Executor>,
    state: Mutex<SerialState>,
}

/// FIFO executor for one key.
#[derive(Clone)]
pub struct SerialQueue {
    inner: Arc<SerialInner>,
}

impl SerialQueue {
    pub fn new(name: impl Into<String>, executor: Arc<dyn Executor>) -> Self {
        Self {
            inner: Arc::new(SerialInner {
                name: name.into(),
                executor,
                state: Mutex::new(SerialState {
                    pending: VecDeque::new(),
                    running: false,
                }),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Append `task`; it runs after everything offered before it.
    pub fn offer(&self, task: Task) -> &Self {
        let start = {
            let mut state = self.inner.state.lock();
            state.pending.push_back(task);
            !std::mem::replace(&mut state.running, true)
        };
        if start {
            SerialInner::schedule(&self.inner);
        }
        self
    }

    /// Tasks waiting, not counting the one running.
    pub fn pending(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.lock().running
    }
}

impl SerialInner {
    fn schedule(this: &Arc<Self>) {
        let inner = Arc::clone(this);
        this.executor.execute(Box::new(move || inner.run_next()));
    }

    fn run_next(self: Arc<Self>) {
        let me = Arc::as_ptr(&self) as usize;
        if DRAINING.with(Cell::get) == Some(me) {
            RESUMED.with(|resumed| resumed.set(true));
            return;
        }
        let outer = DRAINING.with(|d| d.replace(Some(me)));
        let outer_resumed = RESUMED.with(|r| r.replace(false));

        while let Some(task) = self.next_task() {
            SERIAL_TASKS.inc();
            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(task)) {
                error!(
                    queue = %self.name,
                    "[exec] Serial task panicked: {}",
                    panic_message(panic.as_ref())
                );
            }

            if !self.has_pending() {
                break;
            }
            RESUMED.with(|r| r.set(false));
            Self::schedule(&self);
            if !RESUMED.with(Cell::get) {
                // a worker owns the rest of the backlog now
                break;
            }
        }

        DRAINING.with(|d| d.set(outer));
        RESUMED.with(|r| r.set(outer_resumed));
    }

    /// Pop the next task, or mark the queue idle.
    fn next_task(&self) -> Option<Task> {
        let mut state = self.state.lock();
        let task = state.pending.pop_front();
        if task.is_none() {
            state.running = false;
        }
        task
    }

    /// Whether more work waits; marks the queue idle when not.
    fn has_pending(&self) -> bool {
        let mut state = self.state.lock();
        if state.pending.is_empty() {
            state.running = false;
            false
        } else {
            true
        }
    }
}

impl fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("SerialQueue")
            .field("name", &self.inner.name)
            .field("pending", &state.pending.len())
            .field("running", &state.running)
            .finish()
    }
}
