//! Heartbeat scheduling.
//!
//! The next beat is handed to whoever listens to `sched.after` as a
//! `(Duration, Arc<Deferred>)` pair. Without such a listener the kernel's
//! own single-thread [`Timer`] runs it.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use kernel_bus::bus::panic_message;
use kernel_bus::Task;
use parking_lot::{Condvar, Mutex, MutexGuard};
use rand::Rng;
use tracing::{debug, error};

/// Event a scheduler listens to for delayed work.
pub const SCHED_AFTER: &str = "sched.after";

/// Longest delay the kernel schedules: one year.
pub const MAX_DELAY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Delay before the next beat: `min` plus up to `random` (exclusive) seconds,
/// capped at [`MAX_DELAY`].
pub fn next_delay(min_secs: u64, random_secs: u64) -> Duration {
    let jitter = if random_secs == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..random_secs)
    };
    Duration::from_secs(min_secs.saturating_add(jitter)).min(MAX_DELAY)
}

/// A task handed to a scheduler; runs at most once.
pub struct Deferred {
    task: Mutex<Option<Task>>,
}

impl Deferred {
    pub fn new(task: Task) -> Self {
        Self {
            task: Mutex::new(Some(task)),
        }
    }

    /// Run the task. `false` if it already ran.
    pub fn run(&self) -> bool {
        let task = self.task.lock().take();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("pending", &self.task.lock().is_some())
            .finish()
    }
}

#[derive(Default)]
struct TimerState {
    next: Option<(Instant, Task)>,
    running: bool,
    stopped: bool,
}

#[derive(Default)]
struct TimerShared {
    state: Mutex<TimerState>,
    wake: Condvar,
}

/// Single pending task, single thread. Scheduling replaces what was pending.
#[derive(Default)]
pub struct Timer {
    shared: Arc<TimerShared>,
}

impl Timer {
    /// Run `task` after `delay`. `false` once stopped.
    pub fn schedule(&self, delay: Duration, task: Task) -> bool {
        let mut state = self.shared.state.lock();
        if state.stopped {
            return false;
        }
        let Some(due) = Instant::now().checked_add(delay.min(MAX_DELAY)) else {
            error!(?delay, "[kernel] Timer delay out of range");
            return false;
        };
        state.next = Some((due, task));
        if !state.running {
            let shared = Arc::clone(&self.shared);
            let spawned = thread::Builder::new()
                .name("kernel-timer".to_string())
                .spawn(move || shared.run());
            match spawned {
                Ok(_) => state.running = true,
                Err(e) => {
                    error!(error = %e, "[kernel] Failed to start timer thread");
                    state.next = None;
                    return false;
                }
            }
        }
        self.shared.wake.notify_all();
        true
    }

    /// Drop the pending task and let the thread exit.
    pub fn stop(&self) {
        let mut state = self.shared.state.lock();
        state.stopped = true;
        state.next = None;
        self.shared.wake.notify_all();
    }

    pub fn is_pending(&self) -> bool {
        self.shared.state.lock().next.is_some()
    }
}

impl TimerShared {
    fn run(&self) {
        let mut state = self.state.lock();
        loop {
            if state.stopped {
                state.running = false;
                debug!("[kernel] Timer thread exiting");
                return;
            }
            let due = match &state.next {
                Some((at, _)) => *at,
                None => {
                    self.wake.wait(&mut state);
                    continue;
                }
            };
            if Instant::now() < due {
                self.wake.wait_until(&mut state, due);
                continue;
            }
            if let Some((_, task)) = state.next.take() {
                MutexGuard::unlocked(&mut state, || {
                    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(task)) {
                        error!("[kernel] Timer task panicked: {}", panic_message(panic.as_ref()));
                    }
                });
            }
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Heartbeat switch plus its fallback timer.
#[derive(Default)]
pub(crate) struct Heartbeat {
    stopped: AtomicBool,
    timer: Timer,
}

impl Heartbeat {
    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub(crate) fn schedule(&self, delay: Duration, task: Task) {
        if !self.is_stopped() {
            self.timer.schedule(delay, task);
        }
    }

    pub(crate) fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.timer.stop();
    }
}
