//! # Executors
//!
//! Two-tier execution for service work.
//!
//! ```text
//!                      ┌─────────────────────────┐
//!   service ──► view ──┤ shared tier "sys-N"     │  bounded queue, queue first
//!               │      └─────────────────────────┘
//!               │      ┌─────────────────────────┐
//!               └──────┤ local tier "<svc>-N"    │  threshold gate, grow first
//!                      └─────────────────────────┘
//! ```
//!
//! A [`ServiceExecutor`] view picks a tier per submission. [`SerialQueue`]
//! runs one key's tasks strictly in order on top of the shared tier.

mod adaptive;
pub mod admission;
mod pool;
mod serial;

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};

use kernel_bus::bus::panic_message;
use tokio::sync::oneshot;

pub use adaptive::{LocalTier, ServiceExecutor};
pub use admission::Admission;
pub use kernel_bus::Task;
pub use pool::{PoolConfig, PoolStats, ThreadPool};
pub use serial::SerialQueue;

use crate::error::TaskError;

/// Something that runs tasks.
pub trait Executor: Send + Sync {
    /// Run `task` eventually. Never drops it.
    fn execute(&self, task: Task);

    /// Run `f` and hand back its result.
    fn submit<R, F>(&self, f: F) -> TaskHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
        Self: Sized,
    {
        let (task, handle) = TaskHandle::wrap(f);
        self.execute(task);
        handle
    }
}

/// Result of a submitted task.
///
/// Either block with [`join`](Self::join) or `.await` it.
#[derive(Debug)]
pub struct TaskHandle<R> {
    rx: oneshot::Receiver<Result<R, TaskError>>,
}

impl<R: Send + 'static> TaskHandle<R> {
    fn wrap<F>(f: F) -> (Task, Self)
    where
        F: FnOnce() -> R + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let task: Task = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(f))
                .map_err(|panic| TaskError::Panicked(panic_message(panic.as_ref())));
            let _ = tx.send(outcome);
        });
        (task, Self { rx })
    }
}

impl<R> TaskHandle<R> {
    /// Block the current thread until the task finished.
    ///
    /// Must not be called from inside an async runtime; `.await` there.
    pub fn join(self) -> Result<R, TaskError> {
        self.rx.blocking_recv().unwrap_or(Err(TaskError::Lost))
    }
}

impl<R> Future for TaskHandle<R> {
    type Output = Result<R, TaskError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(TaskError::Lost)))
    }
}
