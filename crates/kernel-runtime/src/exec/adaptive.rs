//! Service-scoped executor view.
//!
//! Routing rule, evaluated on every submission:
//!
//! ```text
//!   shared.active >= shared.core  &&  shared.queued >= local.queued
//!       true  ──► local tier (created on first need)
//!       false ──► shared tier
//! ```
//!
//! No affinity: consecutive submissions may land on different tiers.

use std::fmt;
use std::sync::Arc;

use kernel_telemetry::metrics::EXEC_ROUTED;
use tracing::debug;

use super::{Executor, Task, ThreadPool};
use crate::lazy::LazySingleton;

/// Lazily created overflow pool of one service.
pub type LocalTier = Arc<LazySingleton<Arc<ThreadPool>>>;

/// Executor handed to a service. Does not own the shared tier.
#[derive(Clone)]
pub struct ServiceExecutor {
    owner: Option<Arc<str>>,
    shared: Arc<ThreadPool>,
    local: Option<LocalTier>,
}

impl ServiceExecutor {
    /// View for service `owner` with its own overflow tier.
    pub fn new(owner: impl Into<Arc<str>>, shared: Arc<ThreadPool>, local: LocalTier) -> Self {
        Self {
            owner: Some(owner.into()),
            shared,
            local: Some(local),
        }
    }

    /// View for an anonymous caller; always uses the shared tier.
    pub fn shared_only(shared: Arc<ThreadPool>) -> Self {
        Self {
            owner: None,
            shared,
            local: None,
        }
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn shared(&self) -> &Arc<ThreadPool> {
        &self.shared
    }

    /// The local tier, if it was ever needed.
    pub fn local(&self) -> Option<&Arc<ThreadPool>> {
        self.local.as_ref().and_then(|tier| tier.peek())
    }

    /// Tier the next submission would go to.
    pub fn route(&self) -> &Arc<ThreadPool> {
        if let Some(tier) = &self.local {
            if self.shared.active_count() >= self.shared.core_size() {
                let local = tier.get();
                if self.shared.queue_len() >= local.queue_len() {
                    return local;
                }
            }
        }
        &self.shared
    }

    /// Views never shut pools down; the kernel does.
    pub fn shutdown(&self) {
        debug!(owner = ?self.owner, "[exec] Ignoring shutdown on service executor view");
    }
}

impl Executor for ServiceExecutor {
    fn execute(&self, task: Task) {
        let target = self.route();
        let tier = if Arc::ptr_eq(target, &self.shared) {
            "shared"
        } else {
            "local"
        };
        EXEC_ROUTED.with_label_values(&[tier]).inc();
        target.execute(task);
    }
}

impl fmt::Debug for ServiceExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceExecutor")
            .field("owner", &self.owner)
            .field("shared", &self.shared.name())
            .field("local_created", &self.local().is_some())
            .finish()
    }
}
