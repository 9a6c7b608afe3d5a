//! Lifecycle phases.

use std::fmt;
use std::time::{Duration, Instant};

use kernel_telemetry::metrics::LIFECYCLE_PHASE;
use parking_lot::{Condvar, Mutex};
use tracing::debug;

/// Kernel phases, in the only order they can occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Inited,
    Starting,
    Started,
    Stopping,
}

impl Phase {
    /// Event fired when the phase is entered.
    pub fn event(&self) -> &'static str {
        match self {
            Self::Inited => "sys.inited",
            Self::Starting => "sys.starting",
            Self::Started => "sys.started",
            Self::Stopping => "sys.stopping",
        }
    }

    fn gauge_value(self) -> i64 {
        match self {
            Self::Inited => 0,
            Self::Starting => 1,
            Self::Started => 2,
            Self::Stopping => 3,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Inited => "inited",
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Current phase plus a way to wait for a later one.
#[derive(Default)]
pub(crate) struct Lifecycle {
    phase: Mutex<Option<Phase>>,
    changed: Condvar,
}

impl Lifecycle {
    pub(crate) fn current(&self) -> Option<Phase> {
        *self.phase.lock()
    }

    /// Enter `Inited`. Fails with the current phase if already past it.
    pub(crate) fn begin(&self) -> Result<(), Phase> {
        let mut phase = self.phase.lock();
        if let Some(current) = *phase {
            return Err(current);
        }
        *phase = Some(Phase::Inited);
        LIFECYCLE_PHASE.set(Phase::Inited.gauge_value());
        self.changed.notify_all();
        Ok(())
    }

    /// Move forward to `to`. Never moves backwards.
    pub(crate) fn advance(&self, to: Phase) -> bool {
        let mut phase = self.phase.lock();
        if phase.is_some_and(|current| current >= to) {
            return false;
        }
        debug!(from = ?*phase, to = %to, "[kernel] Phase change");
        *phase = Some(to);
        LIFECYCLE_PHASE.set(to.gauge_value());
        self.changed.notify_all();
        true
    }

    /// Block until `wanted` (or a later phase) was reached.
    pub(crate) fn wait_for(&self, wanted: Phase, timeout: Duration) -> bool {
        let reached = |phase: &Option<Phase>| phase.is_some_and(|current| current >= wanted);
        let deadline = Instant::now().checked_add(timeout);
        let mut phase = self.phase.lock();
        while !reached(&phase) {
            match deadline {
                Some(deadline) => {
                    if self.changed.wait_until(&mut phase, deadline).timed_out() {
                        return reached(&phase);
                    }
                }
                None => self.changed.wait(&mut phase),
            }
        }
        true
    }
}
