//! Sender authorization for lifecycle events.

use std::sync::Arc;

use kernel_bus::{DispatchError, EventContext, EventDispatch, Handler, Payload, SourceId};
use kernel_telemetry::metrics::EVENTS_FIRED;
use tracing::warn;

/// Events only the kernel may fire.
pub const RESERVED_PHASES: [&str; 4] = ["sys.inited", "sys.starting", "sys.started", "sys.stopping"];

/// Dispatcher wrapper that owns the lifecycle event names.
pub struct PhaseGuard {
    owner: SourceId,
    inner: Arc<dyn EventDispatch>,
}

impl PhaseGuard {
    pub fn new(owner: SourceId, inner: Arc<dyn EventDispatch>) -> Self {
        Self { owner, inner }
    }

    pub fn is_reserved(event: &str) -> bool {
        RESERVED_PHASES.contains(&event)
    }

    /// The wrapped dispatcher.
    pub fn inner(&self) -> &Arc<dyn EventDispatch> {
        &self.inner
    }
}

impl EventDispatch for PhaseGuard {
    fn fire(&self, event: &str, ctx: EventContext) -> Result<Option<Payload>, DispatchError> {
        if Self::is_reserved(event) && ctx.source() != Some(&self.owner) {
            warn!(event, source = ?ctx.source(), "[wiring] Rejected lifecycle event from foreign source");
            return Err(DispatchError::permission("fire", event, ctx.source()));
        }
        EVENTS_FIRED.inc();
        self.inner.fire(event, ctx)
    }

    fn listen(&self, source: &SourceId, handler: Handler) {
        self.inner.listen(source, handler);
    }

    fn remove_event(&self, event: &str, source: Option<&SourceId>) -> Result<(), DispatchError> {
        self.inner.remove_event(event, source)
    }

    fn exists(&self, event: &str) -> bool {
        self.inner.exists(event)
    }

    fn add_track_event(&self, event: &str) {
        self.inner.add_track_event(event);
    }

    fn del_track_event(&self, event: &str) {
        self.inner.del_track_event(event);
    }
}
