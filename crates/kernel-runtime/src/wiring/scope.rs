//! Per-source view over the shared dispatcher.

use std::fmt;
use std::sync::Arc;

use kernel_bus::{DispatchError, EventContext, EventDispatch, Handler, Payload, SourceId};

/// What a service gets when it asks for the dispatcher.
#[derive(Clone)]
pub struct EventScope {
    source: SourceId,
    dispatch: Arc<dyn EventDispatch>,
}

impl EventScope {
    pub fn new(source: SourceId, dispatch: Arc<dyn EventDispatch>) -> Self {
        Self { source, dispatch }
    }

    /// Source stamped on fires from this scope.
    pub fn source(&self) -> &SourceId {
        &self.source
    }

    /// Fire with no arguments.
    pub fn fire_simple(&self, event: &str) -> Result<Option<Payload>, DispatchError> {
        self.fire(event, EventContext::new())
    }
}

impl EventDispatch for EventScope {
    fn fire(&self, event: &str, ctx: EventContext) -> Result<Option<Payload>, DispatchError> {
        let ctx = if ctx.source().is_none() {
            ctx.with_source(self.source.clone())
        } else {
            ctx
        };
        self.dispatch.fire(event, ctx)
    }

    fn listen(&self, source: &SourceId, handler: Handler) {
        self.dispatch.listen(source, handler);
    }

    /// Only this scope's own handlers may be removed. `None` means "mine".
    fn remove_event(&self, event: &str, source: Option<&SourceId>) -> Result<(), DispatchError> {
        match source {
            Some(other) if other != &self.source => {
                Err(DispatchError::permission("remove", event, Some(&self.source)))
            }
            _ => self.dispatch.remove_event(event, Some(&self.source)),
        }
    }

    fn exists(&self, event: &str) -> bool {
        self.dispatch.exists(event)
    }

    fn add_track_event(&self, event: &str) {
        self.dispatch.add_track_event(event);
    }

    fn del_track_event(&self, event: &str) {
        self.dispatch.del_track_event(event);
    }
}

impl fmt::Debug for EventScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventScope")
            .field("source", &self.source)
            .finish()
    }
}
