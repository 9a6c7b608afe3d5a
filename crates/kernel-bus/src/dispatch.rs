//! # Dispatch Contract
//!
//! The operations the kernel needs from an event dispatcher. Anything that
//! can fire, listen and order handlers can stand behind this trait.

use thiserror::Error;

use crate::context::{EventContext, Payload};
use crate::handler::Handler;
use crate::source::SourceId;

/// Errors surfaced synchronously to the caller of a dispatch operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The caller is not allowed to perform this operation.
    #[error("Source '{source_label}' is not allowed to {action} event '{event}'")]
    Permission {
        action: &'static str,
        event: String,
        source_label: String,
    },
}

impl DispatchError {
    pub fn permission(action: &'static str, event: &str, source: Option<&SourceId>) -> Self {
        Self::Permission {
            action,
            event: event.to_string(),
            source_label: source.map_or_else(|| "<none>".to_string(), |s| s.label().to_string()),
        }
    }
}

/// Event dispatcher used by the kernel and every service scope.
pub trait EventDispatch: Send + Sync {
    /// Fire `event`. Returns the first result produced by a synchronous
    /// handler, if any.
    fn fire(&self, event: &str, ctx: EventContext) -> Result<Option<Payload>, DispatchError>;

    /// Register one handler owned by `source`.
    fn listen(&self, source: &SourceId, handler: Handler);

    /// Register every handler a source declares.
    fn add_listener_source(&self, source: &SourceId, handlers: Vec<Handler>) {
        for handler in handlers {
            self.listen(source, handler);
        }
    }

    /// Remove handlers of `event`; only those owned by `source` when given.
    fn remove_event(&self, event: &str, source: Option<&SourceId>) -> Result<(), DispatchError>;

    /// Whether any handler listens to `event`.
    fn exists(&self, event: &str) -> bool;

    /// Log every fire of `event`.
    fn add_track_event(&self, event: &str);

    /// Stop logging fires of `event`.
    fn del_track_event(&self, event: &str);
}
