//! # Event Context
//!
//! Carries the source, positional arguments, the first handler result and an
//! optional completion callback through one fire.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::source::SourceId;

/// Type-erased value passed as an argument or returned by a handler.
pub type Payload = Arc<dyn Any + Send + Sync>;

type Completion = Box<dyn FnOnce(&EventContext) + Send + 'static>;

/// Per-fire context shared by every handler of that fire.
pub struct EventContext {
    source: Option<SourceId>,
    args: Vec<Payload>,
    force_sync: bool,
    result: Mutex<Option<Payload>>,
    completion: Mutex<Option<Completion>>,
}

impl EventContext {
    /// Empty context: no source, no arguments.
    #[must_use]
    pub fn new() -> Self {
        Self {
            source: None,
            args: Vec::new(),
            force_sync: false,
            result: Mutex::new(None),
            completion: Mutex::new(None),
        }
    }

    /// Context attributed to `source`.
    #[must_use]
    pub fn of(source: &SourceId) -> Self {
        Self::new().with_source(source.clone())
    }

    /// Set the source.
    #[must_use]
    pub fn with_source(mut self, source: SourceId) -> Self {
        self.source = Some(source);
        self
    }

    /// Append a positional argument.
    #[must_use]
    pub fn arg<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.args.push(Arc::new(value));
        self
    }

    /// Append an already type-erased argument.
    #[must_use]
    pub fn payload(mut self, value: Payload) -> Self {
        self.args.push(value);
        self
    }

    /// Run every handler on the firing thread, ignoring their async flag.
    #[must_use]
    pub fn sync(mut self) -> Self {
        self.force_sync = true;
        self
    }

    /// Callback invoked once after every handler has returned.
    #[must_use]
    pub fn on_complete<F>(self, f: F) -> Self
    where
        F: FnOnce(&EventContext) + Send + 'static,
    {
        *self.completion.lock() = Some(Box::new(f));
        self
    }

    pub fn source(&self) -> Option<&SourceId> {
        self.source.as_ref()
    }

    pub fn args(&self) -> &[Payload] {
        &self.args
    }

    /// Downcast the argument at `index`.
    pub fn arg_as<T: Any>(&self, index: usize) -> Option<&T> {
        self.args.get(index).and_then(|a| a.downcast_ref::<T>())
    }

    pub fn is_sync_forced(&self) -> bool {
        self.force_sync
    }

    /// First non-empty handler result so far.
    pub fn result(&self) -> Option<Payload> {
        self.result.lock().clone()
    }

    /// Downcast the current result.
    pub fn result_as<T: Any + Clone>(&self) -> Option<T> {
        self.result
            .lock()
            .as_ref()
            .and_then(|r| r.downcast_ref::<T>())
            .cloned()
    }

    /// Record `value` unless a result is already present.
    pub fn offer_result(&self, value: Payload) {
        let mut slot = self.result.lock();
        if slot.is_none() {
            *slot = Some(value);
        }
    }

    pub(crate) fn take_completion(&self) -> Option<Completion> {
        self.completion.lock().take()
    }
}

impl Default for EventContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventContext")
            .field("source", &self.source)
            .field("args", &self.args.len())
            .field("force_sync", &self.force_sync)
            .field("has_result", &self.result.lock().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_downcast() {
        let ctx = EventContext::new().arg(7u32).arg("name".to_string());
        assert_eq!(ctx.arg_as::<u32>(0), Some(&7));
        assert_eq!(ctx.arg_as::<String>(1).map(String::as_str), Some("name"));
        assert!(ctx.arg_as::<u64>(0).is_none());
        assert!(ctx.arg_as::<u32>(5).is_none());
    }

    #[test]
    fn test_first_result_wins() {
        let ctx = EventContext::new();
        ctx.offer_result(Arc::new(1i32));
        ctx.offer_result(Arc::new(2i32));
        assert_eq!(ctx.result_as::<i32>(), Some(1));
    }
}
