//! # Handlers
//!
//! Explicit handler registration. A service lists its handlers once, at
//! registration time:
//!
//! ```rust
//! use kernel_bus::Handler;
//!
//! let h = Handler::on("sys.starting")
//!     .order(1.0)
//!     .asynchronous()
//!     .run(|_ctx| println!("starting"));
//! assert_eq!(h.event(), "sys.starting");
//! ```

use std::fmt;
use std::sync::Arc;

use crate::context::{EventContext, Payload};

pub(crate) type HandlerFn = Arc<dyn Fn(&EventContext) -> Option<Payload> + Send + Sync>;

/// A handler bound to one event name.
#[derive(Clone)]
pub struct Handler {
    pub(crate) event: String,
    pub(crate) order: f32,
    pub(crate) is_async: bool,
    pub(crate) limit: Option<u32>,
    pub(crate) func: HandlerFn,
}

impl Handler {
    /// Start building a handler for `event`.
    pub fn on(event: impl Into<String>) -> HandlerBuilder {
        HandlerBuilder {
            event: event.into(),
            order: 0.0,
            is_async: false,
            limit: None,
        }
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn order(&self) -> f32 {
        self.order
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    pub fn limit(&self) -> Option<u32> {
        self.limit
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("event", &self.event)
            .field("order", &self.order)
            .field("is_async", &self.is_async)
            .field("limit", &self.limit)
            .finish()
    }
}

/// Builder returned by [`Handler::on`].
#[derive(Debug, Clone)]
pub struct HandlerBuilder {
    event: String,
    order: f32,
    is_async: bool,
    limit: Option<u32>,
}

impl HandlerBuilder {
    /// Lower orders run first.
    #[must_use]
    pub fn order(mut self, order: f32) -> Self {
        self.order = order;
        self
    }

    /// Run on the bus spawner instead of the firing thread.
    #[must_use]
    pub fn asynchronous(mut self) -> Self {
        self.is_async = true;
        self
    }

    /// Remove the handler after `times` invocations.
    #[must_use]
    pub fn limit(mut self, times: u32) -> Self {
        self.limit = Some(times);
        self
    }

    /// Finish with a handler that produces no result.
    pub fn run<F>(self, f: F) -> Handler
    where
        F: Fn(&EventContext) + Send + Sync + 'static,
    {
        self.reply(move |ctx| {
            f(ctx);
            None
        })
    }

    /// Finish with a handler that may answer the fire.
    pub fn reply<F>(self, f: F) -> Handler
    where
        F: Fn(&EventContext) -> Option<Payload> + Send + Sync + 'static,
    {
        Handler {
            event: self.event,
            order: self.order,
            is_async: self.is_async,
            limit: self.limit,
            func: Arc::new(f),
        }
    }
}
