//! # Kernel Bus - Event Dispatch Contract
//!
//! The kernel treats event delivery as a collaborator. This crate defines the
//! contract the kernel talks to ([`EventDispatch`]) and ships a small
//! in-process implementation ([`InMemoryEventBus`]) so that kernels and their
//! services can run without an external dispatcher.
//!
//! ## Delivery Model
//!
//! ```text
//! ┌──────────────┐   fire("sys.starting")   ┌──────────────────┐
//! │   Kernel     │ ───────────────────────→ │   EventDispatch  │
//! └──────────────┘                          │                  │
//!                                           │ order -1  sync   │──→ handler A
//!                                           │ order  0  async  │──→ handler B (spawner)
//!                                           │ order  1  sync   │──→ handler C
//!                                           └────────┬─────────┘
//!                                                    │ last handler done
//!                                                    ▼
//!                                            completion callback
//! ```
//!
//! - Handlers run in ascending `order`; equal orders keep registration order.
//! - A context may force every handler to run synchronously.
//! - The completion callback runs exactly once, after every handler returned.
//! - Handler panics are logged and isolated; they never abort a fire.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod bus;
pub mod context;
pub mod dispatch;
pub mod handler;
pub mod source;

pub use bus::{InMemoryEventBus, Spawner, ThreadSpawner};
pub use context::{EventContext, Payload};
pub use dispatch::{DispatchError, EventDispatch};
pub use handler::{Handler, HandlerBuilder};
pub use source::SourceId;

/// Task type handed to a [`Spawner`] for asynchronous handlers.
pub type Task = Box<dyn FnOnce() + Send + 'static>;
