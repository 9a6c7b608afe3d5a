//! # Event Wiring
//!
//! How services reach the shared dispatcher.
//!
//! ```text
//!   service A ──► EventScope(A) ──┐
//!   service B ──► EventScope(B) ──┼──► PhaseGuard ──► dispatcher
//!   kernel    ────────────────────┘     │
//!                                       └─ sys.inited / sys.starting /
//!                                          sys.started / sys.stopping
//!                                          only from the kernel source
//! ```
//!
//! A scope stamps its owner on every fire and may only remove its owner's
//! handlers. The guard rejects lifecycle phases fired by anyone else.

mod guard;
mod scope;

pub use guard::{PhaseGuard, RESERVED_PHASES};
pub use scope::EventScope;
