//! # Configuration
//!
//! Cascading `.properties` loader with bounded `${name}` substitution.
//!
//! ```text
//!   process props ─┐
//!   bundled files ─┤
//!   ./ files      ─┼─► merge ─► override hook ─► ${} (≤3 passes) ─► process props ─► ConfigStore
//!   configdir     ─┘
//! ```
//!
//! The resulting [`ConfigStore`] is immutable; readers share one snapshot.

pub mod placeholder;
pub mod properties;
mod store;

pub use store::{ConfigStore, ConfigStoreBuilder, Environment, FromConfig, ProcessProperties};
