//! # Kernel Runtime
//!
//! In-process application kernel: a lifecycle state machine that owns
//! configuration, a bean registry with injection, a two-tier adaptive
//! executor and per-key serial queues.
//!
//! ## Modules
//!
//! - `lazy/` - once-only initialization that does not cache failures
//! - `config/` - nine-layer `.properties` cascade with `${}` substitution
//! - `registry/` - named services, capability lookup, `Inject<T>` slots
//! - `exec/` - shared tier, per-service local tiers, serial queues
//! - `wiring/` - per-source event scopes and the lifecycle guard
//! - `kernel/` - the [`Kernel`] tying it all together
//!
//! ## Example
//!
//! ```rust,ignore
//! let kernel = Kernel::builder().property("sys.name", "billing").build();
//! kernel.add("ledger", Arc::new(Ledger::default()));
//! kernel.start()?;
//! // ...
//! kernel.shutdown();
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config;
pub mod error;
pub mod exec;
pub mod kernel;
pub mod lazy;
pub mod registry;
pub mod wiring;

pub use config::{ConfigStore, ConfigStoreBuilder, ProcessProperties};
pub use error::{ConfigError, KernelError, TaskError};
pub use exec::{Executor, SerialQueue, ServiceExecutor, TaskHandle, ThreadPool};
pub use kernel::{Deferred, Kernel, KernelBuilder, Phase, ShutdownHook, ShutdownTrigger};
pub use lazy::LazySingleton;
pub use registry::{BeanRequest, BeanResolver, Exposure, Inject, InjectionPoint, Service};
pub use wiring::EventScope;
