//! # Kernel Telemetry
//!
//! Logging setup and Prometheus metrics shared by the kernel crates.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kernel_telemetry::{init_logging, register_metrics, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! init_logging(&config)?;
//! let _metrics = register_metrics()?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `KERNEL_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `KERNEL_JSON_LOGS` | `false` | JSON formatted output |
//! | `KERNEL_LOG_TARGET` | `true` | Print the event target |
//! | `KERNEL_SERVICE_NAME` | `kernel` | Service name attached to startup logs |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{encode_metrics, register_metrics, MetricsHandle};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}
