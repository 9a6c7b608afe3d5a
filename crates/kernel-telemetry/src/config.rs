//! Telemetry configuration from environment variables.

use std::env;

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name reported at startup
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error) or a full directive
    pub log_level: String,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,

    /// Whether to print the event target
    pub with_target: bool,

    /// Whether to print thread names (useful with named pool threads)
    pub with_thread_names: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "kernel".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            with_target: true,
            with_thread_names: true,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `KERNEL_SERVICE_NAME`: Service name (default: kernel)
    /// - `KERNEL_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `KERNEL_JSON_LOGS`: Enable JSON logs (default: false)
    /// - `KERNEL_LOG_TARGET`: Print targets (default: true)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            service_name: env::var("KERNEL_SERVICE_NAME").unwrap_or(defaults.service_name),

            log_level: env::var("KERNEL_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or(defaults.log_level),

            json_logs: env::var("KERNEL_JSON_LOGS")
                .map(|v| is_truthy(&v))
                .unwrap_or(defaults.json_logs),

            with_target: env::var("KERNEL_LOG_TARGET")
                .map(|v| is_truthy(&v))
                .unwrap_or(defaults.with_target),

            with_thread_names: defaults.with_thread_names,
        }
    }
}

fn is_truthy(v: &str) -> bool {
    matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
