//! Prometheus metrics for the kernel.
//!
//! All metrics follow the naming convention: `kernel_<area>_<metric>_<unit>`
//!
//! Pool labelled metrics use the pool name: `sys` for the shared tier and the
//! service name for a local tier.

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter,
    IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // EXECUTOR METRICS
    // =========================================================================

    /// Tasks completed by a pool worker
    pub static ref EXEC_TASKS_EXECUTED: IntCounterVec = IntCounterVec::new(
        Opts::new("kernel_exec_tasks_executed_total", "Tasks run by pool workers"),
        &["pool"]
    ).expect("metric creation failed");

    /// Tasks that ran on the submitting thread because the pool was saturated
    pub static ref EXEC_CALLER_RUNS: IntCounterVec = IntCounterVec::new(
        Opts::new("kernel_exec_caller_runs_total", "Tasks run on the submitting thread"),
        &["pool"]
    ).expect("metric creation failed");

    /// Tasks that panicked
    pub static ref EXEC_TASK_PANICS: IntCounterVec = IntCounterVec::new(
        Opts::new("kernel_exec_task_panics_total", "Tasks that panicked"),
        &["pool"]
    ).expect("metric creation failed");

    /// Live worker threads per pool
    pub static ref EXEC_POOL_SIZE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("kernel_exec_pool_size", "Live worker threads"),
        &["pool"]
    ).expect("metric creation failed");

    /// Submissions routed by a service executor view
    pub static ref EXEC_ROUTED: IntCounterVec = IntCounterVec::new(
        Opts::new("kernel_exec_routed_total", "Service submissions by chosen tier"),
        &["tier"]  // tier: shared/local
    ).expect("metric creation failed");

    /// Time a task spent running on a worker
    pub static ref EXEC_TASK_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "kernel_exec_task_duration_seconds",
            "Time spent running a task"
        ).buckets(exponential_buckets(0.0001, 4.0, 10).expect("valid buckets")),
        &["pool"]
    ).expect("metric creation failed");

    /// Tasks run through per-key serial queues
    pub static ref SERIAL_TASKS: IntCounter = IntCounter::new(
        "kernel_serial_tasks_total",
        "Tasks run through per-key serial queues"
    ).expect("metric creation failed");

    // =========================================================================
    // LIFECYCLE METRICS
    // =========================================================================

    /// Current lifecycle phase (0 inited, 1 starting, 2 started, 3 stopping)
    pub static ref LIFECYCLE_PHASE: IntGauge = IntGauge::new(
        "kernel_lifecycle_phase",
        "Current lifecycle phase"
    ).expect("metric creation failed");

    /// Time from the start call until the started phase
    pub static ref STARTUP_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "kernel_startup_duration_seconds",
            "Time spent starting the kernel"
        ).buckets(exponential_buckets(0.001, 2.0, 15).expect("valid buckets"))
    ).expect("metric creation failed");

    /// Heartbeats fired
    pub static ref HEARTBEATS: IntCounter = IntCounter::new(
        "kernel_heartbeats_total",
        "Heartbeat events fired"
    ).expect("metric creation failed");

    /// Services held by the registry
    pub static ref SERVICES_REGISTERED: IntGauge = IntGauge::new(
        "kernel_registry_services",
        "Services held by the bean registry"
    ).expect("metric creation failed");

    // =========================================================================
    // EVENT METRICS
    // =========================================================================

    /// Events fired through the kernel
    pub static ref EVENTS_FIRED: IntCounter = IntCounter::new(
        "kernel_events_fired_total",
        "Events fired through the kernel"
    ).expect("metric creation failed");
}

/// Handle to the registered metrics.
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry.
///
/// Calling this more than once is harmless.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Executor
        Box::new(EXEC_TASKS_EXECUTED.clone()),
        Box::new(EXEC_CALLER_RUNS.clone()),
        Box::new(EXEC_TASK_PANICS.clone()),
        Box::new(EXEC_POOL_SIZE.clone()),
        Box::new(EXEC_ROUTED.clone()),
        Box::new(EXEC_TASK_DURATION.clone()),
        Box::new(SERIAL_TASKS.clone()),
        // Lifecycle
        Box::new(LIFECYCLE_PHASE.clone()),
        Box::new(STARTUP_DURATION.clone()),
        Box::new(HEARTBEATS.clone()),
        Box::new(SERVICES_REGISTERED.clone()),
        // Events
        Box::new(EVENTS_FIRED.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}
