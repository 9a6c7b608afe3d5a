//! # Telemetry Flows
//!
//! Metrics a kernel run leaves behind in the Prometheus registry.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use kernel_runtime::{Executor, Phase};
    use kernel_telemetry::metrics::{encode_metrics, register_metrics, HEARTBEATS};

    use crate::integration::{eventually, isolated_kernel};

    #[test]
    fn test_kernel_run_shows_up_in_encoded_metrics() {
        register_metrics().unwrap();
        // registering twice is harmless
        register_metrics().unwrap();

        let kernel = isolated_kernel();
        kernel.start().unwrap();
        kernel
            .wait_for(Phase::Started, Duration::from_secs(5))
            .unwrap();
        assert!(eventually(Duration::from_secs(2), || HEARTBEATS.get() >= 1));
        assert_eq!(kernel.executor_for(None).submit(|| 21 * 2).join(), Ok(42));
        kernel.shutdown();

        let text = encode_metrics().unwrap();
        for name in [
            "kernel_heartbeats_total",
            "kernel_exec_pool_size{pool=\"sys\"}",
            "kernel_exec_tasks_executed_total{pool=\"sys\"}",
            "kernel_lifecycle_phase",
            "kernel_events_fired_total",
            "kernel_startup_duration_seconds_count",
        ] {
            assert!(text.contains(name), "missing {name} in:\n{text}");
        }
    }
}
