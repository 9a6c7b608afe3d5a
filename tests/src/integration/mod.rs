//! Integration flows, one file per concern.

pub mod config_flow;
pub mod executors;
pub mod lifecycle;
pub mod telemetry;
pub mod wiring;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use kernel_runtime::{ConfigStore, Kernel};

/// Kernel that ignores the working directory.
pub fn isolated_kernel() -> Arc<Kernel> {
    isolated_kernel_with(&[])
}

/// Isolated kernel with extra process properties.
pub fn isolated_kernel_with(props: &[(&str, &str)]) -> Arc<Kernel> {
    let mut config = ConfigStore::builder().without_working_dir();
    for (key, value) in props {
        config = config.property(*key, *value);
    }
    Kernel::builder().config(config).build()
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
