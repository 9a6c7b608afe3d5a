//! # Kernel Runtime
//!
//! Demonstration harness: boots a kernel with two sample services, runs
//! until Ctrl-C, then shuts down.
//!
//! Configuration comes from `-Dkey=value` / `--key=value` arguments plus
//! `app.properties` in the working directory, for example:
//!
//! ```text
//! kernel-runtime -Dsys.name=demo --sys.heartbeat.minInterval=5 --bus.track=sys.heartbeat
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use kernel_bus::{EventContext, EventDispatch, Handler};
use kernel_runtime::{
    EventScope, Executor, Exposure, Inject, InjectionPoint, Kernel, Phase, ProcessProperties,
    Service, ServiceExecutor, ShutdownTrigger,
};
use kernel_telemetry::{encode_metrics, init_logging, register_metrics, TelemetryConfig};
use parking_lot::Mutex;
use tracing::{info, warn};

/// Capability the reporter depends on.
trait Counter: Send + Sync {
    fn bump(&self) -> u64;
}

/// Counts heartbeats.
#[derive(Default)]
struct BeatCounter {
    beats: Mutex<u64>,
}

impl Counter for BeatCounter {
    fn bump(&self) -> u64 {
        let mut beats = self.beats.lock();
        *beats += 1;
        *beats
    }
}

impl Service for BeatCounter {
    fn exposes(self: Arc<Self>, exposure: &mut Exposure) {
        exposure.expose::<Arc<dyn Counter>>(self);
    }
}

/// Logs lifecycle progress and does its heartbeat work off the bus thread.
#[derive(Default)]
struct Reporter {
    counter: Inject<Arc<dyn Counter>>,
    exec: Inject<ServiceExecutor>,
    events: Inject<EventScope>,
}

impl Service for Reporter {
    fn injection_points(&self) -> Vec<InjectionPoint<'_>> {
        vec![
            InjectionPoint::by_type("counter", &self.counter),
            InjectionPoint::by_type("exec", &self.exec),
            InjectionPoint::by_type("events", &self.events),
        ]
    }

    fn handlers(self: Arc<Self>) -> Vec<Handler> {
        let on_started = Arc::clone(&self);
        let on_beat = Arc::clone(&self);
        vec![
            Handler::on("sys.started").run(move |_| {
                if let Some(events) = on_started.events.get() {
                    if let Err(e) = events.fire_simple("reporter.ready") {
                        warn!(error = %e, "[demo] Could not announce readiness");
                    }
                }
            }),
            Handler::on("sys.heartbeat").run(move |_| {
                let (Some(counter), Some(exec)) = (on_beat.counter.get(), on_beat.exec.get()) else {
                    return;
                };
                let counter = Arc::clone(counter);
                exec.execute(Box::new(move || {
                    info!(beats = counter.bump(), "[demo] Heartbeat");
                }));
            }),
            Handler::on("sys.stopping").run(|_| info!("[demo] Reporter stopping")),
        ]
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(&TelemetryConfig::from_env()).context("Failed to initialize logging")?;
    let _metrics = register_metrics().context("Failed to register metrics")?;

    let runtime = tokio::runtime::Handle::current();
    let kernel = Kernel::builder()
        .properties(ProcessProperties::from_env_args())
        .shutdown_hook(move |trigger: ShutdownTrigger| {
            runtime.spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    let _ = tokio::task::spawn_blocking(trigger).await;
                }
            });
        })
        .build();

    kernel
        .add("counter", Arc::new(BeatCounter::default()))
        .add("reporter", Arc::new(Reporter::default()));

    kernel
        .dispatcher()
        .listen(kernel.source(), Handler::on("reporter.ready").run(|ctx: &EventContext| {
            info!(source = ?ctx.source(), "[demo] Reporter is ready");
        }));

    kernel.start().context("Kernel failed to start")?;
    info!(name = %kernel.name(), id = %kernel.id(), "[demo] Running. Press Ctrl+C to stop.");

    let waiting = Arc::clone(&kernel);
    tokio::task::spawn_blocking(move || waiting.wait_for(Phase::Stopping, Duration::MAX))
        .await
        .context("Shutdown waiter failed")??;

    if !kernel.shared_pool().await_termination(Duration::from_secs(30)) {
        warn!("[demo] Shared tier still busy after 30s");
    }
    match encode_metrics() {
        Ok(text) => info!("[demo] Final metrics\n{text}"),
        Err(e) => warn!(error = %e, "[demo] Could not encode metrics"),
    }
    Ok(())
}
