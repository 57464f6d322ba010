use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless. Workers that should log elsewhere
/// take an injected dispatcher through
/// [`WorkerConfigBuilder::log_dispatch`](crate::WorkerConfigBuilder::log_dispatch).
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Rolling counters describing what a worker has done so far.
#[derive(Default, Debug)]
pub struct Telemetry {
    step_faults: AtomicU64,
    teardown_faults: AtomicU64,
    dispatched: AtomicU64,
    dispatch_failures: AtomicU64,
    callbacks: AtomicU64,
}

impl Telemetry {
    pub fn record_step_fault(&self) {
        self.step_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_teardown_fault(&self) {
        self.teardown_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch(&self, succeeded: bool) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_callback(&self) {
        self.callbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            step_faults: self.step_faults.load(Ordering::Relaxed),
            teardown_faults: self.teardown_faults.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
            callbacks: self.callbacks.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub step_faults: u64,
    pub teardown_faults: u64,
    pub dispatched: u64,
    pub dispatch_failures: u64,
    pub callbacks: u64,
}
