use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::{core::Collector, histogram_opts, HistogramVec, IntCounter, IntCounterVec, Registry};
use tracing::error;

/// Process-wide counters for CDP traffic, readable without a prometheus registry.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransportMetricsSnapshot {
    pub commands: u64,
    pub command_failures: u64,
    pub command_latency_total_us: u64,
    pub events_dropped: u64,
}

static COMMANDS: AtomicU64 = AtomicU64::new(0);
static COMMAND_FAILURES: AtomicU64 = AtomicU64::new(0);
static COMMAND_LATENCY_TOTAL_US: AtomicU64 = AtomicU64::new(0);
static EVENTS_DROPPED: AtomicU64 = AtomicU64::new(0);

lazy_static! {
    static ref CDP_COMMANDS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("soul_devtools_cdp_commands_total", "CDP commands sent"),
        &["method", "outcome"]
    )
    .unwrap();
    static ref CDP_COMMAND_DURATION: HistogramVec = HistogramVec::new(
        histogram_opts!(
            "soul_devtools_cdp_command_duration_seconds",
            "CDP command round-trip latency",
            vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]
        ),
        &["method"]
    )
    .unwrap();
    static ref CDP_EVENTS_DROPPED_TOTAL: IntCounter = IntCounter::new(
        "soul_devtools_cdp_events_dropped_total",
        "CDP events dropped because no consumer kept up"
    )
    .unwrap();
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register cdp metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, CDP_COMMANDS_TOTAL.clone());
    register(registry, CDP_COMMAND_DURATION.clone());
    register(registry, CDP_EVENTS_DROPPED_TOTAL.clone());
}

/// Record one completed command round-trip.
pub fn observe_command(method: &str, elapsed: Duration, ok: bool) {
    COMMANDS.fetch_add(1, Ordering::Relaxed);
    let outcome = if ok { "ok" } else { "error" };
    CDP_COMMANDS_TOTAL
        .with_label_values(&[method, outcome])
        .inc();
    if ok {
        let micros = elapsed.as_micros().min(u64::MAX as u128) as u64;
        COMMAND_LATENCY_TOTAL_US.fetch_add(micros, Ordering::Relaxed);
        CDP_COMMAND_DURATION
            .with_label_values(&[method])
            .observe(elapsed.as_secs_f64());
    } else {
        COMMAND_FAILURES.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn record_dropped_event() {
    EVENTS_DROPPED.fetch_add(1, Ordering::Relaxed);
    CDP_EVENTS_DROPPED_TOTAL.inc();
}

pub fn snapshot() -> TransportMetricsSnapshot {
    TransportMetricsSnapshot {
        commands: COMMANDS.load(Ordering::Relaxed),
        command_failures: COMMAND_FAILURES.load(Ordering::Relaxed),
        command_latency_total_us: COMMAND_LATENCY_TOTAL_US.load(Ordering::Relaxed),
        events_dropped: EVENTS_DROPPED.load(Ordering::Relaxed),
    }
}

pub fn reset() {
    COMMANDS.store(0, Ordering::Relaxed);
    COMMAND_FAILURES.store(0, Ordering::Relaxed);
    COMMAND_LATENCY_TOTAL_US.store(0, Ordering::Relaxed);
    EVENTS_DROPPED.store(0, Ordering::Relaxed);
}
