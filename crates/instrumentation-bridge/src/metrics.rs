use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::{core::Collector, histogram_opts, HistogramVec, IntCounterVec, Registry};
use tracing::error;

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct BridgeMetricsSnapshot {
    pub calls: u64,
    pub no_target: u64,
    pub execution_failures: u64,
    pub decode_failures: u64,
}

static CALLS: AtomicU64 = AtomicU64::new(0);
static NO_TARGET: AtomicU64 = AtomicU64::new(0);
static EXECUTION_FAILURES: AtomicU64 = AtomicU64::new(0);
static DECODE_FAILURES: AtomicU64 = AtomicU64::new(0);

lazy_static! {
    static ref BRIDGE_CALLS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("soul_devtools_bridge_calls_total", "Bridge operations by outcome"),
        &["op", "outcome"]
    )
    .unwrap();
    static ref BRIDGE_CALL_DURATION: HistogramVec = HistogramVec::new(
        histogram_opts!(
            "soul_devtools_bridge_call_duration_seconds",
            "Bridge round-trip latency",
            vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
        ),
        &["op"]
    )
    .unwrap();
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register bridge metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, BRIDGE_CALLS_TOTAL.clone());
    register(registry, BRIDGE_CALL_DURATION.clone());
}

/// `outcome` is `ok` or a [`BridgeError::kind`](crate::BridgeError::kind) label.
pub fn observe_call(op: &str, elapsed: Duration, outcome: &str) {
    CALLS.fetch_add(1, Ordering::Relaxed);
    match outcome {
        "no_target" => NO_TARGET.fetch_add(1, Ordering::Relaxed),
        "execution" => EXECUTION_FAILURES.fetch_add(1, Ordering::Relaxed),
        "decode" => DECODE_FAILURES.fetch_add(1, Ordering::Relaxed),
        _ => 0,
    };
    BRIDGE_CALLS_TOTAL.with_label_values(&[op, outcome]).inc();
    BRIDGE_CALL_DURATION
        .with_label_values(&[op])
        .observe(elapsed.as_secs_f64());
}

pub fn snapshot() -> BridgeMetricsSnapshot {
    BridgeMetricsSnapshot {
        calls: CALLS.load(Ordering::Relaxed),
        no_target: NO_TARGET.load(Ordering::Relaxed),
        execution_failures: EXECUTION_FAILURES.load(Ordering::Relaxed),
        decode_failures: DECODE_FAILURES.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_are_counted_by_kind() {
        let before = snapshot();
        observe_call("execute", Duration::from_millis(2), "ok");
        observe_call("execute", Duration::from_millis(1), "no_target");
        observe_call("get_buffer", Duration::from_millis(1), "decode");
        let after = snapshot();
        assert!(after.calls >= before.calls + 3);
        assert!(after.no_target > before.no_target);
        assert!(after.decode_failures > before.decode_failures);

        let registry = Registry::new();
        register_metrics(&registry);
        let names: Vec<_> = registry.gather().iter().map(|f| f.get_name().to_string()).collect();
        assert!(names.contains(&"soul_devtools_bridge_calls_total".to_string()));
    }
}
