use cdp_adapter::metrics as cdp_metrics;
use instrumentation_bridge::metrics as bridge_metrics;
use once_cell::sync::{Lazy, OnceCell};
use prometheus::{Encoder, Registry, TextEncoder};

static GLOBAL_REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);
static REGISTER_ONCE: OnceCell<()> = OnceCell::new();

pub fn register_metrics() {
    REGISTER_ONCE.get_or_init(|| {
        let registry = global_registry();
        cdp_metrics::register_metrics(registry);
        bridge_metrics::register_metrics(registry);
    });
}

pub fn global_registry() -> &'static Registry {
    &GLOBAL_REGISTRY
}

/// Prometheus text exposition of everything registered so far.
pub fn render_metrics() -> Result<String, prometheus::Error> {
    register_metrics();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&global_registry().gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn renders_bridge_and_cdp_series() {
        bridge_metrics::observe_call("execute", Duration::from_millis(3), "ok");
        cdp_metrics::observe_command("Runtime.evaluate", Duration::from_millis(2), true);
        let text = render_metrics().unwrap();
        assert!(text.contains("soul_devtools_cdp_commands_total"));
        assert!(text.contains("Runtime.evaluate"));
        assert!(text.contains("execute"));
    }
}
