use once_cell::sync::OnceCell;
use tracing::{span, Level, Span};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

use crate::config::LoggingSettings;

static INIT: OnceCell<()> = OnceCell::new();

/// Install the global subscriber once. `RUST_LOG` wins over the configured filter.
/// Output goes to stderr so command results on stdout stay machine readable.
pub fn init_tracing(settings: &LoggingSettings) {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(settings.filter.as_str()));
        let registry = Registry::default().with(filter);
        if settings.json {
            let fmt_layer = fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_thread_ids(true);
            let _ = tracing::subscriber::set_global_default(registry.with(fmt_layer));
        } else {
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .with_target(false)
                .with_thread_ids(true);
            let _ = tracing::subscriber::set_global_default(registry.with(fmt_layer));
        }
    });
}

pub fn command_span(name: &str) -> Span {
    span!(Level::INFO, "command", command = %name)
}
