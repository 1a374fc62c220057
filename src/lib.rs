//! SoulBrowser devtools
//!
//! Library side of the `soulbrowser-devtools` binary: configuration, logging, metrics and the
//! wiring that attaches the devtools panel to a Chromium page.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod session;

pub use config::{load_config, ConfigError, DevtoolsConfig, LoadOptions, LoggingSettings};
pub use session::{DevtoolsPanel, ReloadWatcher};
