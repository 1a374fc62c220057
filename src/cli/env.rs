use clap::Parser;
use std::path::PathBuf;

use soulbrowser_devtools::DevtoolsConfig;

use super::commands::Commands;
use super::output::OutputFormat;

/// Devtools panel for Chromium pages: error timeline, DOM mutations, network, performance, storage
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(long_version = concat!(
    env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ", built ", env!("BUILD_DATE"), ")"
))]
#[command(propagate_version = true)]
pub struct CliArgs {
    /// Configuration file path (defaults to $SOUL_DEVTOOLS_CONFIG)
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Connect to a running browser instead of launching one
    #[arg(long, value_name = "WS_URL", global = true)]
    pub ws_url: Option<String>,

    /// Chrome/Chromium executable to launch
    #[arg(long, value_name = "PATH", global = true)]
    pub chrome_path: Option<PathBuf>,

    /// Show the launched browser window
    #[arg(long, global = true)]
    pub headful: bool,

    /// Page target id to attach to (defaults to the first page)
    #[arg(long, global = true)]
    pub target: Option<String>,

    /// Log filter, overriding the configured one
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Output format
    #[arg(short, long, default_value = "human", global = true)]
    pub output: OutputFormat,

    /// Print prometheus metrics to stderr on exit
    #[arg(long, global = true)]
    pub print_metrics: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl CliArgs {
    /// Flags win over file and environment settings.
    pub fn apply_overrides(&self, config: &mut DevtoolsConfig) {
        if let Some(url) = &self.ws_url {
            config.cdp.websocket_url = Some(url.clone());
        }
        if let Some(path) = &self.chrome_path {
            config.cdp.executable = path.clone();
        }
        if self.headful {
            config.cdp.headless = false;
        }
        if let Some(level) = &self.log_level {
            config.logging.filter = level.clone();
        }
        if self.log_json {
            config.logging.json = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn flags_override_config() {
        let args = CliArgs::parse_from([
            "soulbrowser-devtools",
            "--ws-url",
            "ws://127.0.0.1:9222/devtools/browser/abc",
            "--headful",
            "--log-json",
            "targets",
        ]);
        let mut config = DevtoolsConfig::default();
        args.apply_overrides(&mut config);
        assert_eq!(
            config.cdp.websocket_url.as_deref(),
            Some("ws://127.0.0.1:9222/devtools/browser/abc")
        );
        assert!(!config.cdp.headless);
        assert!(config.logging.json);
        assert_eq!(config.logging.filter, "info");
    }
}
