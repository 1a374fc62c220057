use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, Instrument};

use soulbrowser_devtools::{load_config, logging, metrics};

mod cli;

use cli::{dispatch, CliArgs, CliContext};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CliArgs::parse();

    let mut config = load_config(cli.config.as_deref()).context("failed to load configuration")?;
    cli.apply_overrides(&mut config);

    logging::init_tracing(&config.logging);
    metrics::register_metrics();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        git = env!("GIT_HASH"),
        "starting soulbrowser-devtools"
    );

    let ctx = CliContext::new(config, cli.target.clone(), cli.output);
    let span = logging::command_span(command_name(&cli));
    let result = dispatch(&cli, &ctx).instrument(span).await;

    if cli.print_metrics {
        match metrics::render_metrics() {
            Ok(text) => eprintln!("{text}"),
            Err(err) => error!(?err, "failed to encode metrics"),
        }
    }

    if let Err(err) = &result {
        error!("Command failed: {err:#}");
    }
    result
}

fn command_name(cli: &CliArgs) -> &'static str {
    use crate::cli::commands::Commands;
    match cli.command {
        Commands::Targets => "targets",
        Commands::Probe(_) => "probe",
        Commands::Watch(_) => "watch",
        Commands::Perf(_) => "perf",
        Commands::Storage(_) => "storage",
    }
}
