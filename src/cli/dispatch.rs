use super::perf::cmd_perf;
use super::probe::cmd_probe;
use super::storage::cmd_storage;
use super::targets::cmd_targets;
use super::watch::cmd_watch;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use crate::cli::env::CliArgs;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Targets => cmd_targets(ctx).await,
        Commands::Probe(args) => cmd_probe(args, ctx).await,
        Commands::Watch(args) => cmd_watch(args, ctx).await,
        Commands::Perf(args) => cmd_perf(args, ctx).await,
        Commands::Storage(args) => cmd_storage(args, ctx).await,
    }
}
