use anyhow::{Context, Result};
use clap::Args;
use devtools_tools::ToolSettings;

use crate::cli::context::CliContext;
use crate::cli::output::print_json;

#[derive(Args, Clone, Debug)]
pub struct ProbeArgs {
    /// JavaScript source; its completion value is printed
    pub code: String,

    /// Treat the completion value as JSON and pretty-print it
    #[arg(long)]
    pub json: bool,
}

pub async fn cmd_probe(args: ProbeArgs, ctx: &CliContext) -> Result<()> {
    let session = ctx.open_panel(&ToolSettings::default()).await?;
    let bridge = session.panel.bridge.clone();

    let result = if args.json {
        bridge
            .execute_json_value(&args.code)
            .await
            .context("probe failed")
            .and_then(|value| print_json(&value))
    } else {
        bridge
            .execute(&args.code)
            .await
            .context("probe failed")
            .map(|text| println!("{text}"))
    };

    session.close().await;
    result
}
