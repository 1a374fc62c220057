use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand, ValueEnum};
use devtools_tools::{StorageExplorer, STORAGE_EXPLORER_ID};
use instrumentation_bridge::StorageArea;

use crate::cli::context::CliContext;
use crate::cli::output::OutputFormat;

#[derive(Args, Clone, Debug)]
pub struct StorageArgs {
    #[command(subcommand)]
    pub action: StorageAction,

    /// Storage area to act on
    #[arg(long, value_enum, default_value = "local", global = true)]
    pub area: AreaArg,
}

#[derive(Subcommand, Clone, Debug)]
pub enum StorageAction {
    /// Print every item
    List,
    /// Set `key` to `value`
    Set { key: String, value: String },
    /// Remove `key`
    Remove { key: String },
    /// Remove every item
    Clear,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum AreaArg {
    Local,
    Session,
}

impl From<AreaArg> for StorageArea {
    fn from(value: AreaArg) -> Self {
        match value {
            AreaArg::Local => StorageArea::Local,
            AreaArg::Session => StorageArea::Session,
        }
    }
}

pub async fn cmd_storage(args: StorageArgs, ctx: &CliContext) -> Result<()> {
    let session = ctx.open_panel(&ctx.config().tool_settings()).await?;
    let storage = session.panel.tools.storage.clone();
    storage.select_tab(args.area.into());
    session
        .panel
        .orchestrator
        .activate_tool(STORAGE_EXPLORER_ID)
        .await;

    let result = apply(&storage, &args.action)
        .await
        .and_then(|_| print_items(&storage, ctx.output()));
    session.close().await;
    result
}

async fn apply(storage: &StorageExplorer, action: &StorageAction) -> Result<()> {
    match action {
        StorageAction::List => {
            if let Some(status) = storage.status() {
                bail!(status);
            }
            Ok(())
        }
        StorageAction::Set { key, value } => {
            if key.trim().is_empty() {
                bail!("key must not be empty");
            }
            storage
                .set_item(key, value)
                .await
                .with_context(|| format!("failed to set {key}"))
        }
        StorageAction::Remove { key } => storage
            .remove_item(key)
            .await
            .with_context(|| format!("failed to remove {key}")),
        StorageAction::Clear => storage.clear_area().await.context("failed to clear storage"),
    }
}

fn print_items(storage: &StorageExplorer, output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Json => println!("{}", storage.export_json()?),
        OutputFormat::Human => {
            let items = storage.items();
            println!("{}Storage: {} items", storage.current_tab(), items.len());
            for (key, value) in &items {
                println!("  {key} = {value}");
            }
        }
    }
    Ok(())
}
