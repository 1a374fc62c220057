use anyhow::{Context, Result};
use cdp_adapter::list_page_targets;

use crate::cli::context::CliContext;
use crate::cli::output::{print_json, OutputFormat};

pub async fn cmd_targets(ctx: &CliContext) -> Result<()> {
    let transport = ctx.transport().await?;
    let pages = list_page_targets(transport.as_ref())
        .await
        .context("failed to list page targets")?;

    match ctx.output() {
        OutputFormat::Json => print_json(&pages)?,
        OutputFormat::Human => {
            if pages.is_empty() {
                println!("No page targets.");
            }
            for page in &pages {
                let marker = if page.attached { "*" } else { " " };
                println!("{marker} {}  {}  {}", page.target_id, page.title, page.url);
            }
        }
    }
    Ok(())
}
