use anyhow::{anyhow, Result};
use clap::Args;
use devtools_tools::{view::format_ms, PERFORMANCE_HEATMAP_ID};
use serde_json::json;

use crate::cli::context::CliContext;
use crate::cli::output::{print_json, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct PerfArgs {
    /// Print the raw metrics and resource list instead of the summary
    #[arg(long)]
    pub export: bool,
}

pub async fn cmd_perf(args: PerfArgs, ctx: &CliContext) -> Result<()> {
    let session = ctx.open_panel(&ctx.config().tool_settings()).await?;
    session
        .panel
        .orchestrator
        .activate_tool(PERFORMANCE_HEATMAP_ID)
        .await;
    let performance = session.panel.tools.performance.clone();
    let result = report(&performance, &args, ctx.output());
    session.close().await;
    result
}

fn report(
    performance: &devtools_tools::PerformanceHeatmap,
    args: &PerfArgs,
    output: OutputFormat,
) -> Result<()> {
    if performance.report().is_none() {
        let status = performance
            .status()
            .unwrap_or_else(|| "no performance data".to_string());
        return Err(anyhow!(status));
    }

    if args.export {
        println!("{}", performance.export_json()?);
        return Ok(());
    }

    let summary = performance.summary();
    let slow = performance.slow_resources();
    let waterfall = performance.waterfall();
    match output {
        OutputFormat::Json => print_json(&json!({
            "summary": summary,
            "slowResources": slow,
            "waterfall": waterfall,
        })),
        OutputFormat::Human => {
            println!("Page load:   {}", summary.page_load);
            println!("DOM ready:   {}", summary.dom_ready);
            println!("First paint: {}", summary.first_paint);
            println!("Resources:   {}", summary.resources);
            if !slow.is_empty() {
                println!();
                println!("Slow resources:");
                for resource in &slow {
                    println!(
                        "  {:>8}  {:<8} {}",
                        format_ms(Some(resource.duration as i64)),
                        resource.initiator,
                        resource.name
                    );
                }
            }
            println!();
            for bar in &waterfall {
                let offset = (bar.left_pct / 2.0).round() as usize;
                let width = ((bar.width_pct / 2.0).round() as usize).max(1);
                println!(
                    "{:<24.24} |{}{}| {}ms",
                    bar.name,
                    " ".repeat(offset),
                    "#".repeat(width),
                    bar.duration
                );
            }
            Ok(())
        }
    }
}
