use std::sync::Arc;

use async_trait::async_trait;
use devtools_orchestrator::{ActivateHook, RenderHook, Tool, ToolView};
use instrumentation_bridge::{BridgeError, InstrumentationBridge};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::view::format_ms;

pub const PERFORMANCE_HEATMAP_ID: &str = "performance";

pub const SLOW_RESOURCE_MS: u64 = 200;
const WATERFALL_ROWS: usize = 20;

/// Probe body evaluated through `execute_json`.
pub const PERFORMANCE_PROBE: &str = r#"
var perf = performance;
var timing = perf.timing || {};
var entries = perf.getEntriesByType('resource') || [];
var paint = perf.getEntriesByType('paint') || [];
var fp = paint.find(function (p) { return p.name === 'first-paint'; });
return {
  navigationStart: timing.navigationStart,
  domContentLoaded: timing.domContentLoadedEventEnd - timing.navigationStart,
  loadComplete: timing.loadEventEnd - timing.navigationStart,
  firstPaint: fp ? fp.startTime : null,
  resources: entries.map(function (r) {
    return {
      name: r.name.split('/').pop().substring(0, 40),
      fullUrl: r.name,
      type: r.initiatorType,
      duration: Math.round(r.duration),
      size: r.transferSize || 0,
      start: Math.round(r.startTime)
    };
  }).slice(0, 50)
};
"#;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTiming {
    pub name: String,
    pub full_url: String,
    #[serde(rename = "type")]
    pub initiator: String,
    pub duration: u64,
    #[serde(default)]
    pub size: u64,
    pub start: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerformanceReport {
    pub navigation_start: Option<i64>,
    pub dom_content_loaded: Option<i64>,
    pub load_complete: Option<i64>,
    pub first_paint: Option<f64>,
    pub resources: Vec<ResourceTiming>,
}

/// Summary cards as displayed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PerformanceSummary {
    pub page_load: String,
    pub dom_ready: String,
    pub first_paint: String,
    pub resources: String,
}

/// One waterfall bar, positioned in percent of the slowest resource's end time.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WaterfallBar {
    pub name: String,
    pub initiator: String,
    pub left_pct: f64,
    pub width_pct: f64,
    pub duration: u64,
}

#[derive(Default)]
struct HeatmapState {
    report: Option<PerformanceReport>,
    status: Option<String>,
}

pub struct PerformanceHeatmap {
    bridge: Arc<InstrumentationBridge>,
    state: Mutex<HeatmapState>,
}

impl PerformanceHeatmap {
    pub fn new(bridge: Arc<InstrumentationBridge>) -> Self {
        Self {
            bridge,
            state: Mutex::new(HeatmapState::default()),
        }
    }

    /// Probe the page. On failure the previous report stays and a status is set.
    pub async fn analyze(&self) -> Result<PerformanceReport, BridgeError> {
        match self.bridge.execute_json::<PerformanceReport>(PERFORMANCE_PROBE).await {
            Ok(report) => {
                let mut state = self.state.lock();
                state.report = Some(report.clone());
                state.status = None;
                Ok(report)
            }
            Err(err) => {
                warn!(target: "devtools-tools", error = %err, "performance analysis failed");
                self.state.lock().status = Some(format!("Performance analysis failed: {err}"));
                Err(err)
            }
        }
    }

    pub fn report(&self) -> Option<PerformanceReport> {
        self.state.lock().report.clone()
    }

    pub fn status(&self) -> Option<String> {
        self.state.lock().status.clone()
    }

    pub fn summary(&self) -> PerformanceSummary {
        let report = self.report().unwrap_or_default();
        PerformanceSummary {
            page_load: format_ms(report.load_complete),
            dom_ready: format_ms(report.dom_content_loaded),
            first_paint: format_ms(report.first_paint.map(|fp| fp.round() as i64)),
            resources: format!("{} files", report.resources.len()),
        }
    }

    pub fn waterfall(&self) -> Vec<WaterfallBar> {
        let resources = self.report().map(|r| r.resources).unwrap_or_default();
        let end = resources
            .iter()
            .map(|r| r.start + r.duration)
            .max()
            .unwrap_or(0);
        if end == 0 {
            return Vec::new();
        }
        let scale = 100.0 / end as f64;
        resources
            .into_iter()
            .take(WATERFALL_ROWS)
            .map(|r| WaterfallBar {
                left_pct: r.start as f64 * scale,
                width_pct: (r.duration as f64 * scale).max(1.0),
                duration: r.duration,
                name: r.name,
                initiator: r.initiator,
            })
            .collect()
    }

    /// Resources slower than [`SLOW_RESOURCE_MS`], slowest first.
    pub fn slow_resources(&self) -> Vec<ResourceTiming> {
        let mut slow: Vec<_> = self
            .report()
            .map(|r| r.resources)
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.duration > SLOW_RESOURCE_MS)
            .collect();
        slow.sort_by(|a, b| b.duration.cmp(&a.duration));
        slow
    }

    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        let report = self.report();
        let resources = report.as_ref().map(|r| r.resources.clone()).unwrap_or_default();
        serde_json::to_string_pretty(&json!({ "metrics": report, "resources": resources }))
    }
}

impl Tool for PerformanceHeatmap {
    fn name(&self) -> &str {
        "Performance"
    }

    fn icon(&self) -> &str {
        "📊"
    }

    fn as_render(&self) -> Option<&dyn RenderHook> {
        Some(self)
    }

    fn as_activate(&self) -> Option<&dyn ActivateHook> {
        Some(self)
    }
}

impl RenderHook for PerformanceHeatmap {
    fn render(&self) -> ToolView {
        let summary = self.summary();
        let mut rows: Vec<String> = self
            .waterfall()
            .iter()
            .map(|bar| {
                format!(
                    "{:<40} {:>6.1}% +{:<6.1}% {}ms",
                    bar.name, bar.left_pct, bar.width_pct, bar.duration
                )
            })
            .collect();
        let slow = self.slow_resources();
        if !rows.is_empty() {
            if slow.is_empty() {
                rows.push("No slow resources detected".to_string());
            } else {
                rows.extend(
                    slow.iter()
                        .map(|r| format!("SLOW {} {} {}ms", r.initiator, r.name, r.duration)),
                );
            }
        }
        ToolView::new(self.name())
            .with_summary(format!(
                "Page Load {} | DOM Ready {} | First Paint {} | {}",
                summary.page_load, summary.dom_ready, summary.first_paint, summary.resources
            ))
            .with_rows(rows)
            .with_empty_message("No resources to display")
            .with_status(self.status())
    }
}

#[async_trait]
impl ActivateHook for PerformanceHeatmap {
    async fn on_activate(&self) {
        let _ = self.analyze().await;
    }
}
