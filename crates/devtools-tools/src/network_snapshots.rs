use std::sync::Arc;

use async_trait::async_trait;
use devtools_orchestrator::{ActivateHook, DeactivateHook, InitHook, RenderHook, Tool, ToolView};
use devtools_telemetry::{NetworkEvent, NetworkTransport};
use parking_lot::Mutex;
use soulbrowser_core_types::SoulError;

use crate::refresh::TelemetryFeed;
use crate::view::{truncate, KindFilter};

pub const NETWORK_SNAPSHOTS_ID: &str = "network";

const URL_COLUMN: usize = 60;

/// Captured fetch/XHR requests with per-request detail and JSON export.
pub struct NetworkSnapshots {
    feed: Arc<TelemetryFeed>,
    filter: Mutex<KindFilter<NetworkTransport>>,
}

impl NetworkSnapshots {
    pub fn new(feed: Arc<TelemetryFeed>) -> Self {
        Self {
            feed,
            filter: Mutex::new(KindFilter::all(&NetworkTransport::ALL)),
        }
    }

    pub fn feed(&self) -> &Arc<TelemetryFeed> {
        &self.feed
    }

    pub fn set_filter(&self, transport: NetworkTransport, enabled: bool) {
        self.filter.lock().set(transport, enabled);
    }

    pub fn filters(&self) -> Vec<NetworkTransport> {
        self.filter.lock().enabled()
    }

    pub fn requests(&self) -> Vec<NetworkEvent> {
        let filter = self.filter.lock().clone();
        self.feed
            .snapshot()
            .iter()
            .filter_map(|event| event.as_network())
            .filter(|event| filter.allows(event.transport))
            .cloned()
            .collect()
    }

    /// The `index`-th row of the current list.
    pub fn detail(&self, index: usize) -> Option<NetworkEvent> {
        self.requests().into_iter().nth(index)
    }

    /// Detail pane lines for the `index`-th row.
    pub fn detail_lines(&self, index: usize) -> Option<Vec<String>> {
        let request = self.detail(index)?;
        let mut lines = vec![
            format!("Type: {}", request.transport.as_str().to_uppercase()),
            format!("Method: {}", request.method),
            format!("URL: {}", request.url),
            format!(
                "Status: {} {}",
                request.status,
                request.status_text.as_deref().unwrap_or_default()
            )
            .trim_end()
            .to_string(),
            format!("Duration: {}ms", request.duration_ms),
        ];
        if let Some(error) = &request.error {
            lines.push(format!("Error: {error}"));
        }
        lines.push("Response:".to_string());
        lines.push(request.response_body_prefix.unwrap_or_default());
        Some(lines)
    }

    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.requests())
    }

    fn row(event: &NetworkEvent) -> String {
        let status = if event.status == 0 {
            "ERR".to_string()
        } else {
            event.status.to_string()
        };
        let marker = if event.is_failure() { "!" } else { " " };
        format!(
            "{marker} {} {status} {} {}ms",
            event.method,
            truncate(&event.url, URL_COLUMN),
            event.duration_ms
        )
    }
}

impl Tool for NetworkSnapshots {
    fn name(&self) -> &str {
        "Network Snapshots"
    }

    fn icon(&self) -> &str {
        "🌐"
    }

    fn as_init(&self) -> Option<&dyn InitHook> {
        Some(self)
    }

    fn as_render(&self) -> Option<&dyn RenderHook> {
        Some(self)
    }

    fn as_activate(&self) -> Option<&dyn ActivateHook> {
        Some(self)
    }

    fn as_deactivate(&self) -> Option<&dyn DeactivateHook> {
        Some(self)
    }
}

impl InitHook for NetworkSnapshots {
    fn init(&self) -> Result<(), SoulError> {
        self.filter.lock().reset();
        Ok(())
    }
}

impl RenderHook for NetworkSnapshots {
    fn render(&self) -> ToolView {
        let requests = self.requests();
        let failed = requests.iter().filter(|r| r.is_failure()).count();
        let rows = requests.iter().map(Self::row).collect();
        ToolView::new(self.name())
            .with_summary(format!("{} requests, {failed} failed", requests.len()))
            .with_rows(rows)
            .with_empty_message("No requests captured. Start capture to begin.")
            .with_status(self.feed.status())
    }
}

#[async_trait]
impl ActivateHook for NetworkSnapshots {
    async fn on_activate(&self) {
        self.feed.activate().await;
    }
}

impl DeactivateHook for NetworkSnapshots {
    fn on_deactivate(&self) {
        self.feed.deactivate();
    }
}
