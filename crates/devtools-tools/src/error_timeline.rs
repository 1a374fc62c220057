use std::sync::Arc;

use async_trait::async_trait;
use devtools_orchestrator::{ActivateHook, DeactivateHook, InitHook, RenderHook, Tool, ToolView};
use devtools_telemetry::{ErrorEvent, ErrorKind};
use parking_lot::Mutex;
use soulbrowser_core_types::SoulError;

use crate::refresh::TelemetryFeed;
use crate::view::{format_clock, KindFilter};

pub const ERROR_TIMELINE_ID: &str = "errors";

/// Console errors, warnings and uncaught exceptions in capture order.
pub struct ErrorTimeline {
    feed: Arc<TelemetryFeed>,
    filter: Mutex<KindFilter<ErrorKind>>,
}

impl ErrorTimeline {
    pub fn new(feed: Arc<TelemetryFeed>) -> Self {
        Self {
            feed,
            filter: Mutex::new(KindFilter::all(&ErrorKind::ALL)),
        }
    }

    pub fn feed(&self) -> &Arc<TelemetryFeed> {
        &self.feed
    }

    pub fn set_filter(&self, kind: ErrorKind, enabled: bool) {
        self.filter.lock().set(kind, enabled);
    }

    pub fn filters(&self) -> Vec<ErrorKind> {
        self.filter.lock().enabled()
    }

    /// Cached events passing the current filter.
    pub fn visible(&self) -> Vec<ErrorEvent> {
        let filter = self.filter.lock().clone();
        self.feed
            .snapshot()
            .iter()
            .filter_map(|event| event.as_error())
            .filter(|event| filter.allows(event.kind))
            .cloned()
            .collect()
    }

    fn row(event: &ErrorEvent) -> String {
        let mut row = format!(
            "[{}] {} {}",
            format_clock(event.timestamp),
            event.kind.as_str().to_uppercase(),
            event.message
        );
        if let Some(location) = event.location() {
            row.push_str(&format!(" ({location})"));
        }
        row
    }
}

impl Tool for ErrorTimeline {
    fn name(&self) -> &str {
        "Error Timeline"
    }

    fn icon(&self) -> &str {
        "⚠️"
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

impl InitHook for ErrorTimeline {
    fn init(&self) -> Result<(), SoulError> {
        self.filter.lock().reset();
        Ok(())
    }
}

impl RenderHook for ErrorTimeline {
    fn render(&self) -> ToolView {
        let total = self.feed.snapshot().len();
        let rows = self.visible().iter().map(Self::row).collect();
        let tracking = if self.feed.is_tracking() { "tracking" } else { "paused" };
        ToolView::new(self.name())
            .with_summary(format!("{total} events, {tracking}"))
            .with_rows(rows)
            .with_empty_message("No errors captured. Start tracking to begin.")
            .with_status(self.feed.status())
    }
}

#[async_trait]
impl ActivateHook for ErrorTimeline {
    async fn on_activate(&self) {
        self.feed.activate().await;
    }
}

impl DeactivateHook for ErrorTimeline {
    fn on_deactivate(&self) {
        self.feed.deactivate();
    }
}
