use std::sync::Arc;

use async_trait::async_trait;
use devtools_orchestrator::{ActivateHook, DeactivateHook, InitHook, RenderHook, Tool, ToolView};
use devtools_telemetry::{MutationEvent, MutationKind};
use parking_lot::Mutex;
use soulbrowser_core_types::SoulError;

use crate::refresh::TelemetryFeed;
use crate::view::{format_clock, KindFilter};

pub const MUTATION_TRACKER_ID: &str = "mutations";

/// DOM mutation records, newest first. Polls while tracking.
pub struct MutationTracker {
    feed: Arc<TelemetryFeed>,
    filter: Mutex<KindFilter<MutationKind>>,
}

impl MutationTracker {
    pub fn new(feed: Arc<TelemetryFeed>) -> Self {
        Self {
            feed,
            filter: Mutex::new(KindFilter::all(&MutationKind::ALL)),
        }
    }

    pub fn feed(&self) -> &Arc<TelemetryFeed> {
        &self.feed
    }

    pub fn set_filter(&self, kind: MutationKind, enabled: bool) {
        self.filter.lock().set(kind, enabled);
    }

    pub fn filters(&self) -> Vec<MutationKind> {
        self.filter.lock().enabled()
    }

    /// Filtered mutations, newest first.
    pub fn visible(&self) -> Vec<MutationEvent> {
        let filter = self.filter.lock().clone();
        self.feed
            .snapshot()
            .iter()
            .rev()
            .filter_map(|event| event.as_mutation())
            .filter(|event| filter.allows(event.kind))
            .cloned()
            .collect()
    }

    fn row(event: &MutationEvent) -> String {
        let mut row = format!(
            "[{}] {} {}",
            format_clock(event.timestamp),
            event.kind.as_str(),
            event.target
        );
        if let Some(attribute) = &event.attribute {
            row.push_str(&format!(" @{attribute}"));
        }
        if event.added_count > 0 {
            row.push_str(&format!(" +{}", event.added_count));
        }
        if event.removed_count > 0 {
            row.push_str(&format!(" -{}", event.removed_count));
        }
        row
    }
}

impl Tool for MutationTracker {
    fn name(&self) -> &str {
        "DOM Mutations"
    }

    fn icon(&self) -> &str {
        "🔍"
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

impl InitHook for MutationTracker {
    fn init(&self) -> Result<(), SoulError> {
        self.filter.lock().reset();
        Ok(())
    }
}

impl RenderHook for MutationTracker {
    fn render(&self) -> ToolView {
        let total = self.feed.snapshot().len();
        let rows = self.visible().iter().map(Self::row).collect();
        ToolView::new(self.name())
            .with_summary(format!("{total} mutations"))
            .with_rows(rows)
            .with_empty_message("No mutations recorded. Start tracking to observe DOM changes.")
            .with_status(self.feed.status())
    }
}

#[async_trait]
impl ActivateHook for MutationTracker {
    async fn on_activate(&self) {
        self.feed.activate().await;
    }
}

impl DeactivateHook for MutationTracker {
    fn on_deactivate(&self) {
        self.feed.deactivate();
    }
}
