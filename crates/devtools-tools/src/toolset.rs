use std::sync::Arc;

use devtools_orchestrator::ToolOrchestrator;
use devtools_telemetry::{CollectorKind, CollectorSettings};
use instrumentation_bridge::InstrumentationBridge;
use serde::{Deserialize, Serialize};

use crate::error_timeline::{ErrorTimeline, ERROR_TIMELINE_ID};
use crate::mutation_tracker::{MutationTracker, MUTATION_TRACKER_ID};
use crate::network_snapshots::{NetworkSnapshots, NETWORK_SNAPSHOTS_ID};
use crate::performance::{PerformanceHeatmap, PERFORMANCE_HEATMAP_ID};
use crate::refresh::{RefreshSettings, TelemetryFeed};
use crate::storage_explorer::{StorageExplorer, STORAGE_EXPLORER_ID};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub refresh: RefreshSettings,
    pub collectors: CollectorSettings,
}

/// The built-in tools, sharing one bridge.
pub struct BuiltinTools {
    pub errors: Arc<ErrorTimeline>,
    pub mutations: Arc<MutationTracker>,
    pub network: Arc<NetworkSnapshots>,
    pub performance: Arc<PerformanceHeatmap>,
    pub storage: Arc<StorageExplorer>,
}

impl BuiltinTools {
    pub fn new(bridge: Arc<InstrumentationBridge>, settings: &ToolSettings) -> Self {
        let period = settings.refresh.interval();
        let optional = settings.refresh.poll_all.then_some(period);
        let feed = |kind: CollectorKind, poll| {
            TelemetryFeed::new(Arc::clone(&bridge), settings.collectors.spec(kind), poll)
        };
        Self {
            errors: Arc::new(ErrorTimeline::new(feed(CollectorKind::Error, optional))),
            mutations: Arc::new(MutationTracker::new(feed(CollectorKind::Mutation, Some(period)))),
            network: Arc::new(NetworkSnapshots::new(feed(CollectorKind::Network, optional))),
            performance: Arc::new(PerformanceHeatmap::new(Arc::clone(&bridge))),
            storage: Arc::new(StorageExplorer::new(Arc::clone(&bridge))),
        }
    }

    /// Register every tool under its id, in toolbar order.
    pub fn register_all(&self, orchestrator: &ToolOrchestrator) {
        orchestrator.register(ERROR_TIMELINE_ID, self.errors.clone());
        orchestrator.register(NETWORK_SNAPSHOTS_ID, self.network.clone());
        orchestrator.register(MUTATION_TRACKER_ID, self.mutations.clone());
        orchestrator.register(PERFORMANCE_HEATMAP_ID, self.performance.clone());
        orchestrator.register(STORAGE_EXPLORER_ID, self.storage.clone());
    }

    pub fn feed(&self, kind: CollectorKind) -> &Arc<TelemetryFeed> {
        match kind {
            CollectorKind::Error => self.errors.feed(),
            CollectorKind::Mutation => self.mutations.feed(),
            CollectorKind::Network => self.network.feed(),
        }
    }

    /// Stop every poll loop.
    pub async fn shutdown(&self) {
        for kind in CollectorKind::ALL {
            self.feed(kind).shutdown().await;
        }
    }
}
