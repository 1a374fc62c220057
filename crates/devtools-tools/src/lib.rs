//! Built-in devtools panel tools and the polling refresh they share.

pub mod error_timeline;
pub mod mutation_tracker;
pub mod network_snapshots;
pub mod performance;
pub mod refresh;
pub mod storage_explorer;
pub mod toolset;
pub mod view;

pub use error_timeline::{ErrorTimeline, ERROR_TIMELINE_ID};
pub use mutation_tracker::{MutationTracker, MUTATION_TRACKER_ID};
pub use network_snapshots::{NetworkSnapshots, NETWORK_SNAPSHOTS_ID};
pub use performance::{
    PerformanceHeatmap, PerformanceReport, PerformanceSummary, ResourceTiming, WaterfallBar,
    PERFORMANCE_HEATMAP_ID, PERFORMANCE_PROBE,
};
pub use refresh::{PollHandle, RefreshSettings, TelemetryFeed, TRACKING_PERSISTS_NOTE};
pub use storage_explorer::{StorageExplorer, STORAGE_EXPLORER_ID};
pub use toolset::{BuiltinTools, ToolSettings};
