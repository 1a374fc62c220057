use clap::Subcommand;

use super::perf::PerfArgs;
use super::probe::ProbeArgs;
use super::storage::StorageArgs;
use super::watch::WatchArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// List page targets
    Targets,

    /// Execute JavaScript in the attached page
    Probe(ProbeArgs),

    /// Install a collector and stream its events as JSON lines
    Watch(WatchArgs),

    /// Report navigation timings and slow resources
    Perf(PerfArgs),

    /// Inspect or edit localStorage/sessionStorage
    Storage(StorageArgs),
}
