//! Instrumentation bridge between the devtools panel and an instrumented page.
//!
//! Everything that crosses into the page goes through [`InstrumentationBridge`]: raw code
//! execution, JSON probes, structured helper calls, collector installation and buffer reads.
//! Pages are reached through the [`ScriptTarget`] trait, implemented for Chromium sessions
//! ([`CdpScriptTarget`]) and for in-memory pages ([`sim::SimulatedPage`]).

pub mod bridge;
pub mod cdp_target;
pub mod error;
pub mod metrics;
pub mod scripts;
pub mod sim;
pub mod storage;
pub mod target;

pub use bridge::{InstallOutcome, InstrumentationBridge};
pub use cdp_target::CdpScriptTarget;
pub use error::BridgeError;
pub use storage::{StorageArea, StorageItems};
pub use target::{FixedTarget, Script, ScriptTarget, TargetError, TargetHandle, TargetResolver};
