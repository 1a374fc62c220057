//! Tool orchestration for the devtools panel: a registry of capability-driven tools, a
//! single-active-tool state machine, and the host-facing seams ([`RenderSurface`],
//! [`HostShell`]) through which tools are drawn and the current page is found.

pub mod errors;
pub mod orchestrator;
pub mod shell;
pub mod tool;

pub use errors::OrchestratorError;
pub use orchestrator::{PanelState, ToolDescriptor, ToolOrchestrator};
pub use shell::{HostShell, RenderSurface, SwitchableHost, ToolbarEntry};
pub use tool::{ActivateHook, Capabilities, DeactivateHook, InitHook, RenderHook, Tool, ToolView};
