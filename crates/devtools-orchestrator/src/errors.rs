use soulbrowser_core_types::{SoulError, ToolId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("tool '{tool}' failed to initialize: {source}")]
    Init {
        tool: ToolId,
        #[source]
        source: SoulError,
    },
}
