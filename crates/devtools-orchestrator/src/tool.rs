use async_trait::async_trait;
use serde::Serialize;
use soulbrowser_core_types::SoulError;

/// Host-agnostic rendering of a tool's content.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ToolView {
    pub title: String,
    pub summary: String,
    pub rows: Vec<String>,
    /// Shown instead of rows when there are none.
    pub empty_message: Option<String>,
    /// Transient status, e.g. the last refresh failure.
    pub status: Option<String>,
}

impl ToolView {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_rows(mut self, rows: Vec<String>) -> Self {
        self.rows = rows;
        self
    }

    /// Only applied when the view has no rows.
    pub fn with_empty_message(mut self, message: impl Into<String>) -> Self {
        if self.rows.is_empty() {
            self.empty_message = Some(message.into());
        }
        self
    }

    pub fn with_status(mut self, status: Option<String>) -> Self {
        self.status = status;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A pluggable panel tool. Every hook is optional; a missing capability is a no-op.
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn icon(&self) -> &str {
        ""
    }

    fn as_init(&self) -> Option<&dyn InitHook> {
        None
    }

    fn as_render(&self) -> Option<&dyn RenderHook> {
        None
    }

    fn as_activate(&self) -> Option<&dyn ActivateHook> {
        None
    }

    fn as_deactivate(&self) -> Option<&dyn DeactivateHook> {
        None
    }
}

pub trait InitHook: Send + Sync {
    fn init(&self) -> Result<(), SoulError>;
}

pub trait RenderHook: Send + Sync {
    fn render(&self) -> ToolView;
}

#[async_trait]
pub trait ActivateHook: Send + Sync {
    async fn on_activate(&self);
}

pub trait DeactivateHook: Send + Sync {
    fn on_deactivate(&self);
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub init: bool,
    pub render: bool,
    pub activate: bool,
    pub deactivate: bool,
}

impl Capabilities {
    pub fn of(tool: &dyn Tool) -> Self {
        Self {
            init: tool.as_init().is_some(),
            render: tool.as_render().is_some(),
            activate: tool.as_activate().is_some(),
            deactivate: tool.as_deactivate().is_some(),
        }
    }
}
