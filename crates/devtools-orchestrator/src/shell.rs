use instrumentation_bridge::TargetHandle;
use parking_lot::RwLock;
use serde::Serialize;
use soulbrowser_core_types::ToolId;

use crate::tool::ToolView;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ToolbarEntry {
    pub id: ToolId,
    pub name: String,
    pub icon: String,
    pub active: bool,
}

/// Where the panel draws. Provided by the host.
pub trait RenderSurface: Send + Sync {
    fn render_toolbar(&self, entries: &[ToolbarEntry]);

    /// `view` is `None` for tools without a render capability.
    fn render_content(&self, tool: &ToolId, view: Option<&ToolView>);

    fn set_visible(&self, _visible: bool) {}
}

/// The host application's notion of "the page the user is looking at".
pub trait HostShell: Send + Sync {
    fn active_target(&self) -> Option<TargetHandle>;
}

/// Host shell whose active target is set explicitly.
#[derive(Default)]
pub struct SwitchableHost {
    current: RwLock<Option<TargetHandle>>,
}

impl SwitchableHost {
    pub fn new(initial: Option<TargetHandle>) -> Self {
        Self {
            current: RwLock::new(initial),
        }
    }

    /// Swap the active target, returning the previous one.
    pub fn set(&self, target: Option<TargetHandle>) -> Option<TargetHandle> {
        std::mem::replace(&mut *self.current.write(), target)
    }
}

impl HostShell for SwitchableHost {
    fn active_target(&self) -> Option<TargetHandle> {
        self.current.read().clone()
    }
}
