use std::collections::HashMap;
use std::sync::{Arc, Weak};

use instrumentation_bridge::{TargetHandle, TargetResolver};
use parking_lot::RwLock;
use serde::Serialize;
use soulbrowser_core_types::ToolId;
use tracing::{debug, info};

use crate::errors::OrchestratorError;
use crate::shell::{HostShell, RenderSurface, ToolbarEntry};
use crate::tool::{Capabilities, Tool};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum PanelState {
    Inactive,
    Active(ToolId),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ToolDescriptor {
    pub id: ToolId,
    pub name: String,
    pub icon: String,
    pub capabilities: Capabilities,
    pub initialized: bool,
    pub active: bool,
}

struct Entry {
    descriptor: ToolDescriptor,
    tool: Arc<dyn Tool>,
}

struct Inner {
    order: Vec<ToolId>,
    entries: HashMap<ToolId, Entry>,
    state: PanelState,
    visible: bool,
    surface: Option<Arc<dyn RenderSurface>>,
}

impl Inner {
    fn toolbar(&self) -> Vec<ToolbarEntry> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .map(|entry| ToolbarEntry {
                id: entry.descriptor.id.clone(),
                name: entry.descriptor.name.clone(),
                icon: entry.descriptor.icon.clone(),
                active: entry.descriptor.active,
            })
            .collect()
    }

    fn active_id(&self) -> Option<&ToolId> {
        match &self.state {
            PanelState::Active(id) => Some(id),
            PanelState::Inactive => None,
        }
    }
}

/// Owns the tool registry and the single-active-tool state machine.
///
/// Locks are only held for bookkeeping; tool hooks always run with no lock held so that a hook
/// may call back into the orchestrator.
pub struct ToolOrchestrator {
    shell: Arc<dyn HostShell>,
    inner: RwLock<Inner>,
}

impl ToolOrchestrator {
    pub fn new(shell: Arc<dyn HostShell>) -> Self {
        Self {
            shell,
            inner: RwLock::new(Inner {
                order: Vec::new(),
                entries: HashMap::new(),
                state: PanelState::Inactive,
                visible: false,
                surface: None,
            }),
        }
    }

    /// Weak resolver handle for an [`InstrumentationBridge`](instrumentation_bridge::InstrumentationBridge).
    pub fn resolver(self: &Arc<Self>) -> Weak<dyn TargetResolver> {
        let weak: Weak<ToolOrchestrator> = Arc::downgrade(self);
        weak
    }

    /// Store `tool` under `id`. A second registration replaces the first outright but keeps its
    /// toolbar position; if the replaced tool was active it is deactivated first.
    pub fn register(&self, id: impl Into<ToolId>, tool: Arc<dyn Tool>) {
        let id = id.into();
        let descriptor = ToolDescriptor {
            id: id.clone(),
            name: tool.name().to_string(),
            icon: tool.icon().to_string(),
            capabilities: Capabilities::of(tool.as_ref()),
            initialized: false,
            active: false,
        };

        let replaced_active = {
            let mut inner = self.inner.write();
            let was_active = inner.active_id() == Some(&id);
            let previous = inner.entries.insert(id.clone(), Entry { descriptor, tool });
            if previous.is_none() {
                inner.order.push(id.clone());
            }
            if was_active {
                inner.state = PanelState::Inactive;
            }
            previous.filter(|_| was_active).map(|entry| entry.tool)
        };

        if let Some(old) = replaced_active {
            if let Some(hook) = old.as_deactivate() {
                hook.on_deactivate();
            }
        }
        info!(target: "devtools-orchestrator", tool = %id, "tool registered");
    }

    /// Bind to `surface`, draw the toolbar and run every `init` hook in registration order.
    /// Calling again re-initializes every tool.
    pub fn initialize_panel(&self, surface: Arc<dyn RenderSurface>) -> Result<(), OrchestratorError> {
        let (tools, toolbar) = {
            let mut inner = self.inner.write();
            inner.surface = Some(Arc::clone(&surface));
            let tools: Vec<(ToolId, Arc<dyn Tool>)> = inner
                .order
                .iter()
                .filter_map(|id| inner.entries.get(id))
                .map(|entry| (entry.descriptor.id.clone(), Arc::clone(&entry.tool)))
                .collect();
            (tools, inner.toolbar())
        };
        surface.render_toolbar(&toolbar);

        for (id, tool) in tools {
            let Some(hook) = tool.as_init() else {
                continue;
            };
            hook.init().map_err(|source| OrchestratorError::Init {
                tool: id.clone(),
                source,
            })?;
            if let Some(entry) = self.inner.write().entries.get_mut(&id) {
                entry.descriptor.initialized = true;
            }
        }
        debug!(target: "devtools-orchestrator", "panel initialized");
        Ok(())
    }

    /// Make `id` the active tool. Unknown ids are ignored.
    pub async fn activate_tool(&self, id: &str) {
        let key = ToolId::from(id);
        let (tool, outgoing) = {
            let mut inner = self.inner.write();
            let Some(tool) = inner.entries.get(&key).map(|entry| Arc::clone(&entry.tool)) else {
                debug!(target: "devtools-orchestrator", tool = id, "ignoring unknown tool");
                return;
            };
            let outgoing = inner
                .active_id()
                .filter(|current| **current != key)
                .and_then(|current| inner.entries.get(current))
                .map(|entry| Arc::clone(&entry.tool));
            inner.state = PanelState::Active(key.clone());
            for entry in inner.entries.values_mut() {
                entry.descriptor.active = entry.descriptor.id == key;
            }
            (tool, outgoing)
        };

        if let Some(outgoing) = outgoing {
            if let Some(hook) = outgoing.as_deactivate() {
                hook.on_deactivate();
            }
        }

        info!(target: "devtools-orchestrator", tool = id, "tool activated");
        self.render_active();

        if let Some(hook) = tool.as_activate() {
            hook.on_activate().await;
        }
        // Another activation may have won while the hook was running.
        if self.active_tool().as_ref() == Some(&key) {
            self.render_active();
        }
    }

    /// Leave the active state without selecting another tool.
    pub fn deactivate(&self) {
        let outgoing = {
            let mut inner = self.inner.write();
            let Some(current) = inner.active_id().cloned() else {
                return;
            };
            inner.state = PanelState::Inactive;
            let entry = inner.entries.get_mut(&current);
            entry.map(|entry| {
                entry.descriptor.active = false;
                Arc::clone(&entry.tool)
            })
        };
        if let Some(tool) = outgoing {
            if let Some(hook) = tool.as_deactivate() {
                hook.on_deactivate();
            }
        }
        let (surface, toolbar) = {
            let inner = self.inner.read();
            (inner.surface.clone(), inner.toolbar())
        };
        if let Some(surface) = surface {
            surface.render_toolbar(&toolbar);
        }
        debug!(target: "devtools-orchestrator", "panel deactivated");
    }

    /// Flip visibility. Opening with nothing active selects the first registered tool.
    pub async fn toggle_visibility(&self) -> bool {
        let (visible, first) = {
            let mut inner = self.inner.write();
            inner.visible = !inner.visible;
            let first = if inner.visible && inner.active_id().is_none() {
                inner.order.first().cloned()
            } else {
                None
            };
            (inner.visible, first)
        };
        if let Some(surface) = self.surface() {
            surface.set_visible(visible);
        }
        info!(target: "devtools-orchestrator", visible, "panel visibility toggled");

        if let Some(first) = first {
            self.activate_tool(first.as_str()).await;
        }
        visible
    }

    /// Redraw the active tool's content.
    pub fn render_active(&self) {
        let (surface, toolbar, active) = {
            let inner = self.inner.read();
            let active = inner
                .active_id()
                .and_then(|id| inner.entries.get(id))
                .map(|entry| (entry.descriptor.id.clone(), Arc::clone(&entry.tool)));
            (inner.surface.clone(), inner.toolbar(), active)
        };
        let (Some(surface), Some((id, tool))) = (surface, active) else {
            return;
        };
        surface.render_toolbar(&toolbar);
        let view = tool.as_render().map(|hook| hook.render());
        surface.render_content(&id, view.as_ref());
    }

    pub fn get_active_target_context(&self) -> Option<TargetHandle> {
        self.shell.active_target()
    }

    pub fn active_tool(&self) -> Option<ToolId> {
        self.inner.read().active_id().cloned()
    }

    pub fn tool(&self, id: &str) -> Option<Arc<dyn Tool>> {
        self.inner
            .read()
            .entries
            .get(&ToolId::from(id))
            .map(|entry| Arc::clone(&entry.tool))
    }

    pub fn descriptor(&self, id: &str) -> Option<ToolDescriptor> {
        self.inner
            .read()
            .entries
            .get(&ToolId::from(id))
            .map(|entry| entry.descriptor.clone())
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.entries.get(id))
            .map(|entry| entry.descriptor.clone())
            .collect()
    }

    pub fn is_visible(&self) -> bool {
        self.inner.read().visible
    }

    pub fn state(&self) -> PanelState {
        self.inner.read().state.clone()
    }

    fn surface(&self) -> Option<Arc<dyn RenderSurface>> {
        self.inner.read().surface.clone()
    }
}

impl TargetResolver for ToolOrchestrator {
    fn resolve(&self) -> Option<TargetHandle> {
        self.get_active_target_context()
    }
}
