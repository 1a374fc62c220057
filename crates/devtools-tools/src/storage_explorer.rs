use std::sync::Arc;

use async_trait::async_trait;
use devtools_orchestrator::{ActivateHook, RenderHook, Tool, ToolView};
use instrumentation_bridge::{BridgeError, InstrumentationBridge, StorageArea, StorageItems};
use parking_lot::Mutex;
use tracing::debug;

pub const STORAGE_EXPLORER_ID: &str = "storage";

struct ExplorerState {
    tab: StorageArea,
    local: StorageItems,
    session: StorageItems,
    status: Option<String>,
}

impl ExplorerState {
    fn items(&self, area: StorageArea) -> &StorageItems {
        match area {
            StorageArea::Local => &self.local,
            StorageArea::Session => &self.session,
        }
    }
}

/// Browse and edit `localStorage` / `sessionStorage` of the page.
pub struct StorageExplorer {
    bridge: Arc<InstrumentationBridge>,
    state: Mutex<ExplorerState>,
}

impl StorageExplorer {
    pub fn new(bridge: Arc<InstrumentationBridge>) -> Self {
        Self {
            bridge,
            state: Mutex::new(ExplorerState {
                tab: StorageArea::Local,
                local: StorageItems::new(),
                session: StorageItems::new(),
                status: None,
            }),
        }
    }

    pub fn select_tab(&self, area: StorageArea) {
        self.state.lock().tab = area;
    }

    pub fn current_tab(&self) -> StorageArea {
        self.state.lock().tab
    }

    /// Items of the selected tab as of the last refresh.
    pub fn items(&self) -> StorageItems {
        let state = self.state.lock();
        state.items(state.tab).clone()
    }

    pub fn items_in(&self, area: StorageArea) -> StorageItems {
        self.state.lock().items(area).clone()
    }

    pub fn status(&self) -> Option<String> {
        self.state.lock().status.clone()
    }

    /// Reload both areas. Any failure empties both.
    pub async fn refresh(&self) -> Result<(), BridgeError> {
        let result = async {
            let local = self.bridge.storage_items(StorageArea::Local).await?;
            let session = self.bridge.storage_items(StorageArea::Session).await?;
            Ok::<_, BridgeError>((local, session))
        }
        .await;

        let mut state = self.state.lock();
        match result {
            Ok((local, session)) => {
                state.local = local;
                state.session = session;
                state.status = None;
                Ok(())
            }
            Err(err) => {
                debug!(target: "devtools-tools", error = %err, "storage refresh failed");
                state.local.clear();
                state.session.clear();
                state.status = Some(format!("Storage refresh failed: {err}"));
                Err(err)
            }
        }
    }

    /// Write `key` in the selected area. Blank keys are ignored.
    pub async fn set_item(&self, key: &str, value: &str) -> Result<(), BridgeError> {
        let key = key.trim();
        if key.is_empty() {
            return Ok(());
        }
        let area = self.current_tab();
        self.mutate(self.bridge.set_storage_item(area, key, value).await)
            .await
    }

    pub async fn remove_item(&self, key: &str) -> Result<(), BridgeError> {
        let area = self.current_tab();
        self.mutate(self.bridge.remove_storage_item(area, key).await)
            .await
    }

    /// Remove every item of the selected area.
    pub async fn clear_area(&self) -> Result<(), BridgeError> {
        let area = self.current_tab();
        self.mutate(self.bridge.clear_storage(area).await).await
    }

    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.items())
    }

    async fn mutate(&self, outcome: Result<(), BridgeError>) -> Result<(), BridgeError> {
        match outcome {
            Ok(()) => self.refresh().await,
            Err(err) => {
                let mut state = self.state.lock();
                state.local.clear();
                state.session.clear();
                state.status = Some(format!("Storage update failed: {err}"));
                Err(err)
            }
        }
    }
}

impl Tool for StorageExplorer {
    fn name(&self) -> &str {
        "Storage Explorer"
    }

    fn icon(&self) -> &str {
        "💾"
    }

    fn as_render(&self) -> Option<&dyn RenderHook> {
        Some(self)
    }

    fn as_activate(&self) -> Option<&dyn ActivateHook> {
        Some(self)
    }
}

impl RenderHook for StorageExplorer {
    fn render(&self) -> ToolView {
        let (tab, items, status) = {
            let state = self.state.lock();
            (state.tab, state.items(state.tab).clone(), state.status.clone())
        };
        let rows = items
            .iter()
            .map(|(key, value)| format!("{key} = {value}"))
            .collect();
        ToolView::new(self.name())
            .with_summary(format!("{tab}Storage: {} items", items.len()))
            .with_rows(rows)
            .with_empty_message("No items found")
            .with_status(status)
    }
}

#[async_trait]
impl ActivateHook for StorageExplorer {
    async fn on_activate(&self) {
        let _ = self.refresh().await;
    }
}
