use std::sync::Arc;

use anyhow::{Context, Result};
use cdp_adapter::CdpTransport;
use devtools_tools::ToolSettings;
use instrumentation_bridge::{CdpScriptTarget, TargetHandle};
use tokio::sync::OnceCell;
use tracing::info;

use soulbrowser_devtools::session::{connect, open_target, DevtoolsPanel, ReloadWatcher};
use soulbrowser_devtools::DevtoolsConfig;

use super::output::OutputFormat;

pub struct CliContext {
    config: Arc<DevtoolsConfig>,
    target: Option<String>,
    output: OutputFormat,
    transport: OnceCell<Arc<dyn CdpTransport>>,
}

impl CliContext {
    pub fn new(config: DevtoolsConfig, target: Option<String>, output: OutputFormat) -> Self {
        Self {
            config: Arc::new(config),
            target,
            output,
            transport: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &DevtoolsConfig {
        self.config.as_ref()
    }

    pub fn output(&self) -> OutputFormat {
        self.output
    }

    pub async fn transport(&self) -> Result<Arc<dyn CdpTransport>> {
        self.transport
            .get_or_try_init(|| async {
                connect(self.config.cdp.clone())
                    .await
                    .context("failed to connect to Chromium")
            })
            .await
            .map(Arc::clone)
    }

    /// Attach a fresh panel to the selected page.
    pub async fn open_panel(&self, settings: &ToolSettings) -> Result<PanelSession> {
        let transport = self.transport().await?;
        let target = open_target(transport.clone(), self.target.as_deref())
            .await
            .context("failed to attach to page target")?;
        let panel = DevtoolsPanel::new(settings);
        let handle: TargetHandle = target.clone();
        panel.attach(handle);
        let watcher =
            ReloadWatcher::spawn(transport, target.session_id().to_string(), panel.feeds());
        info!(session = target.session_id(), "devtools panel attached");
        Ok(PanelSession {
            panel,
            target,
            watcher: Some(watcher),
        })
    }
}

pub struct PanelSession {
    pub panel: DevtoolsPanel,
    pub target: Arc<CdpScriptTarget>,
    watcher: Option<ReloadWatcher>,
}

impl PanelSession {
    pub async fn close(mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.shutdown().await;
        }
        self.panel.shutdown().await;
    }
}
