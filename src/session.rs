//! Wiring between a Chromium page and the devtools panel.

use std::sync::Arc;

use cdp_adapter::{
    create_page_target, list_page_targets, AdapterError, AdapterErrorKind, CdpConfig,
    CdpTransport, ChromiumTransport, PageTarget, TransportEvent,
};
use devtools_orchestrator::{SwitchableHost, ToolOrchestrator};
use devtools_tools::{BuiltinTools, TelemetryFeed, ToolSettings};
use instrumentation_bridge::{CdpScriptTarget, InstrumentationBridge, TargetHandle};
use serde_json::Value;
use soulbrowser_core_types::TargetId;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const BLANK_PAGE: &str = "about:blank";

/// Orchestrator, bridge and built-in tools sharing one switchable host.
pub struct DevtoolsPanel {
    pub host: Arc<SwitchableHost>,
    pub orchestrator: Arc<ToolOrchestrator>,
    pub bridge: Arc<InstrumentationBridge>,
    pub tools: BuiltinTools,
}

impl DevtoolsPanel {
    pub fn new(settings: &ToolSettings) -> Self {
        let host = Arc::new(SwitchableHost::default());
        let orchestrator = Arc::new(ToolOrchestrator::new(host.clone()));
        let bridge = Arc::new(InstrumentationBridge::new(orchestrator.resolver()));
        let tools = BuiltinTools::new(bridge.clone(), settings);
        tools.register_all(&orchestrator);
        Self {
            host,
            orchestrator,
            bridge,
            tools,
        }
    }

    /// Point the panel at `target`, returning the previously attached page.
    pub fn attach(&self, target: TargetHandle) -> Option<TargetHandle> {
        self.host.set(Some(target))
    }

    pub fn detach(&self) -> Option<TargetHandle> {
        self.host.set(None)
    }

    pub fn feeds(&self) -> Vec<Arc<TelemetryFeed>> {
        vec![
            self.tools.errors.feed().clone(),
            self.tools.mutations.feed().clone(),
            self.tools.network.feed().clone(),
        ]
    }

    pub async fn shutdown(&self) {
        self.orchestrator.deactivate();
        self.tools.shutdown().await;
        self.detach();
    }
}

/// Launch or connect to Chromium and start the transport.
pub async fn connect(cfg: CdpConfig) -> Result<Arc<dyn CdpTransport>, AdapterError> {
    let transport: Arc<dyn CdpTransport> = Arc::new(ChromiumTransport::new(cfg));
    transport.start().await?;
    Ok(transport)
}

/// `wanted` by id, else the first page. `None` when neither exists.
pub fn pick_target(pages: &[PageTarget], wanted: Option<&str>) -> Option<TargetId> {
    match wanted {
        Some(id) => pages
            .iter()
            .find(|page| page.target_id.as_str() == id)
            .map(|page| page.target_id.clone()),
        None => pages.first().map(|page| page.target_id.clone()),
    }
}

/// Attach to the requested page. Without a request and without pages, a blank page is opened.
pub async fn open_target(
    transport: Arc<dyn CdpTransport>,
    wanted: Option<&str>,
) -> Result<Arc<CdpScriptTarget>, AdapterError> {
    let pages = list_page_targets(transport.as_ref()).await?;
    let id = match pick_target(&pages, wanted) {
        Some(id) => id,
        None => match wanted {
            Some(id) => {
                return Err(AdapterError::new(AdapterErrorKind::TargetNotFound).with_hint(id));
            }
            None => create_page_target(transport.as_ref(), BLANK_PAGE).await?,
        },
    };
    info!(target_id = %id, "attaching devtools panel");
    let target = CdpScriptTarget::attach(transport, id).await?;
    Ok(Arc::new(target))
}

/// True for a fresh default execution context created on `session`, i.e. after a reload or
/// navigation wiped page globals.
pub fn is_fresh_default_context(event: &TransportEvent, session: &str) -> bool {
    event.method == "Runtime.executionContextCreated"
        && event.session_id.as_deref() == Some(session)
        && event
            .params
            .pointer("/context/auxData/isDefault")
            .and_then(Value::as_bool)
            .unwrap_or(false)
}

/// Background task that reinstalls collectors for tracking feeds whenever the page loses them.
pub struct ReloadWatcher {
    cancel: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl ReloadWatcher {
    pub fn spawn(
        transport: Arc<dyn CdpTransport>,
        session: String,
        feeds: Vec<Arc<TelemetryFeed>>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let join = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => break,
                    event = transport.next_event() => event,
                };
                let Some(event) = event else {
                    debug!("cdp event stream closed");
                    break;
                };
                if event.method == "Runtime.executionContextsCleared"
                    && event.session_id.as_deref() == Some(session.as_str())
                {
                    debug!("page contexts cleared");
                    continue;
                }
                if !is_fresh_default_context(&event, &session) {
                    continue;
                }
                for feed in feeds.iter().filter(|feed| feed.is_tracking()) {
                    match feed.start_tracking().await {
                        Ok(outcome) => {
                            info!(collector = ?feed.spec().kind, ?outcome, "collector reinstalled")
                        }
                        Err(err) => {
                            warn!(collector = ?feed.spec().kind, ?err, "collector reinstall failed")
                        }
                    }
                }
            }
        });
        Self {
            cancel,
            join: Some(join),
        }
    }

    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

impl Drop for ReloadWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take() {
            join.abort();
        }
    }
}
