use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cdp_adapter::{AdapterError, AdapterErrorKind, CdpTransport, CommandTarget, TransportEvent};
use devtools_tools::{ToolSettings, ERROR_TIMELINE_ID, NETWORK_SNAPSHOTS_ID};
use instrumentation_bridge::sim::{SimulatedBrowser, SimulatedRequest};
use instrumentation_bridge::TargetHandle;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use soulbrowser_devtools::session::{DevtoolsPanel, ReloadWatcher};
use tokio::sync::{mpsc, Mutex};

/// Transport that only delivers events pushed by the test.
struct EventFeed {
    events: Mutex<mpsc::UnboundedReceiver<TransportEvent>>,
}

impl EventFeed {
    fn new() -> (Arc<Self>, mpsc::UnboundedSender<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                events: Mutex::new(rx),
            }),
            tx,
        )
    }
}

#[async_trait]
impl CdpTransport for EventFeed {
    async fn start(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        self.events.lock().await.recv().await
    }

    async fn send_command(
        &self,
        _target: CommandTarget,
        _method: &str,
        _params: Value,
    ) -> Result<Value, AdapterError> {
        Err(AdapterError::new(AdapterErrorKind::Unavailable))
    }
}

fn context_created(session: &str) -> TransportEvent {
    TransportEvent {
        method: "Runtime.executionContextCreated".into(),
        params: json!({ "context": { "id": 2, "auxData": { "isDefault": true, "frameId": "F" } } }),
        session_id: Some(session.into()),
    }
}

#[tokio::test]
async fn panel_reads_the_attached_page() {
    let panel = DevtoolsPanel::new(&ToolSettings::default());
    let browser = SimulatedBrowser::new();
    let first = browser.open_page("https://a.test/");
    let second = browser.open_page("https://b.test/");

    let handle: TargetHandle = first.clone();
    assert!(panel.attach(handle).is_none());
    panel.orchestrator.activate_tool(ERROR_TIMELINE_ID).await;
    let feed = panel.tools.errors.feed();
    feed.start_tracking().await.unwrap();
    first.console_error("from a");
    assert_eq!(feed.refresh().await.len(), 1);

    // Switching pages reads the new page's (empty) buffer.
    let handle: TargetHandle = second.clone();
    assert!(panel.attach(handle).is_some());
    assert!(feed.refresh().await.is_empty());

    panel.detach();
    assert!(feed.refresh().await.is_empty());
    assert_eq!(feed.status().as_deref(), Some("No page attached."));
    panel.shutdown().await;
    assert!(panel.orchestrator.active_tool().is_none());
}

#[tokio::test]
async fn reload_watcher_reinstalls_tracking_collectors() {
    let panel = DevtoolsPanel::new(&ToolSettings::default());
    let browser = SimulatedBrowser::new();
    let page = browser.open_page("https://a.test/");
    let handle: TargetHandle = page.clone();
    panel.attach(handle);

    panel.orchestrator.activate_tool(NETWORK_SNAPSHOTS_ID).await;
    let network = panel.tools.network.feed().clone();
    network.start_tracking().await.unwrap();

    let (transport, events) = EventFeed::new();
    let watcher = ReloadWatcher::spawn(transport, "S1".into(), panel.feeds());

    page.reload();
    // Another session's context is not ours.
    events.send(context_created("S2")).unwrap();
    events.send(context_created("S1")).unwrap();

    let reinstalled = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            page.fetch(SimulatedRequest::get("/probe")).unwrap();
            if !network.refresh().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(reinstalled.is_ok());

    // Feeds that were never tracking stay uninstalled.
    assert_eq!(page.patch_layers().console, 0);
    watcher.shutdown().await;
    panel.shutdown().await;
}
