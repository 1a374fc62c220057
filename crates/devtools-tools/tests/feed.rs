use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use devtools_orchestrator::SwitchableHost;
use devtools_telemetry::{CollectorSpec, ErrorEvent, ErrorKind, MutationKind, TelemetryEvent};
use devtools_tools::{TelemetryFeed, TRACKING_PERSISTS_NOTE};
use instrumentation_bridge::sim::{SimulatedBrowser, SimulatedMutation};
use instrumentation_bridge::{
    FixedTarget, InstrumentationBridge, Script, ScriptTarget, TargetError, TargetHandle,
    TargetResolver,
};
use pretty_assertions::assert_eq;
use serde_json::Value;
use soulbrowser_core_types::TargetId;
use tokio::sync::Semaphore;

/// Target answering buffer reads from a queue, one answer per released permit.
struct GatedTarget {
    id: TargetId,
    gate: Semaphore,
    replies: Mutex<VecDeque<Result<Vec<TelemetryEvent>, String>>>,
    calls: AtomicUsize,
}

impl GatedTarget {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            id: TargetId::from("gated"),
            gate: Semaphore::new(0),
            replies: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        })
    }

    fn open() -> Arc<Self> {
        let target = Self::new();
        target.gate.add_permits(Semaphore::MAX_PERMITS / 2);
        target
    }

    fn reply(&self, reply: Result<Vec<TelemetryEvent>, String>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    fn release(&self, permits: usize) {
        self.gate.add_permits(permits);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScriptTarget for GatedTarget {
    fn id(&self) -> &TargetId {
        &self.id
    }

    async fn evaluate(&self, _script: Script) -> Result<Value, TargetError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|err| TargetError::Transport(err.to_string()))?;
        permit.forget();
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()));
        match reply {
            Ok(events) => Ok(Value::String(serde_json::to_string(&events).unwrap())),
            Err(message) => Err(TargetError::Exception {
                message,
                stack: None,
            }),
        }
    }
}

fn error(timestamp: u64, message: &str) -> TelemetryEvent {
    TelemetryEvent::Error(ErrorEvent {
        timestamp,
        kind: ErrorKind::Error,
        message: message.to_string(),
        url: None,
        line: None,
        col: None,
        stack: None,
    })
}

fn feed_for(target: Arc<GatedTarget>) -> (Arc<FixedTarget>, Arc<TelemetryFeed>) {
    let handle: TargetHandle = target;
    let resolver = Arc::new(FixedTarget(Some(handle)));
    let weak = Arc::downgrade(&resolver);
    let weak: std::sync::Weak<dyn TargetResolver> = weak;
    let bridge = Arc::new(InstrumentationBridge::new(weak));
    let feed = TelemetryFeed::new(bridge, CollectorSpec::errors(), None);
    (resolver, feed)
}

async fn wait_for_calls(target: &GatedTarget, calls: usize) {
    while target.calls() < calls {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn result_landing_after_deactivation_is_dropped() {
    let target = GatedTarget::new();
    let (_resolver, feed) = feed_for(target.clone());

    target.reply(Ok(vec![error(1, "first")]));
    target.release(1);
    assert_eq!(feed.activate().await, vec![error(1, "first")]);

    target.reply(Ok(vec![error(1, "first"), error(2, "late")]));
    let pending = {
        let feed = Arc::clone(&feed);
        tokio::spawn(async move { feed.refresh().await })
    };
    wait_for_calls(&target, 2).await;

    feed.deactivate();
    target.release(1);
    let returned = pending.await.unwrap();

    assert_eq!(returned, vec![error(1, "first")]);
    assert_eq!(feed.snapshot(), vec![error(1, "first")]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn deactivation_from_another_thread_drops_the_pending_result() {
    let target = GatedTarget::new();
    let (_resolver, feed) = feed_for(target.clone());
    target.release(1);
    assert!(feed.activate().await.is_empty());

    target.reply(Ok(vec![error(7, "late")]));
    let pending = {
        let feed = Arc::clone(&feed);
        tokio::spawn(async move { feed.refresh().await })
    };
    wait_for_calls(&target, 2).await;

    let deactivated = {
        let feed = Arc::clone(&feed);
        tokio::spawn(async move { feed.deactivate() })
    };
    deactivated.await.unwrap();
    target.release(1);

    assert!(pending.await.unwrap().is_empty());
    assert!(!feed.is_active());
    assert!(feed.snapshot().is_empty());
}

#[tokio::test(start_paused = true)]
async fn reactivation_wins_over_an_older_refresh() {
    let target = GatedTarget::new();
    let (_resolver, feed) = feed_for(target.clone());
    target.release(1);
    feed.activate().await;

    target.reply(Ok(vec![error(5, "stale")]));
    target.reply(Ok(vec![error(9, "fresh")]));
    let stale = {
        let feed = Arc::clone(&feed);
        tokio::spawn(async move { feed.refresh().await })
    };
    wait_for_calls(&target, 2).await;

    feed.deactivate();
    let fresh = {
        let feed = Arc::clone(&feed);
        tokio::spawn(async move { feed.activate().await })
    };
    wait_for_calls(&target, 3).await;
    target.release(1);
    stale.await.unwrap();
    assert!(feed.snapshot().is_empty());

    target.release(1);
    assert_eq!(fresh.await.unwrap(), vec![error(9, "fresh")]);
    assert_eq!(feed.snapshot(), vec![error(9, "fresh")]);
}

#[tokio::test]
async fn refresh_replaces_the_cache_wholesale() {
    let target = GatedTarget::open();
    let (_resolver, feed) = feed_for(target.clone());
    target.reply(Ok(vec![error(1, "a"), error(2, "b")]));
    target.reply(Ok(vec![error(3, "c")]));

    assert_eq!(feed.activate().await.len(), 2);
    assert_eq!(feed.refresh().await, vec![error(3, "c")]);
}

#[tokio::test]
async fn failed_refresh_empties_the_cache() {
    let target = GatedTarget::open();
    let (_resolver, feed) = feed_for(target.clone());
    target.reply(Ok(vec![error(1, "a")]));
    target.reply(Err("ReferenceError: boom".to_string()));
    target.reply(Ok(vec![error(1, "a")]));
    let mut updates = feed.updates();

    feed.activate().await;
    assert!(feed.refresh().await.is_empty());
    assert_eq!(
        feed.status().as_deref(),
        Some("Refresh failed: execution failed: ReferenceError: boom")
    );
    assert!(updates.has_changed().unwrap());
    updates.borrow_and_update();

    assert_eq!(feed.refresh().await.len(), 1);
    assert!(feed.status().is_none());
    assert!(updates.has_changed().unwrap());
}

#[tokio::test(start_paused = true)]
async fn polling_follows_tracking_and_activation() {
    let browser = SimulatedBrowser::new();
    let page = browser.open_page("https://a.test/");
    let host = Arc::new(SwitchableHost::default());
    let handle: TargetHandle = page.clone();
    host.set(Some(handle.clone()));

    let resolver: Arc<dyn TargetResolver> = Arc::new(HostResolver(host.clone()));
    let bridge = Arc::new(InstrumentationBridge::new(Arc::downgrade(&resolver)));
    let feed = TelemetryFeed::new(
        bridge,
        CollectorSpec::mutations(),
        Some(Duration::from_millis(1000)),
    );

    feed.activate().await;
    feed.start_tracking().await.unwrap();
    assert!(feed.is_polling());

    page.mutate(SimulatedMutation::child_list("DIV#app", 1, 0));
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let events = feed.snapshot();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].as_mutation().unwrap().kind, MutationKind::ChildList);

    // Polling keeps going through failures.
    host.set(None);
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert!(feed.snapshot().is_empty());
    assert_eq!(feed.status().as_deref(), Some("No page attached."));
    host.set(Some(handle));
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(feed.snapshot().len(), 1);

    // Inactive feeds skip ticks.
    feed.deactivate();
    let evaluations = page.evaluations();
    tokio::time::sleep(Duration::from_millis(5000)).await;
    assert_eq!(page.evaluations(), evaluations);

    feed.activate().await;
    feed.stop_tracking();
    assert!(!feed.is_polling());
    assert_eq!(feed.status().as_deref(), Some(TRACKING_PERSISTS_NOTE));
    page.mutate(SimulatedMutation::attribute("DIV#app", "class"));
    tokio::time::sleep(Duration::from_millis(5000)).await;
    assert_eq!(feed.snapshot().len(), 1);

    // The page-side observer is still there.
    assert_eq!(feed.refresh().await.len(), 2);
    feed.shutdown().await;
}

struct HostResolver(Arc<SwitchableHost>);

impl TargetResolver for HostResolver {
    fn resolve(&self) -> Option<TargetHandle> {
        use devtools_orchestrator::HostShell;
        self.0.active_target()
    }
}
