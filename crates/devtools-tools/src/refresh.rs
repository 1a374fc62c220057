//! Polling refresh shared by the telemetry tools.
//!
//! A [`TelemetryFeed`] owns one collector's host-side cache. Every refresh replaces the cache
//! wholesale with the page buffer; a failed refresh empties it. Results that arrive after the
//! feed was deactivated or re-activated are dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use devtools_telemetry::{CollectorSpec, TelemetryEvent};
use instrumentation_bridge::{BridgeError, InstallOutcome, InstrumentationBridge};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shown after tracking stops: the page keeps collecting until it reloads.
pub const TRACKING_PERSISTS_NOTE: &str =
    "Tracking paused. Collectors stay installed in the page until it reloads.";

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshSettings {
    pub interval_ms: u64,
    /// Poll the error and network feeds too. The mutation feed always polls while tracking.
    pub poll_all: bool,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
            poll_all: false,
        }
    }
}

impl RefreshSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

/// Activation and cache live under one lock so a refresh result is checked and applied atomically.
#[derive(Default)]
struct FeedState {
    generation: u64,
    active: bool,
    cache: Vec<TelemetryEvent>,
    status: Option<String>,
}

pub struct TelemetryFeed {
    bridge: Arc<InstrumentationBridge>,
    spec: CollectorSpec,
    poll_interval: Option<Duration>,
    tracking: AtomicBool,
    state: Mutex<FeedState>,
    poll: Mutex<Option<PollHandle>>,
    updates: watch::Sender<u64>,
}

impl TelemetryFeed {
    /// `poll_interval` of `None` disables the background loop; the feed then refreshes only on
    /// activation and explicit calls.
    pub fn new(
        bridge: Arc<InstrumentationBridge>,
        spec: CollectorSpec,
        poll_interval: Option<Duration>,
    ) -> Arc<Self> {
        let (updates, _) = watch::channel(0);
        Arc::new(Self {
            bridge,
            spec,
            poll_interval,
            tracking: AtomicBool::new(false),
            state: Mutex::new(FeedState::default()),
            poll: Mutex::new(None),
            updates,
        })
    }

    pub fn spec(&self) -> &CollectorSpec {
        &self.spec
    }

    pub fn bridge(&self) -> &Arc<InstrumentationBridge> {
        &self.bridge
    }

    /// Mark the feed active and pull the current buffer. Polling resumes if tracking is on.
    pub async fn activate(self: &Arc<Self>) -> Vec<TelemetryEvent> {
        {
            let mut state = self.state.lock();
            state.generation += 1;
            state.active = true;
        }
        if self.is_tracking() {
            self.ensure_polling();
        }
        self.refresh().await
    }

    /// In-flight refreshes started before this call are discarded when they land.
    pub fn deactivate(&self) {
        let mut state = self.state.lock();
        state.active = false;
        state.generation += 1;
    }

    /// Install the collector (a no-op if already present) and start polling.
    pub async fn start_tracking(self: &Arc<Self>) -> Result<InstallOutcome, BridgeError> {
        match self.bridge.install_collector(&self.spec).await {
            Ok(outcome) => {
                self.tracking.store(true, Ordering::SeqCst);
                self.state.lock().status = None;
                self.ensure_polling();
                info!(
                    target: "devtools-tools",
                    collector = self.spec.kind.slot_name(),
                    ?outcome,
                    "tracking started"
                );
                self.notify();
                Ok(outcome)
            }
            Err(err) => {
                warn!(
                    target: "devtools-tools",
                    collector = self.spec.kind.slot_name(),
                    error = %err,
                    "failed to start tracking"
                );
                self.state.lock().status = Some(format!("Failed to start tracking: {err}"));
                self.notify();
                Err(err)
            }
        }
    }

    /// Stop the local poll loop. The page-side collector keeps running.
    pub fn stop_tracking(&self) {
        self.tracking.store(false, Ordering::SeqCst);
        let handle = self.poll.lock().take();
        drop(handle);
        self.state.lock().status = Some(TRACKING_PERSISTS_NOTE.to_string());
        self.notify();
        debug!(target: "devtools-tools", collector = self.spec.kind.slot_name(), "tracking stopped");
    }

    /// Replace the cache with the page buffer and return the cache as it stands afterwards.
    pub async fn refresh(&self) -> Vec<TelemetryEvent> {
        let generation = self.state.lock().generation;
        let result = self.bridge.get_buffer(&self.spec.slot).await;

        match self.apply_refresh(generation, result) {
            Some(snapshot) => {
                self.notify();
                snapshot
            }
            None => {
                debug!(
                    target: "devtools-tools",
                    collector = self.spec.kind.slot_name(),
                    "discarding stale refresh"
                );
                self.snapshot()
            }
        }
    }

    /// Store `result` if the feed is still in the activation that `generation` was read from.
    fn apply_refresh(
        &self,
        generation: u64,
        result: Result<Vec<TelemetryEvent>, BridgeError>,
    ) -> Option<Vec<TelemetryEvent>> {
        let mut state = self.state.lock();
        if !state.active || state.generation != generation {
            return None;
        }
        match result {
                Ok(events) => {
                state.cache = events;
                if state.status.as_deref() != Some(TRACKING_PERSISTS_NOTE) {
                    state.status = None;
                }
            }
            Err(err) => {
                debug!(
                    target: "devtools-tools",
                    collector = self.spec.kind.slot_name(),
                    error = %err,
                    "refresh failed"
                );
                state.cache.clear();
                state.status = Some(refresh_status(&err));
            }
        }
        Some(state.cache.clone())
    }

    /// Empty the page buffer and the local cache.
    pub async fn clear(&self) -> Result<(), BridgeError> {
        let result = self.bridge.clear_buffer(&self.spec.slot).await;
        {
            let mut state = self.state.lock();
            state.cache.clear();
            if let Err(err) = &result {
                state.status = Some(refresh_status(err));
            }
        }
        self.notify();
        result
    }

    pub fn snapshot(&self) -> Vec<TelemetryEvent> {
        self.state.lock().cache.clone()
    }

    pub fn status(&self) -> Option<String> {
        self.state.lock().status.clone()
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking.load(Ordering::SeqCst)
    }

    pub fn is_polling(&self) -> bool {
        self.poll.lock().is_some()
    }

    /// Receiver bumped after every cache or status change.
    pub fn updates(&self) -> watch::Receiver<u64> {
        self.updates.subscribe()
    }

    /// Stop polling and wait for the loop to exit.
    pub async fn shutdown(&self) {
        let handle = self.poll.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.shutdown().await {
                warn!(target: "devtools-tools", error = %err, "poll task ended abnormally");
            }
        }
    }

    fn ensure_polling(self: &Arc<Self>) {
        let Some(period) = self.poll_interval else {
            return;
        };
        let mut poll = self.poll.lock();
        if poll.is_none() {
            *poll = Some(PollHandle::spawn(Arc::downgrade(self), period));
        }
    }

    fn notify(&self) {
        self.updates.send_modify(|revision| *revision += 1);
    }
}

fn refresh_status(err: &BridgeError) -> String {
    match err {
        BridgeError::NoTarget => "No page attached.".to_string(),
        other => format!("Refresh failed: {other}"),
    }
}

/// Background loop refreshing a feed on a fixed period.
pub struct PollHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    fn spawn(feed: Weak<TelemetryFeed>, period: Duration) -> Self {
        let cancel = CancellationToken::new();
        let loop_token = cancel.clone();
        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => {
                        break;
                    }
                    _ = ticker.tick() => {
                        let Some(feed) = feed.upgrade() else {
                            break;
                        };
                        if feed.is_active() {
                            feed.refresh().await;
                        }
                    }
                }
            }
        });
        Self {
            cancel,
            task: Some(task),
        }
    }

    pub async fn shutdown(mut self) -> Result<(), tokio::task::JoinError> {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            match task.await {
                Ok(_) => Ok(()),
                Err(err) if err.is_cancelled() => Ok(()),
                Err(err) => Err(err),
            }
        } else {
            Ok(())
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
