//! In-memory pages for running the panel without a browser.
//!
//! A [`SimulatedPage`] understands the bridge's helper functions and the three collector
//! fragments by their source text, and models what installing them does to a real page: every
//! install that passes the marker check adds one more wrapper layer around the patched native
//! functions, and every layer records the events flowing through it. Page activity (requests,
//! console output, DOM changes) is driven from the host through methods on the page.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use devtools_telemetry::{
    truncate_body, CollectorBuffer, CollectorKind, CollectorSlot, ErrorEvent, ErrorKind,
    MutationEvent, MutationKind, NetworkEvent, NetworkTransport, TelemetryEvent,
    DEFAULT_BODY_LIMIT,
};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use soulbrowser_core_types::TargetId;
use tracing::debug;

use crate::scripts;
use crate::storage::StorageArea;
use crate::target::{Script, ScriptTarget, TargetError};

const CLOCK_START_MS: u64 = 1_700_000_000_000;

/// What a scripted probe does when the page evaluates it.
#[derive(Clone, Debug, PartialEq)]
pub enum ProbeOutcome {
    Return(Value),
    Undefined,
    /// Raw text as the completion value, JSON or not.
    Text(String),
    Throw(String),
}

/// Number of wrapper layers currently installed around each patched native.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PatchLayers {
    pub console: usize,
    pub onerror: usize,
    pub fetch: usize,
    pub xhr_open: usize,
    pub mutation_observers: usize,
}

#[derive(Clone, Debug)]
pub struct SimulatedRequest {
    pub method: String,
    pub url: String,
    pub status: u16,
    pub status_text: String,
    pub body: Option<String>,
    pub latency_ms: u64,
    pub failure: Option<String>,
}

impl SimulatedRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".into(),
            url: url.into(),
            status: 200,
            status_text: "OK".into(),
            body: None,
            latency_ms: 10,
            failure: None,
        }
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn status(mut self, status: u16, text: impl Into<String>) -> Self {
        self.status = status;
        self.status_text = text.into();
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// The request rejects with `message` before any response.
    pub fn fails(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }
}

#[derive(Clone, Debug)]
pub struct SimulatedMutation {
    pub kind: MutationKind,
    pub target: String,
    pub added: u32,
    pub removed: u32,
    pub attribute: Option<String>,
}

impl SimulatedMutation {
    pub fn child_list(target: impl Into<String>, added: u32, removed: u32) -> Self {
        Self {
            kind: MutationKind::ChildList,
            target: target.into(),
            added,
            removed,
            attribute: None,
        }
    }

    pub fn attribute(target: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: MutationKind::Attributes,
            target: target.into(),
            added: 0,
            removed: 0,
            attribute: Some(name.into()),
        }
    }
}

#[derive(Clone, Debug)]
enum Global {
    Value(Value),
    Events(CollectorBuffer<TelemetryEvent>),
}

impl Global {
    fn truthy(&self) -> bool {
        match self {
            Global::Events(_) => true,
            Global::Value(value) => match value {
                Value::Null => false,
                Value::Bool(flag) => *flag,
                Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
                Value::String(text) => !text.is_empty(),
                Value::Array(_) | Value::Object(_) => true,
            },
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Global::Value(value) => value.clone(),
            Global::Events(buffer) => {
                Value::Array(buffer.iter().filter_map(|e| serde_json::to_value(e).ok()).collect())
            }
        }
    }
}

/// Install config as the collector fragments receive it.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Layer {
    marker: String,
    buffer: String,
    #[serde(default)]
    capacity: Option<usize>,
    #[serde(default = "default_body_limit")]
    body_limit: usize,
}

fn default_body_limit() -> usize {
    DEFAULT_BODY_LIMIT
}

#[derive(Default)]
struct PageState {
    url: String,
    layers: HashMap<CollectorKind, Vec<Layer>>,
    local: BTreeMap<String, String>,
    session: BTreeMap<String, String>,
    probes: HashMap<String, ProbeOutcome>,
}

struct BrowserShared {
    globals: DashMap<(TargetId, String), Global>,
    clock: AtomicU64,
    pages: Mutex<Vec<Arc<SimulatedPage>>>,
}

/// A set of simulated pages sharing one clock and one global-namespace store.
#[derive(Clone)]
pub struct SimulatedBrowser {
    shared: Arc<BrowserShared>,
}

impl Default for SimulatedBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBrowser {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(BrowserShared {
                globals: DashMap::new(),
                clock: AtomicU64::new(CLOCK_START_MS),
                pages: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn open_page(&self, url: &str) -> Arc<SimulatedPage> {
        let page = Arc::new(SimulatedPage {
            id: TargetId::new(),
            shared: Arc::clone(&self.shared),
            state: Mutex::new(PageState {
                url: url.to_string(),
                ..PageState::default()
            }),
            evaluations: AtomicUsize::new(0),
        });
        self.shared.pages.lock().push(Arc::clone(&page));
        page
    }

    pub fn pages(&self) -> Vec<Arc<SimulatedPage>> {
        self.shared.pages.lock().clone()
    }

    pub fn page(&self, id: &TargetId) -> Option<Arc<SimulatedPage>> {
        self.shared
            .pages
            .lock()
            .iter()
            .find(|page| page.id() == id)
            .cloned()
    }

    pub fn now_ms(&self) -> u64 {
        self.shared.clock.load(Ordering::SeqCst)
    }

    pub fn advance(&self, ms: u64) {
        self.shared.clock.fetch_add(ms, Ordering::SeqCst);
    }
}

pub struct SimulatedPage {
    id: TargetId,
    shared: Arc<BrowserShared>,
    state: Mutex<PageState>,
    evaluations: AtomicUsize,
}

impl SimulatedPage {
    pub fn url(&self) -> String {
        self.state.lock().url.clone()
    }

    /// Number of scripts evaluated so far.
    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::SeqCst)
    }

    pub fn define_probe(&self, code: &str, outcome: ProbeOutcome) {
        self.state
            .lock()
            .probes
            .insert(code.trim().to_string(), outcome);
    }

    pub fn patch_layers(&self) -> PatchLayers {
        let state = self.state.lock();
        let count = |kind| state.layers.get(&kind).map_or(0, Vec::len);
        PatchLayers {
            console: count(CollectorKind::Error),
            onerror: count(CollectorKind::Error),
            fetch: count(CollectorKind::Network),
            xhr_open: count(CollectorKind::Network),
            mutation_observers: count(CollectorKind::Mutation),
        }
    }

    /// A global as page code would see it; buffers come back as JSON arrays.
    pub fn global(&self, name: &str) -> Option<Value> {
        self.shared
            .globals
            .get(&self.key(name))
            .map(|entry| entry.value().to_value())
    }

    /// Page code assigning a global, e.g. clobbering a marker.
    pub fn set_global(&self, name: &str, value: Value) {
        self.shared.globals.insert(self.key(name), Global::Value(value));
    }

    pub fn storage(&self, area: StorageArea) -> BTreeMap<String, String> {
        let state = self.state.lock();
        match area {
            StorageArea::Local => state.local.clone(),
            StorageArea::Session => state.session.clone(),
        }
    }

    pub fn seed_storage(&self, area: StorageArea, key: &str, value: &str) {
        let mut state = self.state.lock();
        store_mut(&mut state, area).insert(key.to_string(), value.to_string());
    }

    pub fn console_error(&self, message: &str) {
        let stack = Some(format!("Error\n    at console.error ({})", self.url()));
        self.record_error(ErrorKind::Error, message, None, stack);
    }

    pub fn console_warn(&self, message: &str) {
        self.record_error(ErrorKind::Warning, message, None, None);
    }

    pub fn throw_uncaught(&self, message: &str, url: &str, line: u32, col: u32) {
        let location = Some((url.to_string(), line, col));
        let stack = Some(format!("{message}\n    at {url}:{line}:{col}"));
        self.record_error(ErrorKind::Uncaught, message, location, stack);
    }

    /// `fetch(request)`; a failing request rejects with its message, as the wrappers rethrow.
    pub fn fetch(&self, request: SimulatedRequest) -> Result<(), String> {
        self.request(NetworkTransport::Fetch, request)
    }

    pub fn xhr(&self, request: SimulatedRequest) -> Result<(), String> {
        self.request(NetworkTransport::Xhr, request)
    }

    pub fn mutate(&self, mutation: SimulatedMutation) {
        let layers = self.layers(CollectorKind::Mutation);
        for layer in &layers {
            let event = TelemetryEvent::Mutation(MutationEvent {
                timestamp: self.stamp(),
                kind: mutation.kind,
                target: mutation.target.clone(),
                added_count: mutation.added,
                removed_count: mutation.removed,
                attribute: mutation.attribute.clone(),
            });
            self.push_event(layer, event);
        }
    }

    /// Navigate in place: globals, patches and observers are gone; storage survives.
    pub fn reload(&self) {
        self.shared.globals.retain(|(id, _), _| id != &self.id);
        self.state.lock().layers.clear();
        debug!(target: "instrumentation-bridge", target_id = %self.id, "simulated reload");
    }

    fn key(&self, name: &str) -> (TargetId, String) {
        (self.id.clone(), name.to_string())
    }

    fn stamp(&self) -> u64 {
        self.shared.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn layers(&self, kind: CollectorKind) -> Vec<Layer> {
        self.state.lock().layers.get(&kind).cloned().unwrap_or_default()
    }

    fn record_error(
        &self,
        kind: ErrorKind,
        message: &str,
        location: Option<(String, u32, u32)>,
        stack: Option<String>,
    ) {
        let layers = self.layers(CollectorKind::Error);
        for layer in &layers {
            let event = TelemetryEvent::Error(ErrorEvent {
                timestamp: self.stamp(),
                kind,
                message: message.to_string(),
                url: location.as_ref().map(|(url, _, _)| url.clone()),
                line: location.as_ref().map(|(_, line, _)| *line),
                col: location.as_ref().map(|(_, _, col)| *col),
                stack: stack.clone(),
            });
            self.push_event(layer, event);
        }
    }

    fn request(&self, transport: NetworkTransport, request: SimulatedRequest) -> Result<(), String> {
        let layers = self.layers(CollectorKind::Network);
        let started = self.shared.clock.load(Ordering::SeqCst);
        let completed =
            self.shared.clock.fetch_add(request.latency_ms, Ordering::SeqCst) + request.latency_ms;

        for layer in &layers {
            let event = match &request.failure {
                Some(message) => NetworkEvent {
                    timestamp: completed,
                    transport,
                    method: request.method.to_ascii_uppercase(),
                    url: request.url.clone(),
                    status: 0,
                    status_text: None,
                    duration_ms: completed - started,
                    response_body_prefix: None,
                    error: Some(message.clone()),
                },
                None => NetworkEvent {
                    timestamp: completed,
                    transport,
                    method: request.method.to_ascii_uppercase(),
                    url: request.url.clone(),
                    status: request.status,
                    status_text: Some(request.status_text.clone()),
                    duration_ms: completed - started,
                    response_body_prefix: request
                        .body
                        .as_deref()
                        .map(|body| truncate_body(body, layer.body_limit)),
                    error: None,
                },
            };
            self.push_event(layer, TelemetryEvent::Network(event));
        }

        match request.failure {
            Some(message) => Err(message),
            None => Ok(()),
        }
    }

    fn push_event(&self, layer: &Layer, event: TelemetryEvent) {
        let mut entry = self
            .shared
            .globals
            .entry(self.key(&layer.buffer))
            .or_insert_with(|| Global::Events(CollectorBuffer::with_capacity(layer.capacity)));
        if !matches!(entry.value(), Global::Events(_)) {
            *entry.value_mut() = Global::Events(CollectorBuffer::with_capacity(layer.capacity));
        }
        if let Global::Events(buffer) = entry.value_mut() {
            buffer.push(event);
        }
    }

    fn marker_set(&self, marker: &str) -> bool {
        self.shared
            .globals
            .get(&self.key(marker))
            .is_some_and(|entry| entry.value().truthy())
    }

    fn run(&self, script: Script) -> Result<Value, TargetError> {
        match script {
            Script::Source(source) => self.run_source(&source),
            Script::Call { function, args } => self.run_call(&function, &args),
        }
    }

    fn run_source(&self, source: &str) -> Result<Value, TargetError> {
        if let Some(body) = scripts::unwrap_json_probe(source) {
            // The page-side JSON.stringify of whatever the body returns.
            return match self.lookup_body(body)? {
                ProbeOutcome::Return(value) => Ok(Value::String(value.to_string())),
                ProbeOutcome::Undefined => Ok(Value::Null),
                ProbeOutcome::Text(text) => Ok(Value::String(text)),
                ProbeOutcome::Throw(message) => Err(thrown(&message)),
            };
        }

        let code = source.trim();
        let probe = self.state.lock().probes.get(code).cloned();
        match probe {
            Some(ProbeOutcome::Return(value)) => Ok(value),
            Some(ProbeOutcome::Undefined) => Ok(Value::Null),
            Some(ProbeOutcome::Text(text)) => Ok(Value::String(text)),
            Some(ProbeOutcome::Throw(message)) => Err(thrown(&message)),
            None => serde_json::from_str::<Value>(code).map_err(|_| unsupported(code)),
        }
    }

    /// Resolve a function body: a scripted probe, or a `return <json literal>` statement.
    fn lookup_body(&self, body: &str) -> Result<ProbeOutcome, TargetError> {
        let body = body.trim();
        if let Some(outcome) = self.state.lock().probes.get(body).cloned() {
            return Ok(outcome);
        }
        let literal = body
            .strip_prefix("return")
            .map(|rest| rest.trim().trim_end_matches(';').trim());
        match literal {
            Some("") | Some("undefined") => Ok(ProbeOutcome::Undefined),
            Some(literal) => serde_json::from_str(literal)
                .map(ProbeOutcome::Return)
                .map_err(|_| unsupported(body)),
            None => Err(unsupported(body)),
        }
    }

    fn run_call(&self, function: &str, args: &[Value]) -> Result<Value, TargetError> {
        match function {
            scripts::READ_BUFFER => {
                let slot = slot_arg(args)?;
                if !self.marker_set(&slot.marker) {
                    return Ok(Value::String("[]".into()));
                }
                let buffer = match self.shared.globals.get(&self.key(&slot.buffer)) {
                    Some(entry) => match entry.value().to_value() {
                        Value::Array(items) => Value::Array(items),
                        _ => Value::Array(Vec::new()),
                    },
                    None => Value::Array(Vec::new()),
                };
                Ok(Value::String(buffer.to_string()))
            }
            scripts::CLEAR_BUFFER => {
                let slot = slot_arg(args)?;
                if self.marker_set(&slot.marker) {
                    let key = self.key(&slot.buffer);
                    match self.shared.globals.get_mut(&key) {
                        Some(mut entry) => match entry.value_mut() {
                            Global::Events(buffer) => buffer.clear(),
                            other => *other = Global::Value(json!([])),
                        },
                        None => {
                            self.shared.globals.insert(key, Global::Value(json!([])));
                        }
                    }
                }
                Ok(Value::Null)
            }
            scripts::IS_INSTALLED => {
                let slot = slot_arg(args)?;
                Ok(Value::Bool(self.marker_set(&slot.marker)))
            }
            scripts::STORAGE_ITEMS => {
                let area = area_arg(args)?;
                let items = self.storage(area);
                serde_json::to_value(items).map_err(|err| thrown(&err.to_string()))
            }
            scripts::STORAGE_SET => {
                let area = area_arg(args)?;
                let key = string_arg(args, 1)?;
                let value = string_arg(args, 2)?;
                let mut state = self.state.lock();
                store_mut(&mut state, area).insert(key, value);
                Ok(Value::Null)
            }
            scripts::STORAGE_REMOVE => {
                let area = area_arg(args)?;
                let key = string_arg(args, 1)?;
                let mut state = self.state.lock();
                store_mut(&mut state, area).remove(&key);
                Ok(Value::Null)
            }
            scripts::STORAGE_CLEAR => {
                let area = area_arg(args)?;
                let mut state = self.state.lock();
                store_mut(&mut state, area).clear();
                Ok(Value::Null)
            }
            other => match CollectorKind::from_install_source(other) {
                Some(kind) => self.install(kind, args),
                None => Err(unsupported(other)),
            },
        }
    }

    fn install(&self, kind: CollectorKind, args: &[Value]) -> Result<Value, TargetError> {
        let layer: Layer = args
            .first()
            .cloned()
            .and_then(|config| serde_json::from_value(config).ok())
            .ok_or_else(|| thrown("TypeError: Cannot read properties of undefined (reading 'marker')"))?;

        if self.marker_set(&layer.marker) {
            return Ok(Value::Bool(false));
        }
        self.shared
            .globals
            .insert(self.key(&layer.marker), Global::Value(Value::Bool(true)));
        let buffer_key = self.key(&layer.buffer);
        let has_array = self
            .shared
            .globals
            .get(&buffer_key)
            .is_some_and(|entry| matches!(entry.value(), Global::Events(_)));
        if !has_array {
            self.shared.globals.insert(
                buffer_key,
                Global::Events(CollectorBuffer::with_capacity(layer.capacity)),
            );
        }
        self.state.lock().layers.entry(kind).or_default().push(layer);
        Ok(Value::Bool(true))
    }
}

#[async_trait]
impl ScriptTarget for SimulatedPage {
    fn id(&self) -> &TargetId {
        &self.id
    }

    async fn evaluate(&self, script: Script) -> Result<Value, TargetError> {
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        self.run(script)
    }
}

fn store_mut(state: &mut PageState, area: StorageArea) -> &mut BTreeMap<String, String> {
    match area {
        StorageArea::Local => &mut state.local,
        StorageArea::Session => &mut state.session,
    }
}

fn thrown(message: &str) -> TargetError {
    TargetError::Exception {
        message: message.to_string(),
        stack: Some(format!("{message}\n    at <anonymous>:1:1")),
    }
}

fn unsupported(code: &str) -> TargetError {
    let preview: String = code.chars().take(60).collect();
    TargetError::Exception {
        message: format!("ReferenceError: simulated page cannot evaluate `{preview}`"),
        stack: None,
    }
}

fn slot_arg(args: &[Value]) -> Result<CollectorSlot, TargetError> {
    args.first()
        .cloned()
        .and_then(|slot| serde_json::from_value(slot).ok())
        .ok_or_else(|| thrown("TypeError: Cannot read properties of undefined (reading 'marker')"))
}

fn area_arg(args: &[Value]) -> Result<StorageArea, TargetError> {
    let raw = string_arg(args, 0)?;
    // Anything but 'session' falls through to localStorage, as in the page helper.
    Ok(if raw == "session" {
        StorageArea::Session
    } else {
        StorageArea::Local
    })
}

fn string_arg(args: &[Value], index: usize) -> Result<String, TargetError> {
    match args.get(index) {
        Some(Value::String(text)) => Ok(text.clone()),
        Some(Value::Null) | None => Ok("undefined".to_string()),
        Some(other) => Ok(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_only_touches_its_own_globals() {
        let browser = SimulatedBrowser::new();
        let a = browser.open_page("https://a.test/");
        let b = browser.open_page("https://b.test/");
        a.set_global("flag", json!(1));
        b.set_global("flag", json!(2));

        a.reload();
        assert_eq!(a.global("flag"), None);
        assert_eq!(b.global("flag"), Some(json!(2)));
        assert_eq!(browser.pages().len(), 2);
        assert!(browser.page(b.id()).is_some());
    }

    #[test]
    fn network_events_are_stamped_at_completion() {
        let browser = SimulatedBrowser::new();
        let page = browser.open_page("https://a.test/");
        page.state.lock().layers.insert(
            CollectorKind::Network,
            vec![Layer {
                marker: "m".into(),
                buffer: "b".into(),
                capacity: None,
                body_limit: 4,
            }],
        );

        let before = browser.now_ms();
        page.fetch(SimulatedRequest::get("/slow").latency(250).body("abcdef"))
            .unwrap();
        let events: Vec<TelemetryEvent> =
            serde_json::from_value(page.global("b").unwrap()).unwrap();
        let event = events[0].as_network().unwrap();
        assert_eq!(event.duration_ms, 250);
        assert_eq!(event.started_at(), before);
        assert_eq!(event.response_body_prefix.as_deref(), Some("abcd"));
    }

    #[test]
    fn falsy_marker_values_do_not_count_as_installed() {
        let browser = SimulatedBrowser::new();
        let page = browser.open_page("about:blank");
        page.set_global("m", json!(false));
        assert!(!page.marker_set("m"));
        page.set_global("m", json!("yes"));
        assert!(page.marker_set("m"));
    }
}
