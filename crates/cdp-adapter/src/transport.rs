use std::collections::HashMap;
use std::convert::TryInto;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::async_process::Child;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::target::SessionId as CdpSessionId;
use chromiumoxide::cdp::events::CdpEventMessage;
use chromiumoxide::conn::Connection;
use chromiumoxide::error::CdpError;
use chromiumoxide_types::{CallId, CdpJsonEventMessage, Message, MethodId, Response};
use futures::future::BoxFuture;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::metrics;
use crate::util::extract_ws_url;

/// A protocol event, with the flattened session it arrived on.
#[derive(Clone, Debug)]
pub struct TransportEvent {
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandTarget {
    Browser,
    Session(String),
}

#[async_trait]
pub trait CdpTransport: Send + Sync {
    async fn start(&self) -> Result<(), AdapterError>;
    /// Next protocol event; `None` once the stream has ended.
    async fn next_event(&self) -> Option<TransportEvent>;
    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError>;
}

type Connector = fn(CdpConfig) -> BoxFuture<'static, Result<BrowserLink, AdapterError>>;

fn open_link(cfg: CdpConfig) -> BoxFuture<'static, Result<BrowserLink, AdapterError>> {
    Box::pin(BrowserLink::open(cfg))
}

/// Websocket transport to one Chromium. Connects on first use and again after the link dies.
pub struct ChromiumTransport {
    cfg: CdpConfig,
    link: Mutex<Option<Arc<BrowserLink>>>,
    connect: Connector,
}

impl ChromiumTransport {
    pub fn new(cfg: CdpConfig) -> Self {
        Self::with_connector(cfg, open_link)
    }

    fn with_connector(cfg: CdpConfig, connect: Connector) -> Self {
        Self {
            cfg,
            link: Mutex::new(None),
            connect,
        }
    }

    fn deadline(&self) -> Duration {
        Duration::from_millis(self.cfg.default_deadline_ms)
    }

    async fn link(&self) -> Result<Arc<BrowserLink>, AdapterError> {
        let mut slot = self.link.lock().await;
        match slot.as_ref() {
            Some(link) if link.is_alive() => return Ok(link.clone()),
            Some(_) => warn!(target: "cdp-transport", "chromium link lost; reconnecting"),
            None => {}
        }
        let link = Arc::new((self.connect)(self.cfg.clone()).await?);
        *slot = Some(link.clone());
        Ok(link)
    }
}

#[async_trait]
impl CdpTransport for ChromiumTransport {
    async fn start(&self) -> Result<(), AdapterError> {
        self.link()
            .await?
            .call(
                CommandTarget::Browser,
                "Target.setDiscoverTargets",
                json!({ "discover": true }),
                self.deadline(),
            )
            .await
            .map(drop)
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        match self.link().await {
            Ok(link) => link.next_event().await,
            Err(err) => {
                warn!(target: "cdp-transport", %err, "no chromium link for events");
                None
            }
        }
    }

    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        let started = Instant::now();
        let result = match self.link().await {
            Ok(link) => link.call(target, method, params, self.deadline()).await,
            Err(err) => Err(err),
        };
        metrics::observe_command(method, started.elapsed(), result.is_ok());
        result
    }
}

struct Outgoing {
    target: CommandTarget,
    method: String,
    params: Value,
    reply: oneshot::Sender<Result<Value, AdapterError>>,
}

/// One websocket to the browser plus the task pumping it.
struct BrowserLink {
    commands: mpsc::Sender<Outgoing>,
    events: Mutex<mpsc::Receiver<TransportEvent>>,
    alive: Arc<AtomicBool>,
    pump: JoinHandle<()>,
    child: Mutex<Option<Child>>,
}

impl BrowserLink {
    async fn open(cfg: CdpConfig) -> Result<Self, AdapterError> {
        let (child, ws_url) = match cfg.websocket_url.clone() {
            Some(url) => (None, url),
            None => {
                let (child, url) = launch(&cfg).await?;
                (Some(child), url)
            }
        };

        let conn = Connection::<CdpEventMessage>::connect(&ws_url)
            .await
            .map_err(|err| io_error(err.to_string()))?;
        let (commands, command_rx) = mpsc::channel(128);
        let (event_tx, events) = mpsc::channel(256);

        let pump = Pump {
            conn,
            inflight: HashMap::new(),
            heartbeat: Heartbeat::every(Duration::from_millis(cfg.heartbeat_interval_ms)),
            events: event_tx,
        };
        let alive = Arc::new(AtomicBool::new(true));
        let flag = alive.clone();
        let pump = tokio::spawn(async move {
            if let Err(err) = pump.run(command_rx).await {
                error!(target: "cdp-transport", %err, "chromium link failed");
            }
            flag.store(false, Ordering::Relaxed);
        });

        info!(target: "cdp-transport", url = %ws_url, "chromium link established");
        Ok(Self {
            commands,
            events: Mutex::new(events),
            alive,
            pump,
            child: Mutex::new(child),
        })
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    async fn call(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<Value, AdapterError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Outgoing {
                target,
                method: method.to_string(),
                params,
                reply,
            })
            .await
            .map_err(|_| io_error("chromium link closed"))?;

        match tokio::time::timeout(deadline, response).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(io_error("command response channel closed")),
            Err(_) => Err(AdapterError::new(AdapterErrorKind::Timeout)
                .with_hint(format!("{method} exceeded {}ms", deadline.as_millis()))),
        }
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        self.events.lock().await.recv().await
    }
}

impl Drop for BrowserLink {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Relaxed);
        self.pump.abort();
        let Some(mut child) = self.child.get_mut().take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = child.kill().await {
                        warn!(target: "cdp-transport", %err, "failed to kill chromium");
                    }
                });
            }
            Err(_) => debug!(target: "cdp-transport", "no runtime left to kill chromium"),
        }
    }
}

/// Liveness ping on the browser session. A ping still unanswered at the next tick ends the link.
struct Heartbeat {
    ticker: Option<Interval>,
    pending: Option<CallId>,
}

impl Heartbeat {
    fn every(period: Duration) -> Self {
        let ticker = (!period.is_zero()).then(|| {
            let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });
        Self {
            ticker,
            pending: None,
        }
    }

    async fn tick(&mut self) {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

type Inflight = HashMap<CallId, oneshot::Sender<Result<Value, AdapterError>>>;

struct Pump {
    conn: Connection<CdpEventMessage>,
    inflight: Inflight,
    heartbeat: Heartbeat,
    events: mpsc::Sender<TransportEvent>,
}

impl Pump {
    async fn run(mut self, mut commands: mpsc::Receiver<Outgoing>) -> Result<(), AdapterError> {
        loop {
            tokio::select! {
                Some(command) = commands.recv() => {
                    self.submit(command)?;
                }
                _ = self.heartbeat.tick() => {
                    self.ping()?;
                }
                message = self.conn.next() => match message {
                    Some(Ok(Message::Response(response))) => self.settle(response),
                    Some(Ok(Message::Event(event))) => forward_event(event, &self.events),
                    Some(Err(err)) => {
                        let err = cdp_failure(err);
                        self.fail_all(&err);
                        return Err(err);
                    }
                    None => {
                        self.fail_all(&io_error("cdp connection closed"));
                        return Ok(());
                    }
                },
            }
        }
    }

    fn submit(&mut self, command: Outgoing) -> Result<(), AdapterError> {
        let session = match command.target {
            CommandTarget::Browser => None,
            CommandTarget::Session(id) => Some(CdpSessionId::from(id)),
        };
        let method: MethodId = command.method.into();
        match self.conn.submit_command(method, session, command.params) {
            Ok(id) => {
                self.inflight.insert(id, command.reply);
                Ok(())
            }
            Err(err) => {
                let err = io_error(err.to_string());
                let _ = command.reply.send(Err(err.clone()));
                Err(err)
            }
        }
    }

    fn ping(&mut self) -> Result<(), AdapterError> {
        if self.heartbeat.pending.is_some() {
            warn!(target: "cdp-transport", "heartbeat unanswered; dropping chromium link");
            let err = AdapterError::new(AdapterErrorKind::Timeout)
                .with_hint("heartbeat unanswered")
                .retriable(true);
            self.fail_all(&err);
            return Err(err);
        }
        let method: MethodId = "Browser.getVersion".into();
        let id = self
            .conn
            .submit_command(method, None, json!({}))
            .map_err(|err| io_error(err.to_string()))?;
        self.heartbeat.pending = Some(id);
        Ok(())
    }

    fn settle(&mut self, response: Response) {
        if self.heartbeat.pending.as_ref() == Some(&response.id) {
            self.heartbeat.pending = None;
            if let Err(err) = response_payload(response) {
                warn!(target: "cdp-transport", %err, "heartbeat answered with an error");
            }
            return;
        }
        if let Some(reply) = self.inflight.remove(&response.id) {
            let _ = reply.send(response_payload(response));
        }
    }

    fn fail_all(&mut self, err: &AdapterError) {
        for (_, reply) in self.inflight.drain() {
            let _ = reply.send(Err(err.clone()));
        }
    }
}

/// Events are best effort: a full queue drops the event instead of stalling responses.
fn forward_event(event: CdpEventMessage, events: &mpsc::Sender<TransportEvent>) {
    let raw: CdpJsonEventMessage = match event.try_into() {
        Ok(raw) => raw,
        Err(err) => {
            warn!(target: "cdp-transport", ?err, "undecodable cdp event");
            return;
        }
    };
    let event = TransportEvent {
        method: raw.method.into_owned(),
        params: raw.params,
        session_id: raw.session_id,
    };
    if let Err(TrySendError::Full(_)) = events.try_send(event) {
        metrics::record_dropped_event();
    }
}

fn response_payload(response: Response) -> Result<Value, AdapterError> {
    match (response.result, response.error) {
        (Some(result), _) => Ok(result),
        (None, Some(error)) => Err(io_error(format!("cdp error {}: {}", error.code, error.message))
            .retriable(error.code >= 500)),
        (None, None) => Err(internal("empty cdp response")),
    }
}

fn cdp_failure(err: CdpError) -> AdapterError {
    let hint = err.to_string();
    match err {
        CdpError::Timeout => AdapterError::new(AdapterErrorKind::Timeout)
            .with_hint(hint)
            .retriable(true),
        CdpError::Serde(_) | CdpError::JavascriptException(_) => internal(hint),
        _ => io_error(hint).retriable(true),
    }
}

fn io_error(hint: impl Into<String>) -> AdapterError {
    AdapterError::new(AdapterErrorKind::CdpIo).with_hint(hint)
}

fn internal(hint: impl Into<String>) -> AdapterError {
    AdapterError::new(AdapterErrorKind::Internal).with_hint(hint)
}

async fn launch(cfg: &CdpConfig) -> Result<(Child, String), AdapterError> {
    let mut child = browser_config(cfg)?
        .launch()
        .map_err(|err| internal(format!("failed to launch chromium: {err}")))?;
    let ws_url = extract_ws_url(&mut child)
        .await
        .map_err(|err| io_error(err.to_string()))?;
    Ok((child, ws_url))
}

fn profile_dir(cfg: &CdpConfig) -> Result<PathBuf, AdapterError> {
    let dir = if cfg.user_data_dir.is_absolute() {
        cfg.user_data_dir.clone()
    } else {
        std::env::current_dir()
            .map_err(|err| internal(format!("failed to resolve cwd for user-data-dir: {err}")))?
            .join(&cfg.user_data_dir)
    };
    fs::create_dir_all(&dir)
        .map_err(|err| internal(format!("failed to ensure user-data-dir: {err}")))?;
    Ok(dir)
}

fn browser_config(cfg: &CdpConfig) -> Result<BrowserConfig, AdapterError> {
    let explicit = !cfg.executable.as_os_str().is_empty();
    if explicit && !cfg.executable.exists() {
        return Err(io_error(format!(
            "chrome executable not found at {}",
            cfg.executable.display()
        ))
        .with_data(json!({
            "expected": cfg.executable,
            "hint": "Set SOULBROWSER_CHROME or pass --chrome-path, or attach with --ws-url."
        })));
    }

    let mut args = vec!["--no-first-run", "--no-default-browser-check", "--remote-allow-origins=*"];
    let mut builder = BrowserConfig::builder()
        .request_timeout(Duration::from_millis(cfg.default_deadline_ms))
        .launch_timeout(Duration::from_secs(20))
        .user_data_dir(profile_dir(cfg)?);
    if cfg.headless {
        args.push("--headless=new");
    } else {
        builder = builder.with_head();
    }
    if explicit {
        builder = builder.chrome_executable(cfg.executable.clone());
    }

    builder
        .args(args)
        .build()
        .map_err(|err| internal(format!("browser config error: {err}")))
}
