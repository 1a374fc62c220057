use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use devtools_telemetry::{CollectorKind, TelemetryEvent};
use devtools_tools::{ERROR_TIMELINE_ID, MUTATION_TRACKER_ID, NETWORK_SNAPSHOTS_ID};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::cli::context::CliContext;

#[derive(Args, Clone, Debug)]
pub struct WatchArgs {
    /// Collector to stream
    #[arg(value_enum)]
    pub collector: WatchCollector,

    /// Poll interval in milliseconds (defaults to the configured one)
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Stop after this many seconds; 0 runs until Ctrl-C
    #[arg(long, default_value_t = 0)]
    pub duration_secs: u64,

    /// Empty the page-side buffer before streaming
    #[arg(long)]
    pub clear: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum WatchCollector {
    Errors,
    Mutations,
    Network,
}

impl From<WatchCollector> for CollectorKind {
    fn from(value: WatchCollector) -> Self {
        match value {
            WatchCollector::Errors => CollectorKind::Error,
            WatchCollector::Mutations => CollectorKind::Mutation,
            WatchCollector::Network => CollectorKind::Network,
        }
    }
}

fn tool_id(kind: CollectorKind) -> &'static str {
    match kind {
        CollectorKind::Error => ERROR_TIMELINE_ID,
        CollectorKind::Mutation => MUTATION_TRACKER_ID,
        CollectorKind::Network => NETWORK_SNAPSHOTS_ID,
    }
}

pub async fn cmd_watch(args: WatchArgs, ctx: &CliContext) -> Result<()> {
    let mut settings = ctx.config().tool_settings();
    settings.refresh.poll_all = true;
    if let Some(ms) = args.interval_ms {
        settings.refresh.interval_ms = ms;
    }

    let kind = CollectorKind::from(args.collector);
    let session = ctx.open_panel(&settings).await?;
    session.panel.orchestrator.activate_tool(tool_id(kind)).await;
    let feed = session.panel.tools.feed(kind).clone();

    let started = async {
        let outcome = feed
            .start_tracking()
            .await
            .context("failed to install collector")?;
        info!(?kind, ?outcome, "tracking started");
        if args.clear {
            feed.clear().await.context("failed to clear buffer")?;
        }
        anyhow::Ok(())
    };
    if let Err(err) = started.await {
        session.close().await;
        return Err(err);
    }

    let mut updates = feed.updates();
    let mut last: Option<TelemetryEvent> = None;
    let mut last_status: Option<String> = None;
    let deadline = (args.duration_secs > 0)
        .then(|| Instant::now() + Duration::from_secs(args.duration_secs));
    let expired = async move {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(expired);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut result = Ok(());
    loop {
        let snapshot = feed.snapshot();
        for event in fresh_events(last.as_ref(), &snapshot) {
            match serde_json::to_string(event) {
                Ok(line) => println!("{line}"),
                Err(err) => {
                    result = Err(err.into());
                    break;
                }
            }
        }
        if result.is_err() {
            break;
        }
        if let Some(event) = snapshot.last() {
            last = Some(event.clone());
        }
        let status = feed.status();
        if status != last_status {
            if let Some(message) = &status {
                warn!(%message, "feed status");
            }
            last_status = status;
        }

        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = &mut expired => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    feed.stop_tracking();
    session.close().await;
    result
}

/// Events in `snapshot` after the last one already printed. When that event is gone (buffer
/// cleared, page reloaded, ring buffer rolled over) the whole snapshot is new.
fn fresh_events<'a>(
    last: Option<&TelemetryEvent>,
    snapshot: &'a [TelemetryEvent],
) -> &'a [TelemetryEvent] {
    let Some(last) = last else {
        return snapshot;
    };
    match snapshot.iter().rposition(|event| event == last) {
        Some(index) => &snapshot[index + 1..],
        None => snapshot,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devtools_telemetry::{ErrorEvent, ErrorKind};

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

    #[test]
    fn prints_only_what_follows_the_last_seen_event() {
        let snapshot = vec![error(1, "a"), error(2, "b"), error(3, "c")];
        assert_eq!(fresh_events(None, &snapshot).len(), 3);
        assert_eq!(fresh_events(Some(&error(2, "b")), &snapshot), &snapshot[2..]);
        assert!(fresh_events(Some(&error(3, "c")), &snapshot).is_empty());
    }

    #[test]
    fn missing_anchor_replays_the_snapshot() {
        let snapshot = vec![error(7, "after reload")];
        assert_eq!(fresh_events(Some(&error(3, "c")), &snapshot), &snapshot[..]);
    }
}
