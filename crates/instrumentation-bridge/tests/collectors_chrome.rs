//! Collector fragments running inside a real Chromium page.
//!
//! Run with:
//! ```bash
//! export SOULBROWSER_USE_REAL_CHROME=1
//! export SOULBROWSER_CHROME=/usr/bin/google-chrome  # or path to chrome
//! cargo test -p instrumentation-bridge --test collectors_chrome -- --nocapture
//! ```

use std::env;
use std::sync::Arc;
use std::time::Duration;

use cdp_adapter::{create_page_target, CdpConfig, CdpTransport, ChromiumTransport};
use devtools_telemetry::{CollectorSpec, TelemetryEvent};
use instrumentation_bridge::{
    CdpScriptTarget, FixedTarget, InstallOutcome, InstrumentationBridge, TargetHandle,
    TargetResolver,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn should_run_real_tests() -> bool {
    env::var("SOULBROWSER_USE_REAL_CHROME")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn test_config() -> (CdpConfig, TempDir) {
    let mut cfg = CdpConfig::default();
    cfg.headless = true;
    if let Ok(chrome_path) = env::var("SOULBROWSER_CHROME") {
        cfg.executable = chrome_path.into();
    }
    let profile = tempfile::tempdir().expect("create temporary chrome profile");
    cfg.user_data_dir = profile.path().into();
    (cfg, profile)
}

/// Browser, profile and resolver must outlive the bridge.
struct ChromePage {
    bridge: InstrumentationBridge,
    _resolver: Arc<dyn TargetResolver>,
    _transport: Arc<dyn CdpTransport>,
    _profile: TempDir,
}

async fn open_blank_page() -> ChromePage {
    let (cfg, profile) = test_config();
    let transport: Arc<dyn CdpTransport> = Arc::new(ChromiumTransport::new(cfg));
    transport.start().await.expect("start transport");
    let id = create_page_target(transport.as_ref(), "about:blank")
        .await
        .expect("create target");
    let target = CdpScriptTarget::attach(transport.clone(), id)
        .await
        .expect("attach");

    let handle: TargetHandle = Arc::new(target);
    let resolver: Arc<dyn TargetResolver> = Arc::new(FixedTarget(Some(handle)));
    let bridge = InstrumentationBridge::new(Arc::downgrade(&resolver));
    ChromePage {
        bridge,
        _resolver: resolver,
        _transport: transport,
        _profile: profile,
    }
}

/// Read the buffer until `done` holds; observer callbacks and fetch bodies land asynchronously.
async fn wait_for_buffer(
    bridge: &InstrumentationBridge,
    spec: &CollectorSpec,
    done: impl Fn(&[TelemetryEvent]) -> bool,
) -> Vec<TelemetryEvent> {
    let mut events = Vec::new();
    for _ in 0..50 {
        events = bridge.get_buffer(&spec.slot).await.expect("read buffer");
        if done(&events) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    events
}

async fn install_twice(bridge: &InstrumentationBridge, spec: &CollectorSpec) {
    assert_eq!(bridge.install_collector(spec).await, Ok(InstallOutcome::Installed));
    assert_eq!(
        bridge.install_collector(spec).await,
        Ok(InstallOutcome::AlreadyInstalled)
    );
}

#[tokio::test]
async fn double_install_records_each_request_once() {
    if !should_run_real_tests() {
        println!("Skipping real browser test (SOULBROWSER_USE_REAL_CHROME not set)");
        return;
    }

    let page = open_blank_page().await;
    let spec = CollectorSpec::network();
    install_twice(&page.bridge, &spec).await;

    let status = page
        .bridge
        .execute("fetch('data:text/plain,hello').then(function (r) { return r.status; })")
        .await
        .expect("fetch");
    assert_eq!(status, "200");

    let events = wait_for_buffer(&page.bridge, &spec, |events| !events.is_empty()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let events_after = page.bridge.get_buffer(&spec.slot).await.expect("read buffer");
    assert_eq!(events.len(), 1);
    assert_eq!(events_after.len(), 1);

    let event = events[0].as_network().expect("network event");
    assert_eq!(event.method, "GET");
    assert_eq!(event.status, 200);
    assert_eq!(event.response_body_prefix.as_deref(), Some("hello"));
}

#[tokio::test]
async fn double_install_records_each_console_error_once() {
    if !should_run_real_tests() {
        println!("Skipping real browser test (SOULBROWSER_USE_REAL_CHROME not set)");
        return;
    }

    let page = open_blank_page().await;
    let spec = CollectorSpec::errors();
    install_twice(&page.bridge, &spec).await;

    page.bridge
        .execute("console.error('checkout failed'); 0")
        .await
        .expect("console.error");

    let events = page.bridge.get_buffer(&spec.slot).await.expect("read buffer");
    assert_eq!(events.len(), 1);
    let error = events[0].as_error().expect("error event");
    assert_eq!(error.message, "checkout failed");
}

#[tokio::test]
async fn long_bodies_keep_a_five_thousand_char_prefix() {
    if !should_run_real_tests() {
        println!("Skipping real browser test (SOULBROWSER_USE_REAL_CHROME not set)");
        return;
    }

    let page = open_blank_page().await;
    let spec = CollectorSpec::network();
    page.bridge.install_collector(&spec).await.expect("install");

    let length = page
        .bridge
        .execute(
            "fetch('data:text/plain,' + 'y'.repeat(6000))\
             .then(function (r) { return r.text(); })\
             .then(function (t) { return t.length; })",
        )
        .await
        .expect("fetch");
    assert_eq!(length, "6000");

    let events = wait_for_buffer(&page.bridge, &spec, |events| !events.is_empty()).await;
    let prefix = events[0]
        .as_network()
        .and_then(|event| event.response_body_prefix.as_deref())
        .expect("body prefix");
    assert_eq!(prefix.chars().count(), 5000);
    assert!(prefix.chars().all(|c| c == 'y'));
}

#[tokio::test]
async fn mutation_buffer_drops_the_oldest_past_one_hundred() {
    if !should_run_real_tests() {
        println!("Skipping real browser test (SOULBROWSER_USE_REAL_CHROME not set)");
        return;
    }

    let page = open_blank_page().await;
    // One parent per append so each record names a distinct target.
    page.bridge
        .execute(
            "for (var i = 1; i <= 101; i++) { var p = document.createElement('div'); \
             p.id = 'p' + i; document.body.appendChild(p); } 0",
        )
        .await
        .expect("build parents");

    let spec = CollectorSpec::mutations();
    install_twice(&page.bridge, &spec).await;

    page.bridge
        .execute(
            "for (var i = 1; i <= 101; i++) { \
             document.getElementById('p' + i).appendChild(document.createElement('span')); } 0",
        )
        .await
        .expect("append children");

    let events = wait_for_buffer(&page.bridge, &spec, |events| {
        events
            .last()
            .and_then(TelemetryEvent::as_mutation)
            .map_or(false, |m| m.target == "DIV#p101")
    })
    .await;

    assert_eq!(events.len(), 100);
    let targets: Vec<&str> = events
        .iter()
        .filter_map(TelemetryEvent::as_mutation)
        .map(|m| m.target.as_str())
        .collect();
    assert!(!targets.contains(&"DIV#p1"));
    assert_eq!(targets.first(), Some(&"DIV#p2"));
    assert_eq!(targets.last(), Some(&"DIV#p101"));
}

#[tokio::test]
async fn zero_capacity_keeps_nothing_in_the_page() {
    if !should_run_real_tests() {
        println!("Skipping real browser test (SOULBROWSER_USE_REAL_CHROME not set)");
        return;
    }

    let page = open_blank_page().await;
    let spec = CollectorSpec::mutations().with_capacity(Some(0));
    page.bridge.install_collector(&spec).await.expect("install");

    page.bridge
        .execute("document.body.appendChild(document.createElement('p')); 0")
        .await
        .expect("append");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let events = page.bridge.get_buffer(&spec.slot).await.expect("read buffer");
    assert!(events.is_empty());
}
