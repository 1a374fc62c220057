//! Transport tests against a real Chromium.
//!
//! Run with:
//! ```bash
//! export SOULBROWSER_USE_REAL_CHROME=1
//! export SOULBROWSER_CHROME=/usr/bin/google-chrome  # or path to chrome
//! cargo test -p cdp-adapter --test integration_tests -- --nocapture
//! ```

use cdp_adapter::config::CdpConfig;
use cdp_adapter::transport::{CdpTransport, ChromiumTransport, CommandTarget};
use cdp_adapter::{attach_to_target, create_page_target, list_page_targets};
use serde_json::json;
use std::env;
use std::time::Duration;
use tempfile::TempDir;

fn should_run_real_tests() -> bool {
    env::var("SOULBROWSER_USE_REAL_CHROME")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Headless config with an isolated temporary profile directory.
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

#[tokio::test]
async fn browser_launch_and_version() {
    if !should_run_real_tests() {
        println!("Skipping real browser test (SOULBROWSER_USE_REAL_CHROME not set)");
        return;
    }

    let (cfg, _profile) = test_config();
    let transport = ChromiumTransport::new(cfg);
    transport.start().await.expect("start transport");

    let version = transport
        .send_command(CommandTarget::Browser, "Browser.getVersion", json!({}))
        .await
        .expect("Browser.getVersion");
    assert!(version.get("product").is_some());
}

#[tokio::test]
async fn create_attach_and_evaluate() {
    if !should_run_real_tests() {
        println!("Skipping real browser test (SOULBROWSER_USE_REAL_CHROME not set)");
        return;
    }

    let (cfg, _profile) = test_config();
    let transport = ChromiumTransport::new(cfg);
    transport.start().await.expect("start transport");

    let target = create_page_target(&transport, "about:blank")
        .await
        .expect("create target");
    let pages = list_page_targets(&transport).await.expect("list targets");
    assert!(pages.iter().any(|page| page.target_id == target));

    let session = attach_to_target(&transport, &target).await.expect("attach");
    let result = transport
        .send_command(
            CommandTarget::Session(session),
            "Runtime.evaluate",
            json!({ "expression": "1 + 2", "returnByValue": true }),
        )
        .await
        .expect("evaluate");
    assert_eq!(result["result"]["value"], json!(3));
}

#[tokio::test]
async fn receives_target_events() {
    if !should_run_real_tests() {
        println!("Skipping real browser test (SOULBROWSER_USE_REAL_CHROME not set)");
        return;
    }

    let (cfg, _profile) = test_config();
    let transport = std::sync::Arc::new(ChromiumTransport::new(cfg));
    transport.start().await.expect("start transport");

    let listener = transport.clone();
    let events = tokio::spawn(async move {
        tokio::time::timeout(Duration::from_secs(5), listener.next_event())
            .await
            .ok()
            .flatten()
    });

    create_page_target(&*transport, "about:blank")
        .await
        .expect("create target");

    let event = events.await.expect("event task");
    assert!(event.is_some(), "expected a Target.* event after createTarget");
}
