//! Page-target discovery and attachment.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use soulbrowser_core_types::TargetId;
use tracing::debug;

use crate::error::{AdapterError, AdapterErrorKind};
use crate::transport::{CdpTransport, CommandTarget};

/// A `page` target as reported by `Target.getTargets`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageTarget {
    pub target_id: TargetId,
    pub url: String,
    pub title: String,
    pub attached: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTargetInfo {
    target_id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    attached: bool,
}

pub async fn list_page_targets(
    transport: &dyn CdpTransport,
) -> Result<Vec<PageTarget>, AdapterError> {
    let response = transport
        .send_command(CommandTarget::Browser, "Target.getTargets", json!({}))
        .await?;
    let infos = response
        .get("targetInfos")
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()));
    let infos: Vec<RawTargetInfo> = serde_json::from_value(infos).map_err(|err| {
        AdapterError::new(AdapterErrorKind::Internal)
            .with_hint(format!("malformed targetInfos: {err}"))
    })?;

    Ok(infos
        .into_iter()
        .filter(|info| info.kind == "page")
        .map(|info| PageTarget {
            target_id: TargetId(info.target_id),
            url: info.url,
            title: info.title,
            attached: info.attached,
        })
        .collect())
}

/// Attach in flattened mode and return the CDP session id used to address the page.
pub async fn attach_to_target(
    transport: &dyn CdpTransport,
    target: &TargetId,
) -> Result<String, AdapterError> {
    let response = transport
        .send_command(
            CommandTarget::Browser,
            "Target.attachToTarget",
            json!({ "targetId": target.as_str(), "flatten": true }),
        )
        .await
        .map_err(|err| {
            if err.hint.as_deref().is_some_and(|hint| hint.contains("No target")) {
                AdapterError::new(AdapterErrorKind::TargetNotFound).with_hint(target.to_string())
            } else {
                err
            }
        })?;

    let session = response
        .get("sessionId")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::Internal).with_hint("attachToTarget missing sessionId")
        })?;
    debug!(target: "cdp-transport", target_id = %target, session, "attached to page target");
    Ok(session.to_string())
}

pub async fn create_page_target(
    transport: &dyn CdpTransport,
    url: &str,
) -> Result<TargetId, AdapterError> {
    let response = transport
        .send_command(
            CommandTarget::Browser,
            "Target.createTarget",
            json!({ "url": url }),
        )
        .await?;
    response
        .get("targetId")
        .and_then(Value::as_str)
        .map(TargetId::from)
        .ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::Internal).with_hint("createTarget missing targetId")
        })
}
