use std::sync::Arc;

use async_trait::async_trait;
use cdp_adapter::{attach_to_target, AdapterError, CdpTransport, CommandTarget};
use serde_json::{json, Value};
use soulbrowser_core_types::TargetId;
use tracing::debug;

use crate::target::{Script, ScriptTarget, TargetError};

const OBJECT_GROUP: &str = "soul-devtools";

/// A Chromium page reached through a flattened CDP session.
pub struct CdpScriptTarget {
    id: TargetId,
    session: String,
    transport: Arc<dyn CdpTransport>,
}

impl CdpScriptTarget {
    pub fn new(id: TargetId, session: impl Into<String>, transport: Arc<dyn CdpTransport>) -> Self {
        Self {
            id,
            session: session.into(),
            transport,
        }
    }

    /// Attach to `id` and enable the runtime domain on the new session.
    pub async fn attach(
        transport: Arc<dyn CdpTransport>,
        id: TargetId,
    ) -> Result<Self, AdapterError> {
        let session = attach_to_target(transport.as_ref(), &id).await?;
        transport
            .send_command(
                CommandTarget::Session(session.clone()),
                "Runtime.enable",
                json!({}),
            )
            .await?;
        Ok(Self::new(id, session, transport))
    }

    pub fn session_id(&self) -> &str {
        &self.session
    }

    async fn send(&self, method: &str, params: Value) -> Result<Value, TargetError> {
        self.transport
            .send_command(CommandTarget::Session(self.session.clone()), method, params)
            .await
            .map_err(|err| TargetError::Transport(err.to_string()))
    }

    async fn global_object(&self) -> Result<String, TargetError> {
        let response = self
            .send(
                "Runtime.evaluate",
                json!({
                    "expression": "globalThis",
                    "objectGroup": OBJECT_GROUP,
                    "returnByValue": false,
                }),
            )
            .await?;
        response
            .pointer("/result/objectId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| TargetError::Transport("globalThis has no remote object id".into()))
    }
}

#[async_trait]
impl ScriptTarget for CdpScriptTarget {
    fn id(&self) -> &TargetId {
        &self.id
    }

    async fn evaluate(&self, script: Script) -> Result<Value, TargetError> {
        match script {
            Script::Source(expression) => {
                let response = self
                    .send(
                        "Runtime.evaluate",
                        json!({
                            "expression": expression,
                            "returnByValue": true,
                            "awaitPromise": true,
                        }),
                    )
                    .await?;
                remote_result(response)
            }
            Script::Call { function, args } => {
                let object_id = self.global_object().await?;
                let arguments: Vec<Value> =
                    args.into_iter().map(|value| json!({ "value": value })).collect();
                let response = self
                    .send(
                        "Runtime.callFunctionOn",
                        json!({
                            "functionDeclaration": function,
                            "objectId": object_id,
                            "arguments": arguments,
                            "returnByValue": true,
                            "awaitPromise": true,
                        }),
                    )
                    .await;
                if let Err(err) = self
                    .send("Runtime.releaseObject", json!({ "objectId": object_id }))
                    .await
                {
                    debug!(target: "instrumentation-bridge", %err, "releaseObject failed");
                }
                remote_result(response?)
            }
        }
    }
}

/// Unpack a `Runtime.evaluate`/`Runtime.callFunctionOn` response.
fn remote_result(response: Value) -> Result<Value, TargetError> {
    if let Some(details) = response.get("exceptionDetails") {
        return Err(exception_from_details(details));
    }
    let result = response.get("result").cloned().unwrap_or(Value::Null);
    if let Some(value) = result.get("value") {
        return Ok(value.clone());
    }
    if let Some(unserializable) = result.get("unserializableValue").and_then(Value::as_str) {
        return Ok(Value::String(unserializable.to_string()));
    }
    Ok(Value::Null)
}

fn exception_from_details(details: &Value) -> TargetError {
    let exception = details.get("exception");
    let description = exception
        .and_then(|ex| ex.get("description"))
        .and_then(Value::as_str);
    let thrown_value = exception.and_then(|ex| ex.get("value")).map(|value| match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    });
    let text = details
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or("script threw");

    let message = description
        .and_then(|desc| desc.lines().next())
        .map(str::to_string)
        .or(thrown_value)
        .unwrap_or_else(|| text.to_string());
    let stack = description
        .filter(|desc| desc.contains("\n    at "))
        .map(str::to_string);

    TargetError::Exception { message, stack }
}
