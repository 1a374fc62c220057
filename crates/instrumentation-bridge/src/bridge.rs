use std::future::Future;
use std::sync::Weak;
use std::time::Instant;

use devtools_telemetry::{CollectorSlot, CollectorSpec, TelemetryEvent};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::BridgeError;
use crate::metrics;
use crate::scripts;
use crate::target::{Script, TargetHandle, TargetResolver};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed,
    AlreadyInstalled,
}

struct Detached;

impl TargetResolver for Detached {
    fn resolve(&self) -> Option<TargetHandle> {
        None
    }
}

/// The only path from the panel into a page. The bridge looks up its target on every call and
/// never keeps it alive between calls.
pub struct InstrumentationBridge {
    resolver: Weak<dyn TargetResolver>,
}

impl InstrumentationBridge {
    pub fn new(resolver: Weak<dyn TargetResolver>) -> Self {
        Self { resolver }
    }

    /// A bridge that never has a target.
    pub fn detached() -> Self {
        let resolver: Weak<dyn TargetResolver> = Weak::<Detached>::new();
        Self { resolver }
    }

    pub fn current_target(&self) -> Option<TargetHandle> {
        self.resolver.upgrade().and_then(|resolver| resolver.resolve())
    }

    /// Run `code` and return its completion value as text.
    pub async fn execute(&self, code: &str) -> Result<String, BridgeError> {
        self.observed("execute", async {
            let value = self.evaluate(Script::source(code)).await?;
            Ok(value_to_text(value))
        })
        .await
    }

    /// Run `code` as a function body and decode its JSON-serialized return value.
    pub async fn execute_json<T: DeserializeOwned>(&self, code: &str) -> Result<T, BridgeError> {
        self.observed("execute_json", async {
            let value = self.probe_json(code).await?;
            decode_value(value)
        })
        .await
    }

    pub async fn execute_json_value(&self, code: &str) -> Result<Value, BridgeError> {
        self.observed("execute_json", self.probe_json(code)).await
    }

    /// Invoke `function` in the page with `args` bound as structured call arguments.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        function: &str,
        args: Vec<Value>,
    ) -> Result<T, BridgeError> {
        self.observed("call", async {
            let value = self.evaluate(Script::call(function, args)).await?;
            decode_value(value)
        })
        .await
    }

    pub async fn install_collector(
        &self,
        spec: &CollectorSpec,
    ) -> Result<InstallOutcome, BridgeError> {
        self.observed("install_collector", async {
            let value = self
                .evaluate(Script::call(spec.install_source(), vec![spec.install_args()]))
                .await?;
            let installed: bool = decode_value(value)?;
            let outcome = if installed {
                InstallOutcome::Installed
            } else {
                InstallOutcome::AlreadyInstalled
            };
            info!(
                target: "instrumentation-bridge",
                collector = spec.kind.slot_name(),
                marker = %spec.slot.marker,
                ?outcome,
                "collector install"
            );
            Ok(outcome)
        })
        .await
    }

    /// Read a collector buffer. Empty when the collector was never installed.
    pub async fn get_buffer(&self, slot: &CollectorSlot) -> Result<Vec<TelemetryEvent>, BridgeError> {
        self.observed("get_buffer", async {
            let value = self
                .evaluate(Script::call(scripts::READ_BUFFER, vec![slot.to_arg()]))
                .await?;
            let text = value_to_text(value);
            serde_json::from_str(&text).map_err(|err| BridgeError::Decode(err.to_string()))
        })
        .await
    }

    /// Empty a buffer. Patches and observers stay installed.
    pub async fn clear_buffer(&self, slot: &CollectorSlot) -> Result<(), BridgeError> {
        self.observed("clear_buffer", async {
            self.evaluate(Script::call(scripts::CLEAR_BUFFER, vec![slot.to_arg()]))
                .await?;
            Ok(())
        })
        .await
    }

    pub async fn is_installed(&self, slot: &CollectorSlot) -> Result<bool, BridgeError> {
        self.observed("is_installed", async {
            let value = self
                .evaluate(Script::call(scripts::IS_INSTALLED, vec![slot.to_arg()]))
                .await?;
            decode_value(value)
        })
        .await
    }

    pub(crate) async fn evaluate(&self, script: Script) -> Result<Value, BridgeError> {
        let target = self.current_target().ok_or(BridgeError::NoTarget)?;
        debug!(target: "instrumentation-bridge", target_id = %target.id(), "evaluate");
        target.evaluate(script).await.map_err(BridgeError::from)
    }

    pub(crate) async fn observed<T, F>(&self, op: &'static str, fut: F) -> Result<T, BridgeError>
    where
        F: Future<Output = Result<T, BridgeError>>,
    {
        let started = Instant::now();
        let result = fut.await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(err) => err.kind(),
        };
        metrics::observe_call(op, started.elapsed(), outcome);
        if let Err(err) = &result {
            debug!(target: "instrumentation-bridge", op, %err, "bridge call failed");
        }
        result
    }

    async fn probe_json(&self, code: &str) -> Result<Value, BridgeError> {
        let value = self
            .evaluate(Script::source(scripts::wrap_json_probe(code)))
            .await?;
        let text = value_to_text(value);
        if text.trim().is_empty() {
            return Err(BridgeError::Decode(
                "probe produced no JSON (did it return undefined?)".into(),
            ));
        }
        serde_json::from_str(&text).map_err(|err| BridgeError::Decode(err.to_string()))
    }
}

pub(crate) fn decode_value<T: DeserializeOwned>(value: Value) -> Result<T, BridgeError> {
    serde_json::from_value(value).map_err(|err| BridgeError::Decode(err.to_string()))
}

/// Textual form of a by-value result: strings verbatim, `undefined`/`null` as empty text.
fn value_to_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_conversion_keeps_strings_verbatim() {
        assert_eq!(value_to_text(json!("a\"b")), "a\"b");
        assert_eq!(value_to_text(Value::Null), "");
        assert_eq!(value_to_text(json!(42)), "42");
        assert_eq!(value_to_text(json!({"a": [1]})), "{\"a\":[1]}");
    }

    #[tokio::test]
    async fn detached_bridge_reports_no_target() {
        let bridge = InstrumentationBridge::detached();
        assert!(bridge.current_target().is_none());
        assert_eq!(bridge.execute("1").await, Err(BridgeError::NoTarget));
        assert_eq!(
            bridge.get_buffer(&CollectorSpec::errors().slot).await,
            Err(BridgeError::NoTarget)
        );
    }
}
