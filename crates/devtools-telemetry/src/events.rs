use serde::{Deserialize, Deserializer, Serialize};

/// One captured event, tagged on the wire by `type`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TelemetryEvent {
    Error(ErrorEvent),
    Mutation(MutationEvent),
    Network(NetworkEvent),
}

impl TelemetryEvent {
    /// Capture time in milliseconds since the Unix epoch.
    pub fn timestamp(&self) -> u64 {
        match self {
            TelemetryEvent::Error(event) => event.timestamp,
            TelemetryEvent::Mutation(event) => event.timestamp,
            TelemetryEvent::Network(event) => event.timestamp,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            TelemetryEvent::Error(_) => "error",
            TelemetryEvent::Mutation(_) => "mutation",
            TelemetryEvent::Network(_) => "network",
        }
    }

    pub fn as_error(&self) -> Option<&ErrorEvent> {
        match self {
            TelemetryEvent::Error(event) => Some(event),
            _ => None,
        }
    }

    pub fn as_mutation(&self) -> Option<&MutationEvent> {
        match self {
            TelemetryEvent::Mutation(event) => Some(event),
            _ => None,
        }
    }

    pub fn as_network(&self) -> Option<&NetworkEvent> {
        match self {
            TelemetryEvent::Network(event) => Some(event),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Error,
    Warning,
    Uncaught,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 3] = [ErrorKind::Error, ErrorKind::Warning, ErrorKind::Uncaught];

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Error => "error",
            ErrorKind::Warning => "warning",
            ErrorKind::Uncaught => "uncaught",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    pub timestamp: u64,
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub col: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorEvent {
    /// `url:line:col` for uncaught exceptions that carry a source location.
    pub fn location(&self) -> Option<String> {
        let url = self.url.as_deref().filter(|url| !url.is_empty())?;
        Some(format!(
            "{}:{}:{}",
            url,
            self.line.unwrap_or(0),
            self.col.unwrap_or(0)
        ))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationKind {
    ChildList,
    Attributes,
}

impl MutationKind {
    pub const ALL: [MutationKind; 2] = [MutationKind::ChildList, MutationKind::Attributes];

    pub fn as_str(self) -> &'static str {
        match self {
            MutationKind::ChildList => "childList",
            MutationKind::Attributes => "attributes",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationEvent {
    pub timestamp: u64,
    pub kind: MutationKind,
    /// `NODENAME` or `NODENAME#id`.
    pub target: String,
    pub added_count: u32,
    pub removed_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NetworkTransport {
    Fetch,
    Xhr,
}

impl NetworkTransport {
    pub const ALL: [NetworkTransport; 2] = [NetworkTransport::Fetch, NetworkTransport::Xhr];

    pub fn as_str(self) -> &'static str {
        match self {
            NetworkTransport::Fetch => "fetch",
            NetworkTransport::Xhr => "xhr",
        }
    }
}

/// A completed (or failed) request. `timestamp` is the completion time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkEvent {
    pub timestamp: u64,
    pub transport: NetworkTransport,
    pub method: String,
    pub url: String,
    /// `0` when the request failed before a response arrived.
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    #[serde(deserialize_with = "whole_millis")]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NetworkEvent {
    pub fn started_at(&self) -> u64 {
        self.timestamp.saturating_sub(self.duration_ms)
    }

    pub fn is_failure(&self) -> bool {
        self.status == 0 || self.status >= 400 || self.error.is_some()
    }
}

/// Page clocks can step backwards; negative or fractional durations become whole milliseconds.
fn whole_millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let raw = f64::deserialize(deserializer)?;
    if raw.is_finite() && raw > 0.0 {
        Ok(raw.round() as u64)
    } else {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn decodes_collector_wire_shapes() {
        let raw = json!([
            {"type": "error", "timestamp": 10, "kind": "uncaught", "message": "boom",
             "url": "https://a.test/app.js", "line": 3, "col": 7, "stack": null},
            {"type": "mutation", "timestamp": 11, "kind": "childList", "target": "DIV#root",
             "addedCount": 2, "removedCount": 0, "attribute": null},
            {"type": "network", "timestamp": 40, "transport": "xhr", "method": "POST",
             "url": "/api", "status": 0, "durationMs": 30, "error": "network error"}
        ]);

        let events: Vec<TelemetryEvent> = serde_json::from_value(raw).unwrap();
        assert_eq!(events.len(), 3);

        let error = events[0].as_error().unwrap();
        assert_eq!(error.kind, ErrorKind::Uncaught);
        assert_eq!(error.location().as_deref(), Some("https://a.test/app.js:3:7"));
        assert_eq!(error.stack, None);

        let mutation = events[1].as_mutation().unwrap();
        assert_eq!(mutation.target, "DIV#root");
        assert_eq!(mutation.attribute, None);

        let network = events[2].as_network().unwrap();
        assert_eq!(network.started_at(), 10);
        assert!(network.is_failure());
    }

    #[test]
    fn serializes_camel_case_with_type_tag() {
        let event = TelemetryEvent::Network(NetworkEvent {
            timestamp: 1_700_000_000_000,
            transport: NetworkTransport::Fetch,
            method: "GET".into(),
            url: "/a".into(),
            status: 200,
            status_text: Some("OK".into()),
            duration_ms: 12,
            response_body_prefix: Some("...".into()),
            error: None,
        });

        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "network", "timestamp": 1_700_000_000_000u64, "transport": "fetch",
                   "method": "GET", "url": "/a", "status": 200, "statusText": "OK",
                   "durationMs": 12, "responseBodyPrefix": "..."})
        );
        assert_eq!(event.type_name(), "network");
    }

    #[test]
    fn backwards_clock_steps_decode_as_zero_duration() {
        let raw = json!([
            {"type": "network", "timestamp": 100, "transport": "fetch", "method": "GET",
             "url": "/a", "status": 200, "durationMs": -5},
            {"type": "network", "timestamp": 100, "transport": "xhr", "method": "GET",
             "url": "/b", "status": 200, "durationMs": 12.6}
        ]);

        let events: Vec<TelemetryEvent> = serde_json::from_value(raw).unwrap();
        assert_eq!(events[0].as_network().unwrap().duration_ms, 0);
        assert_eq!(events[0].as_network().unwrap().started_at(), 100);
        assert_eq!(events[1].as_network().unwrap().duration_ms, 13);
    }

    #[test]
    fn rejects_unknown_event_type() {
        let raw = json!({"type": "console", "timestamp": 1, "message": "x"});
        assert!(serde_json::from_value::<TelemetryEvent>(raw).is_err());
    }
}
