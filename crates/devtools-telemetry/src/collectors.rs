use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const DEFAULT_NAMESPACE: &str = "__soul";
pub const DEFAULT_MUTATION_CAPACITY: usize = 100;
pub const DEFAULT_BODY_LIMIT: usize = 5000;

const ERROR_COLLECTOR_JS: &str = include_str!("js/error_collector.js");
const MUTATION_COLLECTOR_JS: &str = include_str!("js/mutation_collector.js");
const NETWORK_COLLECTOR_JS: &str = include_str!("js/network_collector.js");

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectorKind {
    Error,
    Mutation,
    Network,
}

impl CollectorKind {
    pub const ALL: [CollectorKind; 3] = [
        CollectorKind::Error,
        CollectorKind::Mutation,
        CollectorKind::Network,
    ];

    /// Segment used in the marker and buffer names.
    pub fn slot_name(self) -> &'static str {
        match self {
            CollectorKind::Error => "errors",
            CollectorKind::Mutation => "mutations",
            CollectorKind::Network => "network",
        }
    }

    /// The install fragment: a function taking one config object argument and returning `true`
    /// when it installed, `false` when the marker was already present.
    pub fn install_source(self) -> &'static str {
        match self {
            CollectorKind::Error => ERROR_COLLECTOR_JS,
            CollectorKind::Mutation => MUTATION_COLLECTOR_JS,
            CollectorKind::Network => NETWORK_COLLECTOR_JS,
        }
    }

    /// Recognise an install fragment by its source text.
    pub fn from_install_source(source: &str) -> Option<CollectorKind> {
        CollectorKind::ALL
            .into_iter()
            .find(|kind| kind.install_source() == source)
    }
}

/// Names of the presence marker and the event buffer on the page's global object.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectorSlot {
    pub marker: String,
    pub buffer: String,
}

impl CollectorSlot {
    pub fn named(namespace: &str, name: &str) -> Self {
        Self {
            marker: format!("{namespace}_{name}_installed"),
            buffer: format!("{namespace}_{name}_buffer"),
        }
    }

    pub fn to_arg(&self) -> Value {
        json!({ "marker": self.marker, "buffer": self.buffer })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectorSpec {
    pub kind: CollectorKind,
    pub slot: CollectorSlot,
    /// `None` keeps every event until the buffer is cleared or the page reloads.
    pub capacity: Option<usize>,
    pub body_limit: usize,
}

impl CollectorSpec {
    pub fn for_kind(kind: CollectorKind, namespace: &str) -> Self {
        let capacity = match kind {
            CollectorKind::Mutation => Some(DEFAULT_MUTATION_CAPACITY),
            CollectorKind::Error | CollectorKind::Network => None,
        };
        Self {
            kind,
            slot: CollectorSlot::named(namespace, kind.slot_name()),
            capacity,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    pub fn errors() -> Self {
        Self::for_kind(CollectorKind::Error, DEFAULT_NAMESPACE)
    }

    pub fn mutations() -> Self {
        Self::for_kind(CollectorKind::Mutation, DEFAULT_NAMESPACE)
    }

    pub fn network() -> Self {
        Self::for_kind(CollectorKind::Network, DEFAULT_NAMESPACE)
    }

    pub fn in_namespace(mut self, namespace: &str) -> Self {
        self.slot = CollectorSlot::named(namespace, self.kind.slot_name());
        self
    }

    pub fn with_capacity(mut self, capacity: Option<usize>) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    pub fn install_source(&self) -> &'static str {
        self.kind.install_source()
    }

    /// Config object handed to the install fragment.
    pub fn install_args(&self) -> Value {
        json!({
            "marker": self.slot.marker,
            "buffer": self.slot.buffer,
            "capacity": self.capacity,
            "bodyLimit": self.body_limit,
        })
    }
}

/// Collector settings as they appear in configuration files.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorSettings {
    pub namespace: String,
    pub mutation_capacity: usize,
    pub body_limit: usize,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            mutation_capacity: DEFAULT_MUTATION_CAPACITY,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

impl CollectorSettings {
    pub fn spec(&self, kind: CollectorKind) -> CollectorSpec {
        let spec = CollectorSpec::for_kind(kind, &self.namespace).with_body_limit(self.body_limit);
        match kind {
            CollectorKind::Mutation => spec.with_capacity(Some(self.mutation_capacity)),
            CollectorKind::Error | CollectorKind::Network => spec,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_names_follow_namespace() {
        let spec = CollectorSpec::network();
        assert_eq!(spec.slot.marker, "__soul_network_installed");
        assert_eq!(spec.slot.buffer, "__soul_network_buffer");

        let custom = CollectorSpec::errors().in_namespace("__probe");
        assert_eq!(custom.slot.marker, "__probe_errors_installed");
        assert_ne!(custom.slot.marker, custom.slot.buffer);
    }

    #[test]
    fn only_mutations_are_bounded_by_default() {
        assert_eq!(CollectorSpec::mutations().capacity, Some(100));
        assert_eq!(CollectorSpec::errors().capacity, None);
        assert_eq!(CollectorSpec::network().capacity, None);
    }

    #[test]
    fn install_args_carry_names_and_limits() {
        let settings = CollectorSettings {
            namespace: "__t".into(),
            mutation_capacity: 10,
            body_limit: 64,
        };
        let args = settings.spec(CollectorKind::Mutation).install_args();
        assert_eq!(args["marker"], "__t_mutations_installed");
        assert_eq!(args["buffer"], "__t_mutations_buffer");
        assert_eq!(args["capacity"], 10);
        assert_eq!(args["bodyLimit"], 64);

        let args = settings.spec(CollectorKind::Error).install_args();
        assert!(args["capacity"].is_null());
    }

    #[test]
    fn fragments_never_hardcode_slot_names() {
        for kind in CollectorKind::ALL {
            let source = kind.install_source();
            assert!(source.trim_start().starts_with("function"));
            assert!(source.contains("config.marker"));
            assert!(!source.contains(DEFAULT_NAMESPACE));
            assert_eq!(CollectorKind::from_install_source(source), Some(kind));
        }
    }

    #[test]
    fn fragments_cap_only_when_capacity_is_a_number() {
        for kind in CollectorKind::ALL {
            let source = kind.install_source();
            assert!(source.contains("typeof config.capacity === 'number'"));
            assert!(!source.contains("config.capacity &&"));
        }
    }

    #[test]
    fn network_durations_never_go_negative() {
        let source = CollectorKind::Network.install_source();
        assert_eq!(source.matches("durationMs: Math.max(0, ").count(), 3);
        assert!(!source.contains("durationMs: now -"));
    }
}
