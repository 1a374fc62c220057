//! Telemetry captured inside an instrumented page and the collector fragments that capture it.
//!
//! Collectors are JavaScript functions installed once per page context. Each one guards itself
//! with a marker on the page's global object and appends wire-format events (see [`events`]) to a
//! named buffer that the host later reads back through the instrumentation bridge.

pub mod buffer;
pub mod collectors;
pub mod events;

pub use buffer::{truncate_body, CollectorBuffer};
pub use collectors::{
    CollectorKind, CollectorSettings, CollectorSlot, CollectorSpec, DEFAULT_BODY_LIMIT,
    DEFAULT_MUTATION_CAPACITY, DEFAULT_NAMESPACE,
};
pub use events::{
    ErrorEvent, ErrorKind, MutationEvent, MutationKind, NetworkEvent, NetworkTransport,
    TelemetryEvent,
};
