//! Event classification and fan-out
//!
//! - `types`: `EventType` codes and the typed `SyncEvent` payloads
//! - `parse`: inbound frame parsing (`parse_inbound`)
//! - `registry`: `EventRegistry` subscriptions, dispatch and batching
//! - `buffer`: `RecordBuffer`, the per-category batch buffer

mod buffer;
mod metrics;
mod parse;
mod registry;
mod types;


pub use buffer::RecordBuffer;
pub use metrics::{RegistryMetrics, RegistryMetricsSnapshot};
pub use parse::parse_inbound;
pub use registry::{BatchHandler, DispatchReport, EventHandler, EventRegistry, SubscriptionId};
pub use types::{
    ActivityRecord, EventPayload, EventType, PerformanceSample, RefreshHint, SyncEvent,
    WorkspaceChange,
};
