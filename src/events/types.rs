/// Event model for the synchronization layer
///
/// Every inbound message becomes a `SyncEvent` whose payload is a tagged
/// variant per category, so handlers match exhaustively instead of poking
/// at untyped JSON.
use crate::transport::ConnectionStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Event categories handlers subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    WorkspaceCreated,
    WorkspaceUpdated,
    WorkspaceDeleted,
    ActivityLogged,
    PerformanceSample,
    /// Generated locally when the transport status changes
    ConnectionChanged,
    /// Refetch hint (successful poll, or server-initiated)
    Refresh,
}

impl EventType {
    pub const ALL: [EventType; 7] = [
        EventType::WorkspaceCreated,
        EventType::WorkspaceUpdated,
        EventType::WorkspaceDeleted,
        EventType::ActivityLogged,
        EventType::PerformanceSample,
        EventType::ConnectionChanged,
        EventType::Refresh,
    ];

    /// Wire code (the `type` field of inbound messages)
    pub fn code(&self) -> &'static str {
        match self {
            EventType::WorkspaceCreated => "workspace.created",
            EventType::WorkspaceUpdated => "workspace.updated",
            EventType::WorkspaceDeleted => "workspace.deleted",
            EventType::ActivityLogged => "activity.logged",
            EventType::PerformanceSample => "performance.sample",
            EventType::ConnectionChanged => "connection.changed",
            EventType::Refresh => "refresh",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "workspace.created" => Some(EventType::WorkspaceCreated),
            "workspace.updated" => Some(EventType::WorkspaceUpdated),
            "workspace.deleted" => Some(EventType::WorkspaceDeleted),
            "activity.logged" => Some(EventType::ActivityLogged),
            "performance.sample" => Some(EventType::PerformanceSample),
            "connection.changed" => Some(EventType::ConnectionChanged),
            "refresh" => Some(EventType::Refresh),
            _ => None,
        }
    }

    /// Types the backend never sends; inbound frames claiming them are rejected
    pub fn is_local_only(&self) -> bool {
        matches!(self, EventType::ConnectionChanged)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Workspace create/update payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceChange {
    #[serde(alias = "id")]
    pub workspace_id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Remaining fields, passed through untouched
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// One activity-log record (the high-frequency, buffered stream)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub actor: Option<String>,
    pub action: String,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Performance metric sample for one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub resource_id: String,
    pub metric: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshHint {
    /// Origin of the hint (`poll` or `server`)
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub resource_id: Option<String>,
}

/// Typed payload, one variant per `EventType`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    WorkspaceCreated(WorkspaceChange),
    WorkspaceUpdated(WorkspaceChange),
    WorkspaceDeleted { workspace_id: String },
    ActivityLogged(ActivityRecord),
    PerformanceSample(PerformanceSample),
    ConnectionChanged(ConnectionStatus),
    Refresh(RefreshHint),
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::WorkspaceCreated(_) => EventType::WorkspaceCreated,
            EventPayload::WorkspaceUpdated(_) => EventType::WorkspaceUpdated,
            EventPayload::WorkspaceDeleted { .. } => EventType::WorkspaceDeleted,
            EventPayload::ActivityLogged(_) => EventType::ActivityLogged,
            EventPayload::PerformanceSample(_) => EventType::PerformanceSample,
            EventPayload::ConnectionChanged(_) => EventType::ConnectionChanged,
            EventPayload::Refresh(_) => EventType::Refresh,
        }
    }

    /// Resource id used by subscription filters
    pub fn resource_id(&self) -> Option<&str> {
        match self {
            EventPayload::WorkspaceCreated(change) | EventPayload::WorkspaceUpdated(change) => {
                Some(&change.workspace_id)
            }
            EventPayload::WorkspaceDeleted { workspace_id } => Some(workspace_id),
            EventPayload::ActivityLogged(record) => record.workspace_id.as_deref(),
            EventPayload::PerformanceSample(sample) => Some(&sample.resource_id),
            EventPayload::ConnectionChanged(_) => None,
            EventPayload::Refresh(hint) => hint.resource_id.as_deref(),
        }
    }
}

/// One classified event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl SyncEvent {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn at(timestamp: DateTime<Utc>, payload: EventPayload) -> Self {
        Self { timestamp, payload }
    }

    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }

    pub fn resource_id(&self) -> Option<&str> {
        self.payload.resource_id()
    }

    pub fn connection_changed(status: ConnectionStatus) -> Self {
        Self::new(EventPayload::ConnectionChanged(status))
    }

    pub fn refresh(source: &str) -> Self {
        Self::new(EventPayload::Refresh(RefreshHint {
            source: source.to_string(),
            resource_id: None,
        }))
    }
}
