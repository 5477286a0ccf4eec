/// Inbound frame classification
///
/// Frames are JSON objects of the shape
/// `{ "type": <code>, "timestamp": <ISO-8601>, "data": { .. } }`.
use super::types::{
    ActivityRecord, EventPayload, EventType, PerformanceSample, RefreshHint, SyncEvent,
    WorkspaceChange,
};
use crate::errors::ProtocolError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Parse one raw text frame into a typed event
pub fn parse_inbound(text: &str) -> Result<SyncEvent, ProtocolError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::MalformedJson(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| ProtocolError::MalformedJson("expected a JSON object".to_string()))?;

    let code = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingField("type"))?;
    let raw_timestamp = object
        .get("timestamp")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingField("timestamp"))?;
    let data = object
        .get("data")
        .filter(|data| data.is_object())
        .ok_or(ProtocolError::MissingField("data"))?;

    let event_type = EventType::from_code(code)
        .filter(|event_type| !event_type.is_local_only())
        .ok_or_else(|| ProtocolError::UnknownType(code.to_string()))?;
    let timestamp = DateTime::parse_from_rfc3339(raw_timestamp)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| ProtocolError::InvalidTimestamp(raw_timestamp.to_string()))?;

    let payload = match event_type {
        EventType::WorkspaceCreated => EventPayload::WorkspaceCreated(decode(event_type, data)?),
        EventType::WorkspaceUpdated => EventPayload::WorkspaceUpdated(decode(event_type, data)?),
        EventType::WorkspaceDeleted => {
            let change: WorkspaceChange = decode(event_type, data)?;
            EventPayload::WorkspaceDeleted {
                workspace_id: change.workspace_id,
            }
        }
        EventType::ActivityLogged => {
            EventPayload::ActivityLogged(decode::<ActivityRecord>(event_type, data)?)
        }
        EventType::PerformanceSample => {
            EventPayload::PerformanceSample(decode::<PerformanceSample>(event_type, data)?)
        }
        EventType::Refresh => {
            let mut hint: RefreshHint = decode(event_type, data)?;
            if hint.source.is_empty() {
                hint.source = "server".to_string();
            }
            EventPayload::Refresh(hint)
        }
        EventType::ConnectionChanged => {
            return Err(ProtocolError::UnknownType(code.to_string()));
        }
    };

    Ok(SyncEvent::at(timestamp, payload))
}

fn decode<T: DeserializeOwned>(event_type: EventType, data: &Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data.clone()).map_err(|e| ProtocolError::InvalidPayload {
        event_type: event_type.code(),
        reason: e.to_string(),
    })
}
