/// Error types for the synchronization layer
///
/// Only configuration errors ever reach a caller as `Err`: network and
/// protocol failures are absorbed into health / connection state and logged,
/// consumer failures are isolated at dispatch time.
use thiserror::Error;

// =============================================================================
// CONFIGURATION ERRORS (fail fast at construction)
// =============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("invalid URL for `{field}` ({value}): {source}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unknown event type `{0}` in events.buffered_types")]
    UnknownEventType(String),

    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

// =============================================================================
// TRANSPORT ERRORS (transient-network, drive backoff)
// =============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP {status} from {endpoint}")]
    HttpStatus { endpoint: String, status: u16 },

    #[error("channel closed by peer")]
    Closed,

    #[error("send failed: {0}")]
    Send(String),

    #[error("network error: {0}")]
    Network(String),
}

// =============================================================================
// PROTOCOL ERRORS (malformed inbound messages, logged and dropped)
// =============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed JSON: {0}")]
    MalformedJson(String),

    #[error("missing or invalid field `{0}`")]
    MissingField(&'static str),

    #[error("invalid timestamp `{0}`")]
    InvalidTimestamp(String),

    #[error("unknown event type `{0}`")]
    UnknownType(String),

    #[error("invalid payload for {event_type}: {reason}")]
    InvalidPayload {
        event_type: &'static str,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::invalid("health.failure_threshold", "must be greater than 0");
        assert_eq!(
            err.to_string(),
            "invalid value for `health.failure_threshold`: must be greater than 0"
        );
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::HttpStatus {
            endpoint: "http://localhost/health".to_string(),
            status: 503,
        };
        assert_eq!(err.to_string(), "HTTP 503 from http://localhost/health");
        assert_eq!(
            TransportError::Timeout { timeout_ms: 250 }.to_string(),
            "timed out after 250ms"
        );
    }
}
