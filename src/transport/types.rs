use serde::{Deserialize, Serialize};
use std::fmt;

/// Live-channel state as seen by consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// No live channel; updates arrive through the poll fallback
    Degraded,
}

/// Delivery path currently feeding the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Live,
    Polling,
    Disconnected,
}

impl ConnectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionType::Live => "live",
            ConnectionType::Polling => "polling",
            ConnectionType::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Read-only connection summary for the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub is_connected: bool,
    pub connection_type: ConnectionType,
    pub reconnect_attempts: u32,
}

impl ConnectionStatus {
    pub fn disconnected() -> Self {
        Self {
            is_connected: false,
            connection_type: ConnectionType::Disconnected,
            reconnect_attempts: 0,
        }
    }
}
