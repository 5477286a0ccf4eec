use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of the monitor's view of the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub is_healthy: bool,
    pub last_check_at: DateTime<Utc>,
    pub consecutive_failures: u32,
    pub next_check_at: DateTime<Utc>,
    /// Latency of the last successful probe; cleared on failure
    pub last_response_time_ms: Option<u64>,
    /// Reason of the last failed probe
    pub last_error: Option<String>,
}

impl HealthStatus {
    /// Optimistic initial status: healthy, no failures, checked "now"
    pub fn initial() -> Self {
        let now = Utc::now();
        Self {
            is_healthy: true,
            last_check_at: now,
            consecutive_failures: 0,
            next_check_at: now,
            last_response_time_ms: None,
            last_error: None,
        }
    }
}

/// Outcome of a single probe
///
/// Network errors, non-2xx responses and timeouts all end up as
/// `healthy: false`; the monitor only cares about reachability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub healthy: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn success(latency_ms: u64) -> Self {
        Self {
            healthy: true,
            latency_ms,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            latency_ms: 0,
            error: Some(error.into()),
        }
    }
}
