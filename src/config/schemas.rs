/// Configuration schemas - all config structures defined once with defaults
///
/// Each struct is defined using the config_struct! macro which provides:
/// - Single-source definition (no repetition)
/// - Embedded defaults
/// - Serde support
///
/// Durations are stored as integer milliseconds so they read naturally in
/// TOML; use the accessor methods to get `Duration`s.
use crate::config_struct;
use std::time::Duration;

// ============================================================================
// HEALTH MONITOR CONFIGURATION
// ============================================================================

config_struct! {
    /// Health monitor configuration
    pub struct HealthConfig {
        /// Backend base URL; the probe issues `GET <base_url>/health`
        base_url: String = "http://127.0.0.1:8080".to_string(),

        /// Check interval while healthy (backoff floor)
        check_interval_ms: u64 = 30_000,

        /// Backoff ceiling
        max_interval_ms: u64 = 300_000,

        /// Failures per doubling of the check interval
        failure_threshold: u32 = 3,

        /// Consecutive successes an unhealthy monitor needs to recover
        success_threshold: u32 = 1,

        /// Probe is abandoned (and counted as failure) after this long
        probe_timeout_ms: u64 = 5_000,
    }
}

impl HealthConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Full URL of the health endpoint
    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_url.trim_end_matches('/'))
    }
}

// ============================================================================
// TRANSPORT CONFIGURATION
// ============================================================================

config_struct! {
    /// Live channel and polling fallback configuration
    pub struct TransportConfig {
        /// WebSocket URL of the live channel; polling only when unset
        live_url: Option<String> = None,

        /// Poll fallback URL; defaults to the health endpoint
        poll_url: Option<String> = None,

        /// Interval between polls while degraded
        poll_interval_ms: u64 = 30_000,

        /// First reconnect delay (doubles per attempt)
        reconnect_base_delay_ms: u64 = 1_000,

        /// Reconnect delay ceiling
        reconnect_max_delay_ms: u64 = 30_000,

        /// Reconnect attempts before settling into polling for good
        max_reconnect_attempts: u32 = 5,

        /// Ping cadence on an open live channel
        heartbeat_interval_ms: u64 = 30_000,
    }
}

impl TransportConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

// ============================================================================
// EVENTS CONFIGURATION
// ============================================================================

config_struct! {
    /// Event registry and record buffering configuration
    pub struct EventsConfig {
        /// Records per batch; reaching it flushes the buffer
        flush_size: usize = 50,

        /// Periodic flush of partially filled buffers
        flush_interval_ms: u64 = 10_000,

        /// Event type codes routed through a record buffer
        buffered_types: Vec<String> = vec!["activity.logged".to_string()],
    }
}

impl EventsConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

// ============================================================================
// ROOT CONFIGURATION
// ============================================================================

config_struct! {
    /// Root configuration structure containing all sub-configurations
    pub struct SyncConfig {
        /// Health monitor configuration
        health: HealthConfig = HealthConfig::default(),

        /// Transport configuration
        transport: TransportConfig = TransportConfig::default(),

        /// Events configuration
        events: EventsConfig = EventsConfig::default(),
    }
}
