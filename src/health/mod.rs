//! Backend health monitoring
//!
//! `HealthMonitor` probes a single backend endpoint on an adaptive cadence:
//! the check interval starts at `check_interval_ms` and doubles every
//! `failure_threshold` consecutive failures, up to `max_interval_ms`.
//!
//! - `probe`: the `HealthProbe` trait and the HTTP implementation
//! - `types`: `HealthStatus` and `ProbeResult`
//! - `monitor`: the monitor itself (single-flight probing, listeners)

mod monitor;
mod probe;
mod types;


pub use monitor::{HealthListener, HealthMonitor, ListenerId};
pub use probe::{HealthProbe, HttpHealthProbe};
pub use types::{HealthStatus, ProbeResult};
