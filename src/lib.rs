//! livesync - resilient real-time synchronization for dashboard clients
//!
//! - `health`: adaptive backend liveness monitoring
//! - `transport`: live channel with polling fallback and bounded reconnects
//! - `events`: typed event classification, fan-out and record batching
//! - `session`: one explicit owner per UI session

pub mod backoff;
pub mod config;
pub mod errors;
pub mod events;
pub mod health;
pub mod logger;
pub mod session;
pub mod transport;

pub use config::SyncConfig;
pub use session::SyncSession;
