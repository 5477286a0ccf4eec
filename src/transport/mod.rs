//! Live channel with polling fallback
//!
//! - `channel`: `LiveConnector` / `LiveChannel` seams and the WebSocket
//!   implementation (`live` feature)
//! - `poll`: `PollSource`, `HttpPollSource` and `PollOutcome`
//! - `manager`: `TransportManager`, the per-backend state machine
//! - `types`: `ConnectionState`, `ConnectionStatus`

mod channel;
mod manager;
mod poll;
mod types;

#[cfg(test)]
mod tests;

#[cfg(feature = "live")]
pub use channel::WsConnector;
pub use channel::{LiveChannel, LiveConnector};
pub use manager::{TransportManager, HEARTBEAT_FRAME};
pub use poll::{HttpPollSource, PollOutcome, PollSource};
pub use types::{ConnectionState, ConnectionStatus, ConnectionType};
