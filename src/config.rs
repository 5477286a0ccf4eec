//! Configuration system
//!
//! - `macros`: the `config_struct!` macro (single-source defaults)
//! - `schemas`: `SyncConfig` and its sections
//! - `utils`: TOML loading and validation

mod macros;
mod schemas;
mod utils;

pub use schemas::{EventsConfig, HealthConfig, SyncConfig, TransportConfig};
pub use utils::CONFIG_FILE_PATH;
