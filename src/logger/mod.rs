//! Structured logging system for livesync
//!
//! This module provides a small, ergonomic logging API with:
//! - Standard log levels (Error/Warning/Info/Debug/Verbose)
//! - Per-subsystem debug control via --debug-<tag> flags
//! - Colored console output
//!
//! ## Usage
//!
//! ```rust
//! use livesync::logger::{self, LogTag};
//!
//! logger::error(LogTag::Transport, "Live channel refused");
//! logger::warning(LogTag::Health, "Backend unhealthy (failures=3)");
//! logger::info(LogTag::Events, "Subscription registered");
//! logger::debug(LogTag::Transport, "Frame received"); // Only with --debug-transport
//! logger::verbose(LogTag::Events, "Raw payload ..."); // Only with --verbose
//! ```
//!
//! ## Initialization
//!
//! Binaries install a configuration once at startup; library users get
//! Info-level defaults:
//! ```rust
//! use livesync::logger;
//! logger::set_logger_config(logger::config_from_args(&["--debug-health".to_string()]));
//! ```

mod config;
mod core;
mod format;
mod levels;
mod tags;

pub use config::{config_from_args, get_logger_config, set_logger_config, LoggerConfig};
pub use levels::LogLevel;
pub use tags::LogTag;

/// Log at ERROR level (always shown)
pub fn error(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Error, message);
}

/// Log at WARNING level
///
/// Warnings are shown by default (and still shown with --quiet).
pub fn warning(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Warning, message);
}

/// Log at INFO level (standard operations)
pub fn info(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Info, message);
}

/// Log at DEBUG level
///
/// Only shown when the --debug-<tag> flag for `tag` is present.
///
/// # Example
/// ```rust
/// use livesync::logger::{self, LogTag};
/// // Only shown with --debug-health
/// logger::debug(LogTag::Health, "Probe latency 12ms");
/// ```
pub fn debug(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Debug, message);
}

/// Log at VERBOSE level (very detailed tracing)
pub fn verbose(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Verbose, message);
}
