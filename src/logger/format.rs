//! Log formatting and output with ANSI colors
//!
//! Handles:
//! - Colorized console output with tag and level formatting
//! - Plain output when colors are disabled
//! - Broken pipe handling for piped commands

use super::config::get_logger_config;
use super::levels::LogLevel;
use super::tags::LogTag;
use chrono::Local;
use colored::*;
use std::io::{stderr, stdout, ErrorKind, Write};

/// Log format widths for alignment
const TAG_WIDTH: usize = 10;
const LEVEL_WIDTH: usize = 7;

/// Format and output a log message
///
/// Errors and warnings go to stderr, everything else to stdout.
pub fn format_and_log(tag: LogTag, level: LogLevel, message: &str) {
    let now = Local::now();
    let time = now.format("%H:%M:%S%.3f").to_string();
    let plain = get_logger_config().plain;

    let line = if plain {
        format_plain_line(&time, tag, level, message)
    } else {
        format!(
            "{} [{}] [{}] {}",
            time.dimmed(),
            format_tag(&tag),
            format_level(level),
            message
        )
    };

    match level {
        LogLevel::Error | LogLevel::Warning => print_safe(&mut stderr(), &line),
        _ => print_safe(&mut stdout(), &line),
    }
}

/// Uncolored line layout, shared by plain console output and tests
pub fn format_plain_line(time: &str, tag: LogTag, level: LogLevel, message: &str) -> String {
    format!(
        "{} [{:<tag_w$}] [{:<level_w$}] {}",
        time,
        tag.to_plain_string(),
        level.as_str(),
        message,
        tag_w = TAG_WIDTH,
        level_w = LEVEL_WIDTH
    )
}

/// Format a tag with appropriate color
fn format_tag(tag: &LogTag) -> ColoredString {
    let label = format!("{:<width$}", tag.to_plain_string(), width = TAG_WIDTH);
    match tag {
        LogTag::System => label.bright_yellow().bold(),
        LogTag::Config => label.bright_white().bold(),
        LogTag::Health => label.bright_green().bold(),
        LogTag::Transport => label.bright_cyan().bold(),
        LogTag::Events => label.bright_magenta().bold(),
    }
}

/// Format a level with appropriate color
fn format_level(level: LogLevel) -> ColoredString {
    let label = format!("{:<width$}", level.as_str(), width = LEVEL_WIDTH);
    match level {
        LogLevel::Error => label.bright_red().bold(),
        LogLevel::Warning => label.bright_yellow().bold(),
        LogLevel::Info => label.bright_blue(),
        LogLevel::Debug => label.bright_black(),
        LogLevel::Verbose => label.dimmed(),
    }
}

/// Write a line, ignoring broken pipes (e.g. `livesync | head`)
fn print_safe<W: Write>(out: &mut W, line: &str) {
    if let Err(e) = writeln!(out, "{}", line) {
        if e.kind() == ErrorKind::BrokenPipe {
            return;
        }
    }
    let _ = out.flush();
}
