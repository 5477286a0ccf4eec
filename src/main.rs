use anyhow::Context;
use clap::Parser;
use livesync::{
    config::CONFIG_FILE_PATH,
    events::{EventPayload, EventType, SyncEvent},
    logger::{self, LogTag},
    SyncConfig, SyncSession,
};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "livesync")]
#[command(about = "Keep a live view of a backend: health, live channel, event stream", long_about = None)]
struct Args {
    /// Configuration file (missing file = defaults)
    #[arg(short, long, default_value = CONFIG_FILE_PATH)]
    config: String,

    /// Override health.base_url
    #[arg(long)]
    base_url: Option<String>,

    /// Override transport.live_url (ws:// or wss://)
    #[arg(long)]
    live_url: Option<String>,

    /// Override transport.poll_url
    #[arg(long)]
    poll_url: Option<String>,

    /// Seconds between status lines
    #[arg(long, default_value = "30")]
    status_every: u64,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,

    /// Enable debug logs for a tag (system, config, health, transport, events, all)
    #[arg(long = "debug", value_name = "TAG")]
    debug: Vec<String>,

    /// Verbose logs everywhere
    #[arg(long)]
    verbose: bool,

    /// Warnings and errors only
    #[arg(long)]
    quiet: bool,

    /// Disable colors
    #[arg(long)]
    plain_logs: bool,
}

impl Args {
    /// Translate into the logger's flag vocabulary
    fn logger_flags(&self) -> Vec<String> {
        let mut flags: Vec<String> = self.debug.iter().map(|tag| format!("--debug-{}", tag)).collect();
        if self.verbose {
            flags.push("--verbose".to_string());
        }
        if self.quiet {
            flags.push("--quiet".to_string());
        }
        if self.plain_logs {
            flags.push("--plain-logs".to_string());
        }
        flags
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::set_logger_config(logger::config_from_args(&args.logger_flags()));

    let mut config = SyncConfig::load_from_path(&args.config)
        .with_context(|| format!("loading {}", args.config))?;
    if let Some(url) = &args.base_url {
        config.health.base_url = url.clone();
    }
    if let Some(url) = &args.live_url {
        config.transport.live_url = Some(url.clone());
    }
    if let Some(url) = &args.poll_url {
        config.transport.poll_url = Some(url.clone());
    }
    config.validate().context("invalid configuration")?;

    if args.print_config {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    let session = SyncSession::new(config).context("building sync session")?;
    for event_type in EventType::ALL {
        session.subscribe(event_type, print_event, None);
    }

    logger::info(
        LogTag::System,
        &format!("livesync watching {}", session.config().health.base_url),
    );
    session.start();

    let mut status_ticker = tokio::time::interval(Duration::from_secs(args.status_every.max(1)));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = status_ticker.tick() => {
                let status = session.connection_status();
                let health = session.health_status();
                logger::info(
                    LogTag::System,
                    &format!(
                        "connection={} attempts={} backend_healthy={} failures={}",
                        status.connection_type,
                        status.reconnect_attempts,
                        session.is_backend_healthy(),
                        health.consecutive_failures
                    ),
                );
            }
        }
    }

    logger::info(LogTag::System, "Shutting down");
    session.shutdown().await;
    Ok(())
}

fn print_event(event: &SyncEvent) {
    let detail = match &event.payload {
        EventPayload::ConnectionChanged(status) => format!(
            "{} (connected={}, attempts={})",
            status.connection_type, status.is_connected, status.reconnect_attempts
        ),
        EventPayload::Refresh(hint) => format!("source={}", hint.source),
        EventPayload::ActivityLogged(record) => format!(
            "{} by {}",
            record.action,
            record.actor.as_deref().unwrap_or("?")
        ),
        EventPayload::PerformanceSample(sample) => {
            format!("{} {}={}", sample.resource_id, sample.metric, sample.value)
        }
        EventPayload::WorkspaceCreated(change) | EventPayload::WorkspaceUpdated(change) => {
            change.workspace_id.clone()
        }
        EventPayload::WorkspaceDeleted { workspace_id } => workspace_id.clone(),
    };

    println!(
        "{} {:<20} {}",
        event.timestamp.format("%H:%M:%S%.3f"),
        event.event_type().code(),
        detail
    );
}
