/// Configuration utilities - loading and validation
///
/// There is no global configuration instance: a `SyncConfig` is loaded (or
/// built in code) and handed to whatever owns the UI session.
use super::schemas::{EventsConfig, HealthConfig, SyncConfig, TransportConfig};
use crate::errors::ConfigError;
use crate::events::EventType;
use crate::logger::{self, LogTag};
use std::path::Path;

/// Default configuration file path
pub const CONFIG_FILE_PATH: &str = "data/livesync.toml";

impl SyncConfig {
    /// Load configuration from a TOML file
    ///
    /// A missing file yields the defaults. The result is validated before it
    /// is returned.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
            logger::info(
                LogTag::Config,
                &format!("Loaded configuration from {}", path.display()),
            );
            Self::parse(&contents)?
        } else {
            logger::info(
                LogTag::Config,
                &format!("No config file at {}, using defaults", path.display()),
            );
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config = Self::parse(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn parse(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str::<SyncConfig>(contents)?)
    }

    /// Serialize back to TOML (used to write a starter config)
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::invalid("config", e.to_string()))
    }

    /// Validate every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.health.validate()?;
        self.transport.validate()?;
        self.events.validate()?;
        Ok(())
    }
}

impl HealthConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_url("health.base_url", &self.base_url)?;
        require_positive("health.check_interval_ms", self.check_interval_ms)?;
        require_positive("health.max_interval_ms", self.max_interval_ms)?;
        require_positive("health.failure_threshold", self.failure_threshold as u64)?;
        require_positive("health.success_threshold", self.success_threshold as u64)?;
        require_positive("health.probe_timeout_ms", self.probe_timeout_ms)?;

        if self.max_interval_ms < self.check_interval_ms {
            return Err(ConfigError::invalid(
                "health.max_interval_ms",
                format!(
                    "must be >= check_interval_ms ({} < {})",
                    self.max_interval_ms, self.check_interval_ms
                ),
            ));
        }
        Ok(())
    }
}

impl TransportConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.live_url {
            let parsed = parse_url("transport.live_url", url)?;
            if !matches!(parsed.scheme(), "ws" | "wss") {
                return Err(ConfigError::invalid(
                    "transport.live_url",
                    format!("expected ws:// or wss://, got {}://", parsed.scheme()),
                ));
            }
        }
        if let Some(url) = &self.poll_url {
            parse_url("transport.poll_url", url)?;
        }
        require_positive("transport.poll_interval_ms", self.poll_interval_ms)?;
        require_positive(
            "transport.reconnect_base_delay_ms",
            self.reconnect_base_delay_ms,
        )?;
        require_positive(
            "transport.reconnect_max_delay_ms",
            self.reconnect_max_delay_ms,
        )?;
        require_positive(
            "transport.max_reconnect_attempts",
            self.max_reconnect_attempts as u64,
        )?;
        require_positive("transport.heartbeat_interval_ms", self.heartbeat_interval_ms)?;

        if self.reconnect_max_delay_ms < self.reconnect_base_delay_ms {
            return Err(ConfigError::invalid(
                "transport.reconnect_max_delay_ms",
                "must be >= reconnect_base_delay_ms",
            ));
        }
        Ok(())
    }
}

impl EventsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("events.flush_size", self.flush_size as u64)?;
        require_positive("events.flush_interval_ms", self.flush_interval_ms)?;
        self.buffered_event_types().map(|_| ())
    }

    /// Resolve `buffered_types` codes into event types
    pub fn buffered_event_types(&self) -> Result<Vec<EventType>, ConfigError> {
        self.buffered_types
            .iter()
            .map(|code| {
                EventType::from_code(code).ok_or_else(|| ConfigError::UnknownEventType(code.clone()))
            })
            .collect()
    }
}

fn require_positive(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::invalid(field, "must be greater than 0"));
    }
    Ok(())
}

fn parse_url(field: &'static str, value: &str) -> Result<url::Url, ConfigError> {
    url::Url::parse(value).map_err(|source| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.health.failure_threshold, 3);
        assert_eq!(config.transport.max_reconnect_attempts, 5);
        assert_eq!(config.events.flush_size, 50);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SyncConfig::from_toml_str(
            r#"
            [health]
            check_interval_ms = 1000
            max_interval_ms = 8000
            failure_threshold = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.health.check_interval_ms, 1000);
        assert_eq!(config.health.max_interval_ms, 8000);
        assert_eq!(config.health.failure_threshold, 2);
        assert_eq!(config.health.probe_timeout_ms, 5_000);
        assert_eq!(config.transport, TransportConfig::default());
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let err = SyncConfig::from_toml_str("[health]\nfailure_threshold = 0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "health.failure_threshold",
                ..
            }
        ));
    }

    #[test]
    fn test_max_below_base_rejected() {
        let err = SyncConfig::from_toml_str(
            "[health]\ncheck_interval_ms = 5000\nmax_interval_ms = 1000\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("health.max_interval_ms"));
    }

    #[test]
    fn test_live_url_scheme_checked() {
        let err = SyncConfig::from_toml_str("[transport]\nlive_url = \"http://example.com/ws\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("transport.live_url"));

        let ok = SyncConfig::from_toml_str("[transport]\nlive_url = \"wss://example.com/ws\"\n");
        assert!(ok.is_ok());
    }

    #[test]
    fn test_unknown_buffered_type_rejected() {
        let err = SyncConfig::from_toml_str("[events]\nbuffered_types = [\"bogus.kind\"]\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownEventType(ref code) if code == "bogus.kind"));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let err = SyncConfig::from_toml_str("[health\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("livesync.toml");

        let missing = SyncConfig::load_from_path(&path).unwrap();
        assert_eq!(missing, SyncConfig::default());

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[events]\nflush_size = 7").unwrap();
        drop(file);

        let loaded = SyncConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded.events.flush_size, 7);
    }

    #[test]
    fn test_round_trip_starter_config() {
        let text = SyncConfig::default().to_toml_string().unwrap();
        let parsed = SyncConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, SyncConfig::default());
    }
}
