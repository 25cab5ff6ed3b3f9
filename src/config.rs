//! Stats Configuration
//!
//! Settings come from environment variables, or from a TOML document for
//! embedders that keep their configuration in files.
//!
//! - `STATS_SHARD_COUNT`: shards per aggregation map (default: 16, power of two)
//! - `STATS_SHARD_CAPACITY`: tuples pre-allocated per shard (default: 0)
//! - `STATS_LOG`: tracing filter directive (default: info)
//! - `STATS_LOG_JSON`: emit JSON log lines (default: false)

use crate::stats::DEFAULT_SHARD_COUNT;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Largest accepted shard count
pub const MAX_SHARD_COUNT: usize = 1024;

/// Stats core configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Shards per aggregation map
    pub shard_count: usize,
    /// Tuples pre-allocated per shard
    pub initial_shard_capacity: usize,
    /// Tracing filter directive, overridden by `RUST_LOG` when set
    pub log_filter: String,
    /// Emit JSON log lines
    pub json_logs: bool,
}

impl Default for StatsConfig {
    fn default() -> Self {
        StatsConfig {
            shard_count: DEFAULT_SHARD_COUNT,
            initial_shard_capacity: 0,
            log_filter: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Error returned for unreadable or invalid configuration
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "failed to read config: {}", e),
            ConfigError::Parse(e) => write!(f, "failed to parse config: {}", e),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl StatsConfig {
    /// Load configuration from environment variables. Unparseable values
    /// fall back to defaults.
    pub fn from_env() -> Self {
        let defaults = StatsConfig::default();
        StatsConfig {
            shard_count: std::env::var("STATS_SHARD_COUNT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.shard_count),
            initial_shard_capacity: std::env::var("STATS_SHARD_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.initial_shard_capacity),
            log_filter: std::env::var("STATS_LOG").unwrap_or(defaults.log_filter),
            json_logs: std::env::var("STATS_LOG_JSON")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.json_logs),
        }
    }

    /// Parse and validate a TOML document. Missing keys take defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: StatsConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.shard_count.is_power_of_two() || self.shard_count > MAX_SHARD_COUNT {
            return Err(ConfigError::Invalid(format!(
                "shard_count must be a power of two between 1 and {}, got {}",
                MAX_SHARD_COUNT, self.shard_count
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = StatsConfig::default();
        assert_eq!(config.shard_count, DEFAULT_SHARD_COUNT);
        assert_eq!(config.log_filter, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("STATS_SHARD_COUNT", "64");
        std::env::set_var("STATS_LOG_JSON", "1");
        let config = StatsConfig::from_env();
        assert_eq!(config.shard_count, 64);
        assert!(config.json_logs);
        std::env::remove_var("STATS_SHARD_COUNT");
        std::env::remove_var("STATS_LOG_JSON");
    }

    #[test]
    fn test_toml_partial_document() {
        let config = StatsConfig::from_toml_str("shard_count = 4\nlog_filter = \"debug\"\n").unwrap();
        assert_eq!(config.shard_count, 4);
        assert_eq!(config.log_filter, "debug");
        assert_eq!(config.initial_shard_capacity, 0);
    }

    #[test]
    fn test_toml_rejects_bad_shard_count() {
        assert!(matches!(
            StatsConfig::from_toml_str("shard_count = 3"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            StatsConfig::from_toml_str("shard_count = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            StatsConfig::from_toml_str("shard_count = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "shard_count = 32").unwrap();
        writeln!(file, "json_logs = true").unwrap();
        let config = StatsConfig::from_file(file.path()).unwrap();
        assert_eq!(config.shard_count, 32);
        assert!(config.json_logs);

        assert!(matches!(
            StatsConfig::from_file("/nonexistent/stats.toml"),
            Err(ConfigError::Io(_))
        ));
    }
}
