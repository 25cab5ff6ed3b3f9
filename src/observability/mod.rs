//! Logging setup for binaries and embedders that don't install their own subscriber.

use crate::config::StatsConfig;
use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber.
///
/// `RUST_LOG` wins over `config.log_filter` when set. Fails if a global
/// subscriber is already installed or the filter does not parse.
pub fn init_logging(config: &StatsConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) => EnvFilter::try_new(directives)?,
        Err(_) => EnvFilter::try_new(&config.log_filter)?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if config.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_filter_is_rejected() {
        let config = StatsConfig {
            log_filter: "census_stats=verbose".to_string(),
            ..Default::default()
        };
        if std::env::var("RUST_LOG").is_err() {
            assert!(init_logging(&config).is_err());
        }
    }
}
