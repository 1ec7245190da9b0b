//! Tracing subscriber setup

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{DeployerError, DeployerResult};

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level; without it the deployer logs at
/// `config.level` and its dependencies at `warn`.
pub fn init_logging(config: &LoggingConfig) -> DeployerResult<()> {
    let level: tracing::Level = config
        .level
        .parse()
        .map_err(|_| DeployerError::config(format!("invalid log level '{}'", config.level)))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(false))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()
    };

    result.map_err(|e| DeployerError::config(format!("failed to initialize logging: {}", e)))
}

fn default_filter(level: tracing::Level) -> EnvFilter {
    EnvFilter::new(format!(
        "warn,v3_deployer={level},v3_deployer_math={level}",
        level = level.as_str().to_lowercase()
    ))
}
