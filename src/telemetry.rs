use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::config::TelemetryConfig;

#[derive(Debug, Error)]
#[error("logging setup failed: {0}")]
pub struct TelemetryError(String);

/// `RUST_LOG` wins over the configured level
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|err| TelemetryError(format!("log level '{}': {err}", config.log_level)))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .try_init()
        .map_err(|err| TelemetryError(err.to_string()))
}
