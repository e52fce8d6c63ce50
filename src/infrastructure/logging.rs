//! Tracing subscriber setup for hosts that do not install their own

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::{LogFormat, LoggingConfig};
use crate::domain::DomainError;

/// Install a global subscriber; `RUST_LOG` takes precedence over `config.level`
///
/// Fails if the host already installed a subscriber.
pub fn init_logging(config: &LoggingConfig) -> Result<(), DomainError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| {
            DomainError::configuration(format!("Invalid log level '{}': {}", config.level, e))
        })?;

    let result = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_span_events(FmtSpan::CLOSE))
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty().with_target(true))
            .try_init(),
    };

    result.map_err(|e| DomainError::configuration(format!("Logging already initialized: {}", e)))?;

    tracing::info!(level = %config.level, "Logging initialized");

    Ok(())
}
