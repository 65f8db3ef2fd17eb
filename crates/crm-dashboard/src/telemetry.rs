//! Tracing subscriber setup

use crate::config::LoggingConfig;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Subscriber installation errors
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// `logging.level` is not a valid filter directive
    #[error("invalid log filter '{directive}': {reason}")]
    Filter {
        /// Directive as configured
        directive: String,
        /// Parser message
        reason: String,
    },

    /// A global subscriber is already set
    #[error("tracing subscriber already installed: {0}")]
    AlreadyInstalled(String),
}

/// Build the filter: `RUST_LOG` when set, the configured level otherwise
///
/// # Errors
/// [`TelemetryError::Filter`] when the configured level does not parse
pub fn filter(config: &LoggingConfig) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level).map_err(|e| TelemetryError::Filter {
        directive: config.level.clone(),
        reason: e.to_string(),
    })
}

/// Install the global subscriber; logs go to stderr
///
/// # Errors
/// Bad filter, or a subscriber was installed earlier
pub fn init(config: &LoggingConfig) -> Result<(), TelemetryError> {
    let filter = filter(config)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = if config.json {
        builder.json().finish().try_init()
    } else {
        builder.finish().try_init()
    };
    installed.map_err(|e| TelemetryError::AlreadyInstalled(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_level_parses() {
        let config = LoggingConfig {
            level: "crm_sync=debug,info".to_string(),
            json: false,
        };
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(filter(&config).is_ok());
        }
    }

    #[test]
    fn garbage_level_is_reported() {
        let config = LoggingConfig {
            level: "crm_sync=loud".to_string(),
            json: false,
        };
        if std::env::var_os("RUST_LOG").is_none() {
            let err = filter(&config).unwrap_err();
            assert!(err.to_string().contains("crm_sync=loud"));
        }
    }
}
