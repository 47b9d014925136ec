//! Subscriber set-up for the command-line tool.
use tracing_subscriber::EnvFilter;

use crate::error::LoggingError;

/// Environment variable holding an `EnvFilter` directive.
pub const LOG_ENV: &str = "SPECIMEN_LOG";

/// Install a stderr fmt subscriber. `SPECIMEN_LOG` wins over
/// `default_directive` when set.
pub fn init(default_directive: &str) -> Result<(), LoggingError> {
    let directive = std::env::var(LOG_ENV).unwrap_or_else(|_| default_directive.to_string());
    let filter = EnvFilter::try_new(&directive).map_err(|err| LoggingError::Filter {
        filter: directive.clone(),
        message: err.to_string(),
    })?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|err| LoggingError::Install(err.to_string()))
}
