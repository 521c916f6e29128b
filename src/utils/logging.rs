//! Structured logging setup.
//!
//! Installs a `tracing-subscriber` registry driven by [`LoggingConfig`]. The
//! `RUST_LOG` environment variable, when set, takes precedence over the
//! configured level. With `log_to_console` off no output layer is attached.

use crate::config::LoggingConfig;
use crate::error::{ProtocolError, Result};
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber.
///
/// Only the first successful call takes effect; later calls return a
/// [`ProtocolError::ConfigError`] and leave the installed subscriber alone.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(config.log_level).into())
        .from_env_lossy();

    let console = config.log_to_console;
    let json = (console && config.json_format)
        .then(|| fmt::layer().json().with_writer(std::io::stderr));
    let plain = (console && !config.json_format).then(|| {
        fmt::layer()
            .with_target(false)
            .with_level(true)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(plain)
        .try_init()
        .map_err(|e| {
            ProtocolError::ConfigError(format!("Failed to install log subscriber: {e}"))
        })?;

    info!(app = %config.app_name, level = %config.log_level, "Logging initialised");
    Ok(())
}
