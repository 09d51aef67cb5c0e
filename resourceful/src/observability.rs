//! Tracing initialization

use tracing_subscriber::EnvFilter;

use crate::{config::Config, error::Result};

/// Initialize JSON tracing output filtered by the configured log level
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_tracing(config: &Config) -> Result<()> {
    let log_level = config.log_level.clone();

    let installed = tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(
            localized_messages = config.localized_messages,
            "Tracing initialized for resourceful"
        );
    }

    Ok(())
}
