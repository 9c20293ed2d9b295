//! Tracing initialization.

use harvest_core::{ClientConfig, HarvestError, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Installs a global fmt subscriber when `enabled` is true.
///
/// The level is read from `RUST_LOG` and defaults to `info`. With `enabled`
/// false nothing is installed and the library stays silent.
///
/// ```bash
/// RUST_LOG=harvest=debug,harvest_api=debug cargo run
/// ```
///
/// # Errors
/// Returns [`HarvestError::Config`] if the filter is malformed or a global
/// subscriber is already installed.
pub fn init_tracing(enabled: bool) -> Result<()> {
    if !enabled {
        return Ok(());
    }

    tracing_subscriber::registry()
        .with(create_fmt_layer())
        .with(create_env_filter()?)
        .try_init()
        .map_err(|e| HarvestError::Config(format!("Failed to initialize tracing: {e}")))
}

/// Installs the subscriber if the configuration has logging switched on.
///
/// # Errors
/// Same as [`init_tracing`].
pub fn init_tracing_from_config(config: &ClientConfig) -> Result<()> {
    init_tracing(config.logging)
}

fn create_env_filter() -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| HarvestError::Config(format!("Failed to create env filter: {e}")))
}

fn create_fmt_layer() -> fmt::Layer<tracing_subscriber::Registry> {
    fmt::layer().with_target(true).with_level(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_installs_nothing() {
        assert!(init_tracing(false).is_ok());
        let quiet = ClientConfig {
            logging: false,
            ..ClientConfig::default()
        };
        assert!(init_tracing_from_config(&quiet).is_ok());
    }

    #[test]
    fn test_second_install_is_an_error() {
        let _ = init_tracing(true);
        assert!(matches!(init_tracing(true), Err(HarvestError::Config(_))));
    }
}
