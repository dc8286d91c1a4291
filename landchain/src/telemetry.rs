// Copyright (c) 2024 Botho Foundation

//! Console logging setup for applications embedding the ledger.
//!
//! The library only emits `tracing` events. An embedding application that
//! has no subscriber of its own can install one from its config file:
//!
//! ```toml
//! [logging]
//! level = "info,landchain=debug"
//! with_target = false
//! ```

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

/// Build the event filter for `config.level`
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    EnvFilter::try_new(&config.level)
        .with_context(|| format!("Invalid log filter {:?}", config.level))
}

/// Install a global fmt subscriber.
///
/// Fails if the filter does not parse or a global subscriber is already set.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(config.with_target)
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {e}"))?;

    tracing::debug!(level = %config.level, "Tracing initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter() {
        let config = LoggingConfig {
            level: "info,landchain=debug".to_string(),
            with_target: true,
        };
        assert!(build_filter(&config).is_ok());

        let config = LoggingConfig {
            level: "landchain=notalevel".to_string(),
            with_target: false,
        };
        assert!(build_filter(&config).is_err());
    }

    #[test]
    fn test_init_tracing_twice_fails() {
        let config = LoggingConfig::default();
        // Another test may already have installed a subscriber
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
