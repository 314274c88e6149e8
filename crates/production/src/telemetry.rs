//! Log subscriber setup.
//!
//! The state machine only emits `tracing` events; this module decides where
//! they go. `RUST_LOG` wins over the configured filter.

use crate::config::TelemetrySettings;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("failed to set global subscriber: {0}")]
    SetSubscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_telemetry(settings: &TelemetrySettings) -> Result<(), TelemetryError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.filter)?,
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(settings.thread_ids);

    Registry::default()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;
    Ok(())
}
