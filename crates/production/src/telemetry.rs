//! Logging initialization.
//!
//! Installs a `tracing` registry with an env filter and a fmt layer. The
//! state machines only emit events; everything about where they go is decided
//! here.

use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,attestor=debug";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("failed to set global subscriber: {0}")]
    SetSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Configuration for logging.
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    /// Filter directives; `RUST_LOG` wins, then this, then [`DEFAULT_FILTER`].
    pub filter: Option<String>,
    /// Include thread ids in each line.
    pub thread_ids: bool,
}

/// Resolve the effective filter for `config`.
pub fn env_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directives = config.filter.as_deref().unwrap_or(DEFAULT_FILTER);
    Ok(EnvFilter::try_new(directives)?)
}

/// Install the global subscriber. Call once, at startup.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = env_filter(config)?;
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(config.thread_ids);

    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
