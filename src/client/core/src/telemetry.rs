//! Structured logging initialization.
//!
//! JSON format for production, pretty format for development. Event-level
//! counters are emitted through the `metrics` facade at their call sites;
//! exporter wiring is the embedding application's concern.

use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use crate::config::ObservabilityConfig;

/// Initialize the global tracing subscriber from configuration.
///
/// Safe to call once per process; subsequent calls return an error from
/// the underlying subscriber registry.
pub fn init_telemetry(config: &ObservabilityConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(&config.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if config.json_logging {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty())
            .try_init()?;
    }

    tracing::debug!(level = %config.log_level, json = config.json_logging, "telemetry initialized");
    Ok(())
}
