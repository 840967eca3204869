use anyhow::Context;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter applied when neither `RUST_LOG` nor a configured filter is set.
pub const DEFAULT_LOG_FILTER: &str = "info,changeset_syncer=info";

/// Builds the filter from `RUST_LOG`, falling back to `fallback` and then to
/// [`DEFAULT_LOG_FILTER`].
pub fn env_filter(fallback: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(fallback.unwrap_or(DEFAULT_LOG_FILTER))
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    })
}

/// Installs the global `tracing` subscriber. Fails if one is already set.
pub fn init_tracing(fallback: Option<&str>) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(env_filter(fallback))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("failed to install tracing subscriber")
}
