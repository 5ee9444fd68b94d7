//! # Structured Logging
//!
//! Subscriber setup and span macros for plugin operations.

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Create a tracing span for one plugin operation.
///
/// Every span carries a fresh `operation_id` so log lines from concurrent calls
/// against the same instance can be told apart.
///
/// ```rust,ignore
/// let span = plugin_span!("new_user", backend = "influxdb");
/// ```
#[macro_export]
macro_rules! plugin_span {
    ($operation:expr) => {
        tracing::info_span!(
            "plugin_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4(),
            backend = tracing::field::Empty,
            username = tracing::field::Empty
        )
    };
    ($operation:expr, backend = $backend:expr) => {
        tracing::info_span!(
            "plugin_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4(),
            backend = %$backend,
            username = tracing::field::Empty
        )
    };
    ($operation:expr, $($field:tt)*) => {
        tracing::info_span!(
            "plugin_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Install the global fmt subscriber, writing to stderr.
///
/// `RUST_LOG` wins over `config.log_level` when set. An already-installed
/// subscriber (integration tests, embedding hosts) is left in place.
pub fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    // Subscriber already set elsewhere; ignore.
    let _ = if config.json_logging { builder.json().try_init() } else { builder.try_init() };
}
