//! # Observability
//!
//! Structured logging through `tracing` and operation counters through `metrics`.

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::{describe_metrics, record_operation, OPERATIONS_TOTAL};
