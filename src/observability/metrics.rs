//! # Metrics Collection
//!
//! Counters for plugin operations. Recording goes through the `metrics` facade;
//! the embedding host decides which recorder (if any) is installed.

use crate::errors::PluginError;
use metrics::{counter, describe_counter};
use std::sync::Once;

/// Total plugin operations by `operation` and `outcome`
pub const OPERATIONS_TOTAL: &str = "credplane_operations_total";

static DESCRIBE: Once = Once::new();

/// Register metric descriptions with the installed recorder.
pub fn describe_metrics() {
    DESCRIBE.call_once(|| {
        describe_counter!(OPERATIONS_TOTAL, "Plugin operations by operation and outcome");
    });
}

/// Outcome label for a finished operation: `success` or the error kind.
pub fn outcome_label<T>(result: &Result<T, PluginError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(e) => e.kind(),
    }
}

/// Record one finished operation.
pub fn record_operation<T>(operation: &'static str, result: &Result<T, PluginError>) {
    let labels =
        [("operation", operation.to_string()), ("outcome", outcome_label(result).to_string())];
    counter!(OPERATIONS_TOTAL, &labels).increment(1);
}
