//! # Error Handling
//!
//! Typed errors for every plugin entrypoint. Nothing is retried internally; the
//! category on each error tells the host what to do next.

pub mod types;

pub use types::{ErrorCategory, PluginError, Result};
