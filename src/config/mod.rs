//! # Configuration
//!
//! Two kinds of configuration flow through the plugin:
//!
//! - [`connection`]: the per-`initialize` connection mapping sent by the host,
//!   normalized into a typed [`ConnectionConfig`].
//! - [`settings`]: process-level [`PluginSettings`] read once from the environment.

pub mod connection;
pub mod settings;

pub use connection::{normalize, ConnectionConfig};
pub use settings::{DeletePolicy, LoggingConfig, PluginSettings, UsernameSettings, ENV_PREFIX};
