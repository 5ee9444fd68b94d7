//! # Credplane
//!
//! Credplane is a dynamic database-credential plugin runtime. A secrets-management
//! host drives it through a small lifecycle to create, rotate and revoke
//! short-lived accounts on an external database without knowing the database's
//! dialect.
//!
//! ## Architecture
//!
//! ```text
//! host → initialize(config) → normalize → backend handle
//! host → new_user / update_user / delete_user → render statements → backend.execute
//! ```
//!
//! ## Core Components
//!
//! - **Connection config** ([`config::connection`]): loosely-typed mapping → [`ConnectionConfig`]
//! - **Statement templates** ([`statements`]): `{{username}}` / `{{password}}` substitution
//! - **Credential policy** ([`credentials`]): username derivation, password acceptance
//! - **Lifecycle** ([`plugin`]): the [`Database`] contract, implemented once by [`DatabasePlugin`]
//! - **Backends** ([`backends`]): the [`Backend`] capability trait and the InfluxDB driver
//! - **Harness** ([`harness`]): ephemeral services for conformance tests
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use credplane::backends::InfluxdbConnector;
//! use credplane::plugin::{Database, DatabasePlugin, InitializeRequest, OperationContext};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> credplane::Result<()> {
//!     let plugin = DatabasePlugin::new(InfluxdbConnector);
//!     let config = json!({
//!         "host": "localhost", "port": "8086", "username": "admin", "password": "admin"
//!     });
//!     let ctx = OperationContext::new();
//!
//!     let request = InitializeRequest::new(config.as_object().cloned().unwrap_or_default());
//!     let response = plugin.initialize(&ctx, request.verified()).await?;
//!     assert_eq!(response.config["port"], json!(8086));
//!
//!     plugin.close(&ctx).await
//! }
//! ```

pub mod backends;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod harness;
pub mod observability;
pub mod plugin;
pub mod secrets;
pub mod statements;

// Re-export commonly used types and traits
pub use backends::{Backend, BackendConnector, BackendType};
pub use config::{ConnectionConfig, DeletePolicy, PluginSettings};
pub use errors::{ErrorCategory, PluginError, Result};
pub use plugin::{Database, DatabasePlugin, OperationContext};
pub use secrets::SecretString;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
