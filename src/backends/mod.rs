//! Pluggable database backend architecture
//!
//! The lifecycle state machine is written once against the [`Backend`] capability
//! set. A backend is any database driver that can execute a textual statement and
//! answer a connectivity probe; rotation and expiration are optional native
//! capabilities a driver may expose on top.
//!
//! ## Supported Backends
//!
//! - **InfluxDB**: InfluxDB 1.x over its HTTP API (`/ping`, `/query`)

pub mod influxdb;

pub use influxdb::{InfluxdbBackend, InfluxdbConnector, InfluxdbOptions};

use crate::config::ConnectionConfig;
use crate::credentials::UsernamePolicy;
use crate::errors::Result;
use crate::secrets::SecretString;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Type of database backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendType {
    /// InfluxDB 1.x
    Influxdb,
}

impl BackendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Influxdb => "influxdb",
        }
    }
}

impl FromStr for BackendType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "influxdb" => Ok(Self::Influxdb),
            _ => Err(format!("Unknown database backend type: {}", s)),
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A live handle to one database service.
///
/// Credential operations may call into one handle concurrently, so implementations
/// must be safe for shared use (pooled clients, or internal serialization).
#[async_trait]
pub trait Backend: Send + Sync + fmt::Debug {
    /// Execute one rendered statement.
    ///
    /// # Errors
    ///
    /// - [`PluginError::Connection`](crate::errors::PluginError::Connection) on transport failure
    /// - [`PluginError::NotFound`](crate::errors::PluginError::NotFound) for a missing target user
    /// - [`PluginError::Statement`](crate::errors::PluginError::Statement) for any other rejection
    async fn execute(&self, statement: &str) -> Result<()>;

    /// Verify the service is reachable and the admin credentials are usable.
    async fn ping(&self) -> Result<()>;

    /// Native password rotation. `None` means the backend has no such call and the
    /// templated rotation statements must be used instead.
    async fn rotate_password(
        &self,
        _username: &str,
        _password: &SecretString,
    ) -> Option<Result<()>> {
        None
    }

    /// Native account expiration. `None` means the backend has no TTL concept.
    async fn set_expiration(&self, _username: &str, _at: DateTime<Utc>) -> Option<Result<()>> {
        None
    }

    /// Rotation templates used when the caller supplies none.
    fn default_rotation_statements(&self) -> Vec<String>;

    /// Revocation templates used when the caller supplies none.
    fn default_revocation_statements(&self) -> Vec<String>;

    /// Username policy carrying the backend's identifier limit.
    fn username_policy(&self) -> UsernamePolicy;

    /// Backend type identifier
    fn backend_type(&self) -> BackendType;
}

/// Builds backend handles from a normalized connection config.
///
/// Chosen once when the plugin is constructed; [`connect`](BackendConnector::connect)
/// runs on every `initialize` and must not perform network I/O. Verification is the
/// job of [`Backend::ping`].
pub trait BackendConnector: Send + Sync + 'static {
    fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Backend>>;

    fn backend_type(&self) -> BackendType;
}
