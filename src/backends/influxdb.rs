//! InfluxDB 1.x backend over the HTTP API
//!
//! Statements are sent to `POST /query` as the `q` form field with HTTP basic
//! auth. Connectivity is checked with `GET /ping` followed by `SHOW USERS`, which
//! also confirms the configured account carries the admin flag.
//!
//! Extra connection keys understood here:
//!
//! | Key | Values | Default |
//! |-----|--------|---------|
//! | `tls` | bool or `"true"`/`"false"` | `false` |
//! | `insecure_tls` | bool or `"true"`/`"false"` | `false` |
//! | `connect_timeout` | integer seconds, or `"500ms"`, `"5s"`, `"2m"`, `"1h"` | `5s` |

use super::{Backend, BackendConnector, BackendType};
use crate::config::ConnectionConfig;
use crate::credentials::UsernamePolicy;
use crate::errors::{PluginError, Result};
use crate::secrets::SecretString;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Longest identifier InfluxDB accepts for generated users
pub const MAX_USERNAME_LENGTH: usize = 100;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const USER_NOT_FOUND: &str = "user not found";

static TARGET_USER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\bUSER\s+(?:"([^"]+)"|([A-Za-z0-9_\-]+))"#)
        .expect("static user regex compiles")
});

/// Driver options read from the connection extras
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfluxdbOptions {
    pub tls: bool,
    pub insecure_tls: bool,
    pub connect_timeout: Duration,
}

impl Default for InfluxdbOptions {
    fn default() -> Self {
        Self { tls: false, insecure_tls: false, connect_timeout: DEFAULT_CONNECT_TIMEOUT }
    }
}

impl InfluxdbOptions {
    pub fn from_config(config: &ConnectionConfig) -> Result<Self> {
        let mut options = Self::default();
        if let Some(value) = config.extra("tls") {
            options.tls = parse_bool("tls", value)?;
        }
        if let Some(value) = config.extra("insecure_tls") {
            options.insecure_tls = parse_bool("insecure_tls", value)?;
        }
        if let Some(value) = config.extra("connect_timeout") {
            options.connect_timeout = parse_timeout(value)?;
        }
        Ok(options)
    }
}

/// Handle to one InfluxDB server
#[derive(Debug, Clone)]
pub struct InfluxdbBackend {
    client: Client,
    base_url: Url,
    username: String,
    password: SecretString,
}

impl InfluxdbBackend {
    /// Build a handle without touching the network.
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        let options = InfluxdbOptions::from_config(config)?;
        let scheme = if options.tls { "https" } else { "http" };
        let base_url = Url::parse(&format!("{}://{}", scheme, config.address()))
            .map_err(|e| PluginError::config_field(format!("invalid host: {}", e), "host"))?;

        let client = Client::builder()
            .connect_timeout(options.connect_timeout)
            .danger_accept_invalid_certs(options.insecure_tls)
            .build()
            .map_err(|e| {
                PluginError::connection_with_source("Failed to build HTTP client", Box::new(e))
            })?;

        Ok(Self {
            client,
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| PluginError::config(format!("invalid endpoint '{}': {}", path, e)))
    }

    /// Run `q` and return the decoded response body.
    async fn query(&self, q: &str) -> Result<QueryResponse> {
        let response = self
            .client
            .post(self.endpoint("query")?)
            .basic_auth(&self.username, Some(self.password.expose_secret()))
            .form(&[("q", q)])
            .send()
            .await
            .map_err(|e| {
                PluginError::connection_with_source("InfluxDB request failed", Box::new(e))
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(PluginError::connection(format!(
                "InfluxDB rejected credentials for '{}' ({})",
                self.username, status
            )));
        }

        let body = response.text().await.map_err(|e| {
            PluginError::connection_with_source("Failed to read InfluxDB response", Box::new(e))
        })?;

        if status.is_server_error() {
            return Err(PluginError::connection(format!(
                "InfluxDB returned {}: {}",
                status,
                body.trim()
            )));
        }

        match serde_json::from_str::<QueryResponse>(&body) {
            Ok(parsed) => Ok(parsed),
            Err(_) if status.is_success() => Ok(QueryResponse::default()),
            Err(_) => Err(PluginError::statement(0, format!("HTTP {}: {}", status, body.trim()))),
        }
    }
}

#[async_trait]
impl Backend for InfluxdbBackend {
    #[instrument(skip(self, statement), fields(backend = "influxdb"))]
    async fn execute(&self, statement: &str) -> Result<()> {
        debug!(url = %self.base_url, "executing statement");
        let response = self.query(statement).await?;

        match response.first_error() {
            None => Ok(()),
            Some(message) if message.contains(USER_NOT_FOUND) => {
                Err(PluginError::not_found(target_user(statement).unwrap_or_default()))
            }
            Some(message) => Err(PluginError::statement(0, message)),
        }
    }

    async fn ping(&self) -> Result<()> {
        let response = self.client.get(self.endpoint("ping")?).send().await.map_err(|e| {
            PluginError::connection_with_source("InfluxDB ping failed", Box::new(e))
        })?;
        if !response.status().is_success() {
            return Err(PluginError::connection(format!(
                "InfluxDB ping returned {}",
                response.status()
            )));
        }

        let users = self.query("SHOW USERS").await?;
        if let Some(message) = users.first_error() {
            return Err(PluginError::connection(format!("SHOW USERS failed: {}", message)));
        }
        if !users.is_admin(&self.username) {
            return Err(PluginError::connection(format!(
                "user '{}' is not an InfluxDB admin",
                self.username
            )));
        }

        debug!(url = %self.base_url, "InfluxDB connection verified");
        Ok(())
    }

    fn default_rotation_statements(&self) -> Vec<String> {
        vec![r#"SET PASSWORD FOR "{{username}}" = '{{password}}'"#.to_string()]
    }

    fn default_revocation_statements(&self) -> Vec<String> {
        vec![r#"DROP USER "{{username}}""#.to_string()]
    }

    fn username_policy(&self) -> UsernamePolicy {
        UsernamePolicy::new(MAX_USERNAME_LENGTH)
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Influxdb
    }
}

/// Connector producing [`InfluxdbBackend`] handles
#[derive(Debug, Clone, Copy, Default)]
pub struct InfluxdbConnector;

impl BackendConnector for InfluxdbConnector {
    fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Backend>> {
        Ok(Arc::new(InfluxdbBackend::new(config)?))
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Influxdb
    }
}

#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    error: Option<String>,
    #[serde(default)]
    series: Vec<Series>,
}

#[derive(Debug, Deserialize)]
struct Series {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl QueryResponse {
    fn first_error(&self) -> Option<&str> {
        self.error
            .as_deref()
            .or_else(|| self.results.iter().find_map(|r| r.error.as_deref()))
    }

    /// Whether `SHOW USERS` lists `username` with `admin = true`.
    fn is_admin(&self, username: &str) -> bool {
        self.results.iter().flat_map(|r| &r.series).any(|series| {
            let user_col = series.columns.iter().position(|c| c == "user");
            let admin_col = series.columns.iter().position(|c| c == "admin");
            let (Some(user_col), Some(admin_col)) = (user_col, admin_col) else {
                return false;
            };
            series.values.iter().any(|row| {
                row.get(user_col).and_then(Value::as_str) == Some(username)
                    && row.get(admin_col).and_then(Value::as_bool) == Some(true)
            })
        })
    }
}

fn target_user(statement: &str) -> Option<String> {
    TARGET_USER
        .captures(statement)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().to_string())
}

fn parse_bool(key: &str, value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => s.trim().to_ascii_lowercase().parse::<bool>().map_err(|_| {
            PluginError::config_field(format!("'{}' must be true or false", key), key)
        }),
        other => Err(PluginError::config_field(
            format!("'{}' must be a boolean, got {}", key, other),
            key,
        )),
    }
}

/// Integer seconds, or a number with an `ms`, `s`, `m` or `h` unit.
fn parse_timeout(value: &Value) -> Result<Duration> {
    let invalid = || {
        PluginError::config_field(
            format!("connect_timeout must be seconds or a duration like \"5s\", got {}", value),
            "connect_timeout",
        )
    };

    match value {
        Value::Number(n) => n.as_u64().map(Duration::from_secs).ok_or_else(invalid),
        Value::String(s) => {
            let s = s.trim();
            let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
            let (digits, unit) = s.split_at(split);
            let amount: u64 = digits.parse().map_err(|_| invalid())?;
            let seconds = match unit {
                "" | "s" => Some(amount),
                "ms" => return Ok(Duration::from_millis(amount)),
                "m" => amount.checked_mul(60),
                "h" => amount.checked_mul(3600),
                _ => None,
            };
            seconds.map(Duration::from_secs).ok_or_else(invalid)
        }
        _ => Err(invalid()),
    }
}
