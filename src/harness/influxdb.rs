//! InfluxDB test fixture
//!
//! Mirrors the conformance setup: an `influxdb:alpine` container with a `vault`
//! database, an `influx-root` admin and HTTP auth enabled. Set `INFLUXDB_HOST` to
//! `host:port` of a running server to skip the container.

use super::{HarnessError, Provisioner, RunOptions, Service, ServiceRunner};
use crate::config::connection::{HOST_KEY, PASSWORD_KEY, PORT_KEY, USERNAME_KEY};
use crate::secrets::SecretString;
use reqwest::Client;
use serde_json::{Map, Value};
use std::time::Duration;

pub const IMAGE_REPO: &str = "influxdb";
pub const IMAGE_TAG: &str = "alpine";
pub const HTTP_PORT: u16 = 8086;
pub const DATABASE: &str = "vault";
pub const ADMIN_USER: &str = "influx-root";
pub const ADMIN_PASSWORD: &str = "influx-root";
/// Environment variable naming an already-running server
pub const HOST_ENV: &str = "INFLUXDB_HOST";

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Address and admin credentials of a ready InfluxDB server
#[derive(Debug, Clone, PartialEq)]
pub struct InfluxdbServiceConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

impl InfluxdbServiceConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: ADMIN_USER.to_string(),
            password: SecretString::new(ADMIN_PASSWORD),
        }
    }

    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.address())
    }

    /// Connection mapping as a host would send it to `initialize`, port as an integer
    pub fn connection_params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        params.insert(HOST_KEY.to_string(), Value::from(self.host.clone()));
        params.insert(PORT_KEY.to_string(), Value::from(self.port));
        params.insert(USERNAME_KEY.to_string(), Value::from(self.username.clone()));
        params.insert(PASSWORD_KEY.to_string(), Value::from(self.password.expose_secret()));
        params
    }
}

/// Run options for the InfluxDB container, honouring [`HOST_ENV`].
pub fn run_options() -> Result<RunOptions, HarnessError> {
    RunOptions::new(IMAGE_REPO, IMAGE_TAG)
        .with_env("INFLUXDB_DB", DATABASE)
        .with_env("INFLUXDB_ADMIN_USER", ADMIN_USER)
        .with_env("INFLUXDB_ADMIN_PASSWORD", ADMIN_PASSWORD)
        .with_env("INFLUXDB_HTTP_AUTH_ENABLED", "true")
        .with_port(HTTP_PORT)
        .with_env_override(HOST_ENV)
}

/// Start (or adopt) an InfluxDB server and wait until it answers `/ping`.
pub async fn prepare_influxdb<P: Provisioner>(
    provisioner: P,
) -> Result<Service<InfluxdbServiceConfig>, HarnessError> {
    prepare_with(run_options()?, provisioner).await
}

pub async fn prepare_with<P: Provisioner>(
    options: RunOptions,
    provisioner: P,
) -> Result<Service<InfluxdbServiceConfig>, HarnessError> {
    ServiceRunner::new(options, provisioner)
        .start(|host, port| async move {
            let config = InfluxdbServiceConfig::new(host, port);
            ping(&config.url()).await?;
            Ok::<_, HarnessError>(config)
        })
        .await
}

/// Start a Docker container for InfluxDB.
#[cfg(feature = "harness")]
pub async fn start_influxdb() -> Result<Service<InfluxdbServiceConfig>, HarnessError> {
    prepare_influxdb(super::DockerProvisioner).await
}

fn probe_client() -> Result<Client, HarnessError> {
    Client::builder()
        .timeout(PROBE_TIMEOUT)
        .build()
        .map_err(|e| HarnessError::Probe(e.to_string()))
}

/// `GET /ping` must answer with a success status.
pub async fn ping(url: &str) -> Result<(), HarnessError> {
    let response = probe_client()?
        .get(format!("{}/ping", url.trim_end_matches('/')))
        .send()
        .await
        .map_err(|e| HarnessError::Probe(format!("error checking cluster status: {}", e)))?;

    if !response.status().is_success() {
        return Err(HarnessError::Probe(format!("ping returned {}", response.status())));
    }
    Ok(())
}

/// Check that `username`/`password` can log in and read the test database.
pub async fn verify_credentials(
    url: &str,
    username: &str,
    password: &str,
) -> Result<(), HarnessError> {
    ping(url).await?;

    let q = format!("SHOW SERIES ON {}", DATABASE);
    let response = probe_client()?
        .post(format!("{}/query", url.trim_end_matches('/')))
        .basic_auth(username, Some(password))
        .form(&[("q", q.as_str())])
        .send()
        .await
        .map_err(|e| HarnessError::Probe(format!("query failed: {}", e)))?;

    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    if !status.is_success() {
        return Err(HarnessError::Probe(format!("{} rejected: {} {}", username, status, body)));
    }

    let error = body.get("error").or_else(|| {
        body.get("results")
            .and_then(Value::as_array)
            .and_then(|results| results.iter().find_map(|r| r.get("error")))
    });
    match error {
        Some(error) => Err(HarnessError::Probe(format!("{} rejected: {}", username, error))),
        None => Ok(()),
    }
}
