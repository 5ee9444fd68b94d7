//! # Ephemeral Service Harness
//!
//! Starts a disposable instance of a backend service for conformance tests, waits
//! until it answers, and hands back a live connection descriptor together with a
//! [`Cleanup`] handle. An external instance can be supplied instead through
//! [`RunOptions::with_env_override`], in which case nothing is provisioned.
//!
//! ```rust,ignore
//! let options = RunOptions::new("influxdb", "alpine")
//!     .with_port(8086)
//!     .with_env_override("INFLUXDB_HOST")?;
//! let service = ServiceRunner::new(options, DockerProvisioner)
//!     .start(|host, port| async move { probe(host, port).await })
//!     .await?;
//! // ... run tests against service.config ...
//! service.cleanup.run().await?;
//! ```

#[cfg(feature = "harness")]
pub mod docker;
pub mod influxdb;

#[cfg(feature = "harness")]
pub use docker::DockerProvisioner;
pub use influxdb::{prepare_influxdb, verify_credentials, InfluxdbServiceConfig};

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Errors raised while provisioning or probing a test service
#[derive(thiserror::Error, Debug)]
pub enum HarnessError {
    #[error("Failed to provision {image}: {message}")]
    Provision { image: String, message: String },

    #[error("Service probe failed: {0}")]
    Probe(String),

    #[error("Service not ready after {elapsed:?}: {last_error}")]
    Timeout { elapsed: Duration, last_error: String },

    #[error("Invalid external service address '{value}': {message}")]
    InvalidOverride { value: String, message: String },

    #[error("Teardown failed: {0}")]
    Teardown(String),
}

/// Exponential backoff between readiness probes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub multiplier: u32,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self { initial: Duration::from_millis(100), multiplier: 2, max: Duration::from_secs(5) }
    }
}

impl Backoff {
    pub fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(self.multiplier).min(self.max)
    }
}

/// An already-running service to use instead of provisioning one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalService {
    pub host: String,
    pub port: u16,
}

/// How to start the service under test
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub image_repo: String,
    pub image_tag: String,
    pub env: Vec<(String, String)>,
    /// Container ports to expose; the first one is handed to the probe
    pub ports: Vec<u16>,
    pub external: Option<ExternalService>,
    pub startup_timeout: Duration,
    pub backoff: Backoff,
}

impl RunOptions {
    pub fn new(image_repo: impl Into<String>, image_tag: impl Into<String>) -> Self {
        Self {
            image_repo: image_repo.into(),
            image_tag: image_tag.into(),
            env: Vec::new(),
            ports: Vec::new(),
            external: None,
            startup_timeout: Duration::from_secs(60),
            backoff: Backoff::default(),
        }
    }

    pub fn image(&self) -> String {
        format!("{}:{}", self.image_repo, self.image_tag)
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.ports.push(port);
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Point at an existing `host[:port]`. Without a port the first exposed port is used.
    pub fn with_external(mut self, address: &str) -> Result<Self, HarnessError> {
        self.external = Some(parse_external(address, self.ports.first().copied())?);
        Ok(self)
    }

    /// Read an external address from `var` now, if it is set and non-empty.
    pub fn with_env_override(self, var: &str) -> Result<Self, HarnessError> {
        match std::env::var(var) {
            Ok(value) if !value.trim().is_empty() => self.with_external(value.trim()),
            _ => Ok(self),
        }
    }
}

fn parse_external(
    address: &str,
    default_port: Option<u16>,
) -> Result<ExternalService, HarnessError> {
    let invalid = |message: &str| HarnessError::InvalidOverride {
        value: address.to_string(),
        message: message.to_string(),
    };

    let (host, port) = if let Some(rest) = address.strip_prefix('[') {
        let (host, tail) =
            rest.split_once(']').ok_or_else(|| invalid("unterminated IPv6 literal"))?;
        (host, tail.strip_prefix(':'))
    } else if address.matches(':').count() == 1 {
        let (host, port) = address.split_once(':').ok_or_else(|| invalid("malformed address"))?;
        (host, Some(port))
    } else {
        (address, None)
    };

    if host.is_empty() {
        return Err(invalid("missing host"));
    }
    let port = match port {
        Some(port) => {
            port.parse::<u16>().ok().filter(|p| *p != 0).ok_or_else(|| invalid("bad port"))?
        }
        None => default_port.ok_or_else(|| invalid("no port given and none exposed"))?,
    };

    Ok(ExternalService { host: host.to_string(), port })
}

/// Starts service instances
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn provision(&self, options: &RunOptions) -> Result<Box<dyn Provisioned>, HarnessError>;
}

/// A running instance started by a [`Provisioner`]
#[async_trait]
pub trait Provisioned: Send + Sync {
    /// Host the instance is reachable on from the test process
    fn host(&self) -> &str;

    /// Host-side port mapped to `container_port`
    fn host_port(&self, container_port: u16) -> Option<u16>;

    /// Stop and remove the instance
    async fn stop(self: Box<Self>) -> Result<(), HarnessError>;
}

/// Tears down a provisioned instance. Running it more than once is harmless.
#[derive(Clone, Default)]
pub struct Cleanup {
    instance: Arc<Mutex<Option<Box<dyn Provisioned>>>>,
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cleanup").finish_non_exhaustive()
    }
}

impl Cleanup {
    /// Cleanup for a service the harness does not own
    pub fn noop() -> Self {
        Self::default()
    }

    fn for_instance(instance: Box<dyn Provisioned>) -> Self {
        Self { instance: Arc::new(Mutex::new(Some(instance))) }
    }

    pub async fn run(&self) -> Result<(), HarnessError> {
        let instance = self.instance.lock().await.take();
        match instance {
            Some(instance) => {
                debug!("stopping provisioned service");
                instance.stop().await
            }
            None => Ok(()),
        }
    }

    /// Whether there is nothing (left) to tear down
    pub async fn is_done(&self) -> bool {
        self.instance.lock().await.is_none()
    }
}

/// A ready service and the handle that tears it down
#[derive(Debug)]
pub struct Service<C> {
    pub config: C,
    pub cleanup: Cleanup,
}

pub struct ServiceRunner<P: Provisioner> {
    options: RunOptions,
    provisioner: P,
}

impl<P: Provisioner> ServiceRunner<P> {
    pub fn new(options: RunOptions, provisioner: P) -> Self {
        Self { options, provisioner }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Start (or adopt) the service and wait until `probe` succeeds.
    ///
    /// For an external service the probe runs once. For a provisioned one it is
    /// retried with backoff until the startup timeout, after which the instance is
    /// torn down and [`HarnessError::Timeout`] is returned.
    pub async fn start<C, E, F, Fut>(&self, probe: F) -> Result<Service<C>, HarnessError>
    where
        F: Fn(String, u16) -> Fut,
        Fut: Future<Output = Result<C, E>>,
        E: fmt::Display,
    {
        if let Some(external) = &self.options.external {
            info!(host = %external.host, port = external.port, "using external service");
            let config = probe(external.host.clone(), external.port)
                .await
                .map_err(|e| HarnessError::Probe(e.to_string()))?;
            return Ok(Service { config, cleanup: Cleanup::noop() });
        }

        let container_port = self.options.ports.first().copied().ok_or_else(|| {
            HarnessError::Provision {
                image: self.options.image(),
                message: "no container port exposed".to_string(),
            }
        })?;

        let instance = self.provisioner.provision(&self.options).await?;
        let host = instance.host().to_string();
        let port = instance.host_port(container_port);
        let cleanup = Cleanup::for_instance(instance);

        let Some(port) = port else {
            self.teardown(&cleanup).await;
            return Err(HarnessError::Provision {
                image: self.options.image(),
                message: format!("container port {} is not mapped", container_port),
            });
        };

        info!(image = %self.options.image(), host = %host, port, "waiting for service");
        let started = Instant::now();
        let timeout = self.options.startup_timeout;
        let mut delay = self.options.backoff.initial;

        loop {
            let remaining = timeout.saturating_sub(started.elapsed());
            let attempt = tokio::time::timeout(remaining, probe(host.clone(), port)).await;
            let last_error = match attempt {
                Ok(Ok(config)) => {
                    info!(elapsed = ?started.elapsed(), "service ready");
                    return Ok(Service { config, cleanup });
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => "probe timed out".to_string(),
            };

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                self.teardown(&cleanup).await;
                return Err(HarnessError::Timeout { elapsed, last_error });
            }

            debug!(error = %last_error, retry_in = ?delay, "service not ready");
            tokio::time::sleep(delay.min(timeout - elapsed)).await;
            delay = self.options.backoff.next_delay(delay);
        }
    }

    async fn teardown(&self, cleanup: &Cleanup) {
        if let Err(e) = cleanup.run().await {
            warn!(error = %e, "failed to tear down service");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let backoff = Backoff::default();
        let mut delay = backoff.initial;
        let mut seen = Vec::new();
        for _ in 0..8 {
            seen.push(delay);
            delay = backoff.next_delay(delay);
        }
        assert_eq!(seen[0], Duration::from_millis(100));
        assert_eq!(seen[1], Duration::from_millis(200));
        assert_eq!(seen[5], Duration::from_millis(3200));
        assert_eq!(seen[6], Duration::from_secs(5));
        assert_eq!(seen[7], Duration::from_secs(5));
    }

    #[test]
    fn test_parse_external_forms() {
        let ext = parse_external("localhost:8086", None).unwrap();
        assert_eq!(ext, ExternalService { host: "localhost".to_string(), port: 8086 });

        let ext = parse_external("db.internal", Some(8086)).unwrap();
        assert_eq!(ext.port, 8086);

        let ext = parse_external("[::1]:9000", None).unwrap();
        assert_eq!(ext, ExternalService { host: "::1".to_string(), port: 9000 });
    }

    #[test]
    fn test_parse_external_rejects_garbage() {
        assert!(matches!(
            parse_external("host:port", None),
            Err(HarnessError::InvalidOverride { .. })
        ));
        assert!(parse_external(":8086", None).is_err());
        assert!(parse_external("db.internal", None).is_err());
        assert!(parse_external("[::1", Some(1)).is_err());
    }

    #[test]
    fn test_run_options_builder() {
        let options = RunOptions::new("influxdb", "alpine")
            .with_env("INFLUXDB_DB", "vault")
            .with_port(8086)
            .with_external("127.0.0.1")
            .unwrap();

        assert_eq!(options.image(), "influxdb:alpine");
        assert_eq!(options.env, vec![("INFLUXDB_DB".to_string(), "vault".to_string())]);
        assert_eq!(options.startup_timeout, Duration::from_secs(60));
        assert_eq!(
            options.external,
            Some(ExternalService { host: "127.0.0.1".to_string(), port: 8086 })
        );
    }
}
