//! Common test utilities for all integration tests.
//!
//! Provides an in-memory backend that understands the InfluxQL user statements
//! the tests issue, plus connection-config helpers.

#![allow(dead_code)]
#![allow(clippy::duplicate_mod)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use credplane::backends::{Backend, BackendConnector, BackendType};
use credplane::config::ConnectionConfig;
use credplane::credentials::UsernamePolicy;
use credplane::{PluginError, Result, SecretString};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ADMIN_USER: &str = "influx-root";
pub const ADMIN_PASSWORD: &str = "influx-root";

pub const CREATE_USER_STATEMENTS: &str = concat!(
    r#"CREATE USER "{{username}}" WITH PASSWORD '{{password}}';"#,
    r#"GRANT ALL ON "vault" TO "{{username}}";"#,
);

static CREATE_USER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^CREATE USER "([^"]+)" WITH PASSWORD '(.*)'$"#).unwrap());
static SET_PASSWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^SET PASSWORD FOR "([^"]+)" = '(.*)'$"#).unwrap());
static DROP_USER: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^DROP USER "([^"]+)"$"#).unwrap());
static GRANT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^GRANT ALL ON "[^"]+" TO "([^"]+)"$"#).unwrap());

/// Connection mapping with an integer port
pub fn make_config() -> Map<String, Value> {
    raw(json!({
        "host": "127.0.0.1",
        "port": 8086,
        "username": ADMIN_USER,
        "password": ADMIN_PASSWORD,
    }))
}

/// Copy of `base` with `key` replaced
pub fn make_config_with(base: &Map<String, Value>, key: &str, value: Value) -> Map<String, Value> {
    let mut config = base.clone();
    config.insert(key.to_string(), value);
    config
}

pub fn raw(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}

/// In-memory stand-in for an InfluxDB server
#[derive(Debug, Default)]
pub struct MemoryBackend {
    users: Mutex<HashMap<String, String>>,
    executed: Mutex<Vec<String>>,
    expirations: Mutex<HashMap<String, DateTime<Utc>>>,
    ping_fails: AtomicBool,
    delay: Mutex<Option<Duration>>,
    native_rotation: bool,
    native_expiration: bool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_native_rotation(mut self) -> Self {
        self.native_rotation = true;
        self
    }

    pub fn with_native_expiration(mut self) -> Self {
        self.native_expiration = true;
        self
    }

    pub fn set_ping_fails(&self, fails: bool) {
        self.ping_fails.store(fails, Ordering::SeqCst);
    }

    /// Make every statement take `delay` before completing
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn login(&self, username: &str, password: &str) -> bool {
        self.users.lock().unwrap().get(username).is_some_and(|p| p == password)
    }

    pub fn user_exists(&self, username: &str) -> bool {
        self.users.lock().unwrap().contains_key(username)
    }

    pub fn user_count(&self) -> usize {
        self.users.lock().unwrap().len()
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn expiration_of(&self, username: &str) -> Option<DateTime<Utc>> {
        self.expirations.lock().unwrap().get(username).copied()
    }

    fn apply(&self, statement: &str) -> Result<()> {
        let mut users = self.users.lock().unwrap();

        if let Some(caps) = CREATE_USER.captures(statement) {
            if users.contains_key(&caps[1]) {
                return Err(PluginError::statement(0, "user already exists"));
            }
            users.insert(caps[1].to_string(), caps[2].to_string());
            return Ok(());
        }
        if let Some(caps) = SET_PASSWORD.captures(statement) {
            return match users.get_mut(&caps[1]) {
                Some(password) => {
                    *password = caps[2].to_string();
                    Ok(())
                }
                None => Err(PluginError::not_found(&caps[1])),
            };
        }
        if let Some(caps) = DROP_USER.captures(statement) {
            return match users.remove(&caps[1]) {
                Some(_) => Ok(()),
                None => Err(PluginError::not_found(&caps[1])),
            };
        }
        if let Some(caps) = GRANT.captures(statement) {
            return if users.contains_key(&caps[1]) {
                Ok(())
            } else {
                Err(PluginError::not_found(&caps[1]))
            };
        }

        Err(PluginError::statement(0, format!("error parsing query: {}", statement)))
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn execute(&self, statement: &str) -> Result<()> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.apply(statement)?;
        self.executed.lock().unwrap().push(statement.to_string());
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        if self.ping_fails.load(Ordering::SeqCst) {
            return Err(PluginError::connection("connection refused"));
        }
        Ok(())
    }

    async fn rotate_password(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Option<Result<()>> {
        if !self.native_rotation {
            return None;
        }
        let mut users = self.users.lock().unwrap();
        Some(match users.get_mut(username) {
            Some(current) => {
                *current = password.expose_secret().to_string();
                Ok(())
            }
            None => Err(PluginError::not_found(username)),
        })
    }

    async fn set_expiration(&self, username: &str, at: DateTime<Utc>) -> Option<Result<()>> {
        if !self.native_expiration {
            return None;
        }
        self.expirations.lock().unwrap().insert(username.to_string(), at);
        Some(Ok(()))
    }

    fn default_rotation_statements(&self) -> Vec<String> {
        vec![r#"SET PASSWORD FOR "{{username}}" = '{{password}}'"#.to_string()]
    }

    fn default_revocation_statements(&self) -> Vec<String> {
        vec![r#"DROP USER "{{username}}""#.to_string()]
    }

    fn username_policy(&self) -> UsernamePolicy {
        UsernamePolicy::new(100)
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Influxdb
    }
}

/// Connector that always hands out the same shared [`MemoryBackend`]
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    pub backend: Arc<MemoryBackend>,
    connects: Arc<AtomicUsize>,
    last_config: Arc<Mutex<Option<ConnectionConfig>>>,
}

impl MemoryConnector {
    pub fn new(backend: MemoryBackend) -> Self {
        Self { backend: Arc::new(backend), ..Default::default() }
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn last_config(&self) -> Option<ConnectionConfig> {
        self.last_config.lock().unwrap().clone()
    }
}

impl BackendConnector for MemoryConnector {
    fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Backend>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        *self.last_config.lock().unwrap() = Some(config.clone());
        Ok(self.backend.clone())
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Influxdb
    }
}
