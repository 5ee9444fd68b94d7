//! # Connection Config Normalization
//!
//! Hosts hand the plugin a loosely-typed mapping: `port` may be a JSON number or a
//! decimal string, the harness may pass `host` as a combined `host:port`, and every
//! backend adds its own extra keys. [`normalize`] turns that mapping into one
//! canonical [`ConnectionConfig`] so nothing downstream branches on value types.

use crate::errors::{PluginError, Result};
use crate::secrets::SecretString;
use serde_json::{Map, Value};
use std::fmt;

/// Key holding the network host.
pub const HOST_KEY: &str = "host";
/// Key holding the network port.
pub const PORT_KEY: &str = "port";
/// Key holding the admin username.
pub const USERNAME_KEY: &str = "username";
/// Key holding the admin password.
pub const PASSWORD_KEY: &str = "password";

const KNOWN_KEYS: [&str; 4] = [HOST_KEY, PORT_KEY, USERNAME_KEY, PASSWORD_KEY];

/// Strongly-typed connection descriptor produced by [`normalize`].
#[derive(Clone, PartialEq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    /// Backend-specific keys, kept verbatim for the round trip back to the host.
    pub extras: Map<String, Value>,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password)
            .field("extras", &self.extras.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ConnectionConfig {
    /// `host:port`, bracketing IPv6 literals.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Look up a backend-specific key.
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extras.get(key)
    }

    /// Convert back to the mapping shape the host persists.
    ///
    /// The port is always emitted as an integer and the password in clear text,
    /// since the host stores exactly what was effectively used.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = self.extras.clone();
        map.insert(HOST_KEY.to_string(), Value::String(self.host.clone()));
        map.insert(PORT_KEY.to_string(), Value::from(self.port));
        map.insert(USERNAME_KEY.to_string(), Value::String(self.username.clone()));
        map.insert(
            PASSWORD_KEY.to_string(),
            Value::String(self.password.expose_secret().to_string()),
        );
        map
    }

    /// Same as [`ConnectionConfig::to_map`] but with the password redacted, for display.
    pub fn to_redacted_map(&self) -> Map<String, Value> {
        let mut map = self.to_map();
        map.insert(PASSWORD_KEY.to_string(), Value::String(self.password.to_string()));
        map
    }
}

/// Normalize a raw connection mapping.
///
/// # Errors
///
/// - [`PluginError::MissingField`] if host, port, username or password is absent or empty
/// - [`PluginError::InvalidConfig`] if a present field has an unusable value
pub fn normalize(raw: &Map<String, Value>) -> Result<ConnectionConfig> {
    let raw_host = required_string(raw, HOST_KEY)?;

    let (host, port) = match non_null(raw, PORT_KEY) {
        Some(value) => (raw_host, parse_port(value)?),
        None => match split_host_port(&raw_host)? {
            Some((host, port)) => (host, port),
            None => return Err(PluginError::missing_field(PORT_KEY)),
        },
    };

    if host.is_empty() {
        return Err(PluginError::missing_field(HOST_KEY));
    }

    let username = required_string(raw, USERNAME_KEY)?;
    let password = SecretString::new(required_string(raw, PASSWORD_KEY)?);

    let extras = raw
        .iter()
        .filter(|(key, _)| !KNOWN_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok(ConnectionConfig { host, port, username, password, extras })
}

fn non_null<'a>(raw: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    raw.get(key).filter(|value| !value.is_null())
}

fn required_string(raw: &Map<String, Value>, key: &str) -> Result<String> {
    match non_null(raw, key) {
        None => Err(PluginError::missing_field(key)),
        Some(Value::String(s)) if s.is_empty() => Err(PluginError::missing_field(key)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(PluginError::config_field(
            format!("'{}' must be a string, got {}", key, json_type(other)),
            key,
        )),
    }
}

/// Accept a JSON integer or a decimal-digit string.
fn parse_port(value: &Value) -> Result<u16> {
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
            s.parse::<u64>().ok()
        }
        _ => None,
    };

    match parsed {
        Some(port) if (1..=u16::MAX as u64).contains(&port) => Ok(port as u16),
        Some(port) => Err(PluginError::config_field(
            format!("port {} is out of range 1-65535", port),
            PORT_KEY,
        )),
        None => Err(PluginError::config_field(
            format!("port must be an integer or a decimal string, got {}", value),
            PORT_KEY,
        )),
    }
}

/// Split `host:port` or `[v6]:port`. Returns `None` when there is no port part.
fn split_host_port(address: &str) -> Result<Option<(String, u16)>> {
    if let Some(rest) = address.strip_prefix('[') {
        let Some((host, tail)) = rest.split_once(']') else {
            return Err(PluginError::config_field(
                format!("unterminated IPv6 literal in '{}'", address),
                HOST_KEY,
            ));
        };
        return match tail.strip_prefix(':') {
            Some(port) => Ok(Some((host.to_string(), parse_port(&Value::from(port))?))),
            None => Ok(None),
        };
    }

    // A bare IPv6 literal has several colons and no port.
    if address.matches(':').count() != 1 {
        return Ok(None);
    }

    match address.rsplit_once(':') {
        Some((host, port)) => Ok(Some((host.to_string(), parse_port(&Value::from(port))?))),
        None => Ok(None),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("test config must be an object"),
        }
    }

    #[test]
    fn test_port_as_integer_and_string_agree() {
        let as_int = normalize(&raw(json!({
            "host": "db.local", "port": 8086, "username": "admin", "password": "admin"
        })))
        .unwrap();
        let as_string = normalize(&raw(json!({
            "host": "db.local", "port": "8086", "username": "admin", "password": "admin"
        })))
        .unwrap();

        assert_eq!(as_int, as_string);
        assert_eq!(as_int.port, 8086);
        assert_eq!(as_int.to_map()["port"], json!(8086));
    }

    #[test]
    fn test_combined_host_port_is_split() {
        let config = normalize(&raw(json!({
            "host": "127.0.0.1:49153", "username": "influx-root", "password": "influx-root"
        })))
        .unwrap();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 49153);
        assert_eq!(config.address(), "127.0.0.1:49153");
    }

    #[test]
    fn test_bracketed_ipv6_is_split() {
        let config = normalize(&raw(json!({
            "host": "[::1]:8086", "username": "a", "password": "b"
        })))
        .unwrap();

        assert_eq!(config.host, "::1");
        assert_eq!(config.port, 8086);
        assert_eq!(config.address(), "[::1]:8086");
    }

    #[test]
    fn test_missing_fields() {
        let cases = [
            (json!({"port": 1, "username": "a", "password": "b"}), "host"),
            (json!({"host": "h", "username": "a", "password": "b"}), "port"),
            (json!({"host": "h", "port": 1, "password": "b"}), "username"),
            (json!({"host": "h", "port": 1, "username": "a"}), "password"),
            (json!({"host": "", "port": 1, "username": "a", "password": "b"}), "host"),
            (json!({"host": "h", "port": null, "username": "a", "password": "b"}), "port"),
        ];

        for (input, expected) in cases {
            match normalize(&raw(input)) {
                Err(PluginError::MissingField { field }) => assert_eq!(field, expected),
                other => panic!("expected MissingField({}), got {:?}", expected, other),
            }
        }
    }

    #[test]
    fn test_invalid_ports() {
        for port in [json!("80a"), json!(-1), json!(8086.5), json!(0), json!(70000), json!(true)]
        {
            let result = normalize(&raw(json!({
                "host": "h", "port": port, "username": "a", "password": "b"
            })));
            assert!(
                matches!(result, Err(PluginError::InvalidConfig { .. })),
                "port {} should be rejected",
                port
            );
        }
    }

    #[test]
    fn test_non_string_username_is_invalid() {
        let result =
            normalize(&raw(json!({"host": "h", "port": 1, "username": 5, "password": "b"})));
        assert!(matches!(result, Err(PluginError::InvalidConfig { .. })));
    }

    #[test]
    fn test_extras_round_trip() {
        let input = raw(json!({
            "host": "h", "port": "8086", "username": "a", "password": "b",
            "tls": true, "connect_timeout": "5s", "nested": {"k": [1, 2]}
        }));
        let config = normalize(&input).unwrap();

        assert_eq!(config.extra("tls"), Some(&json!(true)));
        let output = config.to_map();
        assert_eq!(output["nested"], json!({"k": [1, 2]}));
        assert_eq!(output["connect_timeout"], json!("5s"));
        assert_eq!(output["port"], json!(8086));
        assert_eq!(output.len(), input.len());
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let first = normalize(&raw(json!({
            "host": "db.local:8086", "username": "admin", "password": "admin", "tls": "true"
        })))
        .unwrap();
        let second = normalize(&first.to_map()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.to_map(), second.to_map());
    }

    #[test]
    fn test_debug_and_redacted_map_hide_password() {
        let config = normalize(&raw(json!({
            "host": "h", "port": 1, "username": "a", "password": "topsecret"
        })))
        .unwrap();

        assert!(!format!("{:?}", config).contains("topsecret"));
        assert_eq!(config.to_redacted_map()["password"], json!("[REDACTED]"));
        assert_eq!(config.to_map()["password"], json!("topsecret"));
    }
}
