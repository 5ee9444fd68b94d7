//! # Plugin Settings
//!
//! Process-level tuning for the plugin runtime, loaded from `CREDPLANE_*`
//! environment variables over built-in defaults and validated before use.
//!
//! | Variable | Field |
//! |----------|-------|
//! | `CREDPLANE_DELETE_POLICY` | `delete_policy` (`strict` / `idempotent`) |
//! | `CREDPLANE_OPERATION_TIMEOUT_SECONDS` | `operation_timeout_seconds` |
//! | `CREDPLANE_USERNAME__PREFIX` | `username.prefix` |
//! | `CREDPLANE_USERNAME__DISPLAY_NAME_LENGTH` | `username.display_name_length` |
//! | `CREDPLANE_USERNAME__ROLE_NAME_LENGTH` | `username.role_name_length` |
//! | `CREDPLANE_USERNAME__RANDOM_LENGTH` | `username.random_length` |
//! | `CREDPLANE_LOGGING__LOG_LEVEL` | `logging.log_level` |
//! | `CREDPLANE_LOGGING__JSON_LOGGING` | `logging.json_logging` |

use crate::errors::{PluginError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use validator::Validate;

/// Environment variable prefix for all settings
pub const ENV_PREFIX: &str = "CREDPLANE";

/// What `delete_user` reports when the target account is already gone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeletePolicy {
    /// Surface `NotFound` to the host
    #[default]
    Strict,
    /// Treat an absent account as successfully deleted
    Idempotent,
}

impl DeletePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Idempotent => "idempotent",
        }
    }
}

impl FromStr for DeletePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "idempotent" => Ok(Self::Idempotent),
            _ => Err(format!("Unknown delete policy: {}", s)),
        }
    }
}

impl fmt::Display for DeletePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Top-level plugin settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PluginSettings {
    /// Behaviour of `delete_user` for accounts removed out-of-band
    pub delete_policy: DeletePolicy,

    /// Deadline applied to operations whose caller supplied none (0 = no deadline)
    #[validate(range(max = 3600, message = "Operation timeout must be at most 3600 seconds"))]
    pub operation_timeout_seconds: u64,

    /// Overrides for the backend's username policy
    #[validate(nested)]
    pub username: UsernameSettings,

    /// Logging configuration
    #[validate(nested)]
    pub logging: LoggingConfig,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            delete_policy: DeletePolicy::default(),
            operation_timeout_seconds: 30,
            username: UsernameSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PluginSettings {
    /// Load settings from `CREDPLANE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::load(config::Environment::with_prefix(ENV_PREFIX))
    }

    fn load(environment: config::Environment) -> Result<Self> {
        let settings: PluginSettings = config::Config::builder()
            .add_source(config::Config::try_from(&PluginSettings::default())?)
            .add_source(environment.prefix_separator("_").separator("__").try_parsing(true))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(PluginError::from)
    }

    /// Default operation deadline (None if disabled)
    pub fn operation_timeout(&self) -> Option<Duration> {
        if self.operation_timeout_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.operation_timeout_seconds))
        }
    }
}

/// Optional overrides applied on top of a backend's username policy
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default, PartialEq)]
#[serde(default)]
pub struct UsernameSettings {
    #[validate(length(max = 16, message = "Username prefix must be at most 16 characters"))]
    pub prefix: Option<String>,

    #[validate(range(max = 64, message = "Display name length must be at most 64"))]
    pub display_name_length: Option<usize>,

    #[validate(range(max = 64, message = "Role name length must be at most 64"))]
    pub role_name_length: Option<usize>,

    #[validate(range(min = 8, max = 64, message = "Random length must be between 8 and 64"))]
    pub random_length: Option<usize>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Emit JSON lines instead of human-readable output
    pub json_logging: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { log_level: "info".to_string(), json_logging: false }
    }
}
