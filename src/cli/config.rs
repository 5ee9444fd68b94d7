//! Connection file loading and credential resolution for the CLI
//!
//! A connection file holds the raw mapping a host would send to `initialize`.
//! The format follows the extension: `.toml`, `.yaml`/`.yml`, anything else JSON.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::debug;

/// Environment variable consulted when `--password` is not given
pub const PASSWORD_ENV: &str = "CREDPLANE_PASSWORD";

/// Read the raw connection mapping from `path`.
pub fn load_connection_file(path: &Path) -> Result<Map<String, Value>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read connection file: {}", path.display()))?;

    let extension =
        path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).unwrap_or_default();

    let parsed: Map<String, Value> = match extension.as_str() {
        "toml" => toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML file: {}", path.display()))?,
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?,
        _ => serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse JSON file: {}", path.display()))?,
    };

    debug!(path = %path.display(), keys = parsed.len(), "loaded connection file");
    Ok(parsed)
}

/// Resolve the account password.
///
/// Checks sources in the following priority order:
/// 1. --password command line flag
/// 2. CREDPLANE_PASSWORD environment variable
pub fn resolve_password(password_flag: Option<String>) -> Result<String> {
    if let Some(password) = password_flag.filter(|p| !p.is_empty()) {
        debug!("Using password from --password flag");
        return Ok(password);
    }

    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        if !password.is_empty() {
            debug!("Using password from {} environment variable", PASSWORD_ENV);
            return Ok(password);
        }
    }

    anyhow::bail!(
        "No password found. Please provide one via:\n\
         - --password flag\n\
         - {} environment variable",
        PASSWORD_ENV
    )
}
