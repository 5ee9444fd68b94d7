//! # Credential Policy
//!
//! Username derivation for dynamic accounts and acceptance checks for the
//! host-supplied password. The plugin never generates or alters passwords.
//!
//! A generated username looks like `v_<display>_<role>_<random>_<unix-seconds>`.
//! The `<random>_<unix-seconds>` tail is the uniqueness suffix; when the whole name
//! exceeds the backend's identifier limit, characters are dropped from the front
//! segment so the suffix always survives intact.

use crate::config::UsernameSettings;
use crate::errors::{PluginError, Result};
use crate::secrets::SecretString;
use chrono::Utc;
use once_cell::sync::Lazy;
use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};

static ILLEGAL_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_\-]").expect("static username regex compiles"));

/// Operator-supplied naming inputs for a new account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsernameMetadata {
    pub display_name: String,
    pub role_name: String,
}

impl UsernameMetadata {
    pub fn new(display_name: impl Into<String>, role_name: impl Into<String>) -> Self {
        Self { display_name: display_name.into(), role_name: role_name.into() }
    }
}

/// How usernames are assembled for one backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsernamePolicy {
    pub prefix: String,
    pub display_name_length: usize,
    pub role_name_length: usize,
    pub random_length: usize,
    /// Longest identifier the backend accepts
    pub max_length: usize,
}

impl UsernamePolicy {
    pub fn new(max_length: usize) -> Self {
        Self {
            prefix: "v".to_string(),
            display_name_length: 15,
            role_name_length: 15,
            random_length: 20,
            max_length,
        }
    }

    /// Apply operator overrides from settings; `max_length` stays backend-owned.
    pub fn with_overrides(mut self, settings: &UsernameSettings) -> Self {
        if let Some(prefix) = &settings.prefix {
            self.prefix = prefix.clone();
        }
        if let Some(len) = settings.display_name_length {
            self.display_name_length = len;
        }
        if let Some(len) = settings.role_name_length {
            self.role_name_length = len;
        }
        if let Some(len) = settings.random_length {
            self.random_length = len;
        }
        self
    }

    /// Generate a fresh username for `metadata`.
    ///
    /// # Errors
    ///
    /// [`PluginError::PolicyViolation`] if the backend limit cannot hold the suffix.
    pub fn generate(&self, metadata: &UsernameMetadata) -> Result<String> {
        let random: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.random_length)
            .map(char::from)
            .collect();
        self.assemble(metadata, &random, Utc::now().timestamp())
    }

    fn assemble(&self, metadata: &UsernameMetadata, random: &str, unix: i64) -> Result<String> {
        let suffix = format!("{}_{}", random, unix);
        if self.max_length < suffix.len() {
            return Err(PluginError::policy(format!(
                "maximum username length {} cannot hold the {}-character uniqueness suffix",
                self.max_length,
                suffix.len()
            )));
        }

        let head = [
            sanitize(&self.prefix, usize::MAX),
            sanitize(&metadata.display_name, self.display_name_length),
            sanitize(&metadata.role_name, self.role_name_length),
        ]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_");

        // Room left for the head plus its `_` joiner.
        let room = self.max_length - suffix.len();
        if head.is_empty() || room < 2 {
            return Ok(suffix);
        }

        let keep = head.len().min(room - 1);
        // A cut right after a joiner would double it against the suffix.
        let head = head[..keep].trim_end_matches('_');
        if head.is_empty() {
            return Ok(suffix);
        }
        Ok(format!("{}_{}", head, suffix))
    }
}

/// Check a caller-supplied password. It is accepted verbatim when valid.
pub fn validate_password(password: &SecretString) -> Result<()> {
    if password.is_blank() {
        return Err(PluginError::policy("password must not be empty or whitespace"));
    }
    Ok(())
}

/// Take at most `max` characters and replace anything outside `[A-Za-z0-9_-]` with `_`.
fn sanitize(value: &str, max: usize) -> String {
    let truncated: String = value.chars().take(max).collect();
    ILLEGAL_CHARS.replace_all(&truncated, "_").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RANDOM: &str = "AbCdEfGhIjKlMnOpQrSt";
    const NOW: i64 = 1_700_000_000;

    fn metadata() -> UsernameMetadata {
        UsernameMetadata::new("test", "test")
    }

    #[test]
    fn test_assemble_layout() {
        let policy = UsernamePolicy::new(100);
        let name = policy.assemble(&metadata(), RANDOM, NOW).unwrap();
        assert_eq!(name, format!("v_test_test_{}_{}", RANDOM, NOW));
    }

    #[test]
    fn test_display_and_role_are_truncated() {
        let policy = UsernamePolicy::new(100);
        let meta = UsernameMetadata::new("a-very-long-display-name", "an-even-longer-role-name");
        let name = policy.assemble(&meta, RANDOM, NOW).unwrap();
        assert_eq!(name, format!("v_a-very-long-dis_an-even-longer-_{}_{}", RANDOM, NOW));
    }

    #[test]
    fn test_illegal_characters_are_replaced() {
        let policy = UsernamePolicy::new(100);
        let meta = UsernameMetadata::new("token \"x\"", "dev.ops/é");
        let name = policy.assemble(&meta, RANDOM, NOW).unwrap();
        assert!(name.starts_with("v_token__x__dev_ops__"), "{}", name);
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
    }

    #[test]
    fn test_truncation_keeps_suffix() {
        let suffix = format!("{}_{}", RANDOM, NOW);
        let policy = UsernamePolicy::new(suffix.len() + 5);
        let name = policy.assemble(&metadata(), RANDOM, NOW).unwrap();

        assert_eq!(name.len(), suffix.len() + 5);
        assert_eq!(name, format!("v_te_{}", suffix));
        assert!(name.ends_with(&suffix));
    }

    #[test]
    fn test_truncation_at_joiner_drops_trailing_underscore() {
        let suffix = format!("{}_{}", RANDOM, NOW);
        let policy = UsernamePolicy::new(suffix.len() + 3);
        let name = policy.assemble(&metadata(), RANDOM, NOW).unwrap();

        assert_eq!(name, format!("v_{}", suffix));
        assert!(!name.contains("__"), "{}", name);

        let policy = UsernamePolicy::new(suffix.len() + 8);
        let name = policy.assemble(&metadata(), RANDOM, NOW).unwrap();
        assert_eq!(name, format!("v_test_{}", suffix));
    }

    #[test]
    fn test_limit_equal_to_suffix_returns_suffix_only() {
        let suffix = format!("{}_{}", RANDOM, NOW);
        let policy = UsernamePolicy::new(suffix.len() + 1);
        assert_eq!(policy.assemble(&metadata(), RANDOM, NOW).unwrap(), suffix);

        let policy = UsernamePolicy::new(suffix.len());
        assert_eq!(policy.assemble(&metadata(), RANDOM, NOW).unwrap(), suffix);
    }

    #[test]
    fn test_limit_below_suffix_is_policy_violation() {
        let policy = UsernamePolicy::new(10);
        let result = policy.assemble(&metadata(), RANDOM, NOW);
        assert!(matches!(result, Err(PluginError::PolicyViolation { .. })));
    }

    #[test]
    fn test_generate_is_unique_and_bounded() {
        let policy = UsernamePolicy::new(100);
        let first = policy.generate(&metadata()).unwrap();
        let second = policy.generate(&metadata()).unwrap();

        assert_ne!(first, second);
        assert!(first.len() <= 100);
        assert!(first.starts_with("v_test_test_"));
    }

    #[test]
    fn test_overrides() {
        let settings = UsernameSettings {
            prefix: Some("vault".to_string()),
            display_name_length: Some(2),
            role_name_length: None,
            random_length: Some(8),
        };
        let policy = UsernamePolicy::new(64).with_overrides(&settings);

        assert_eq!(policy.prefix, "vault");
        assert_eq!(policy.display_name_length, 2);
        assert_eq!(policy.role_name_length, 15);
        assert_eq!(policy.random_length, 8);
        assert_eq!(policy.max_length, 64);

        let name = policy.assemble(&metadata(), "abcdefgh", NOW).unwrap();
        assert_eq!(name, format!("vault_te_test_abcdefgh_{}", NOW));
    }

    #[test]
    fn test_empty_metadata_still_yields_prefix() {
        let policy = UsernamePolicy::new(100);
        let name = policy.assemble(&UsernameMetadata::default(), RANDOM, NOW).unwrap();
        assert_eq!(name, format!("v_{}_{}", RANDOM, NOW));
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password(&SecretString::new("nuozxby98523u89bdfnkjl")).is_ok());
        assert!(matches!(
            validate_password(&SecretString::new("")),
            Err(PluginError::PolicyViolation { .. })
        ));
        assert!(matches!(
            validate_password(&SecretString::new(" \t\n")),
            Err(PluginError::PolicyViolation { .. })
        ));
        assert!(validate_password(&SecretString::new(" padded ")).is_ok());
    }
}
