//! Redacting wrapper for passwords handled by the plugin.
//!
//! Admin passwords from the connection config and the host-supplied credential
//! passwords both travel as [`SecretString`], so they never show up in logs,
//! `Debug` output, error messages or serialized responses by accident.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A password that redacts itself in Debug, Display and serialization.
///
/// The backing memory is zeroed on drop. The only way to read the value is
/// [`SecretString::expose_secret`], which should be called right where the value is
/// bound into a statement or an auth header.
///
/// ```rust
/// use credplane::secrets::SecretString;
///
/// let password = SecretString::new("nuozxby98523u89bdfnkjl");
/// assert_eq!(format!("{:?}", password), "SecretString([REDACTED])");
/// assert_eq!(password.expose_secret(), "nuozxby98523u89bdfnkjl");
/// ```
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl Serialize for SecretString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(SecretString(value))
    }
}

impl SecretString {
    /// Wrap a password value.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Borrow the underlying password. Never log the result.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    /// Length of the password without exposing it.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the password is the empty string.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if the password is empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for SecretString {}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl Default for SecretString {
    fn default() -> Self {
        Self::new("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacts_debug_and_display() {
        let secret = SecretString::new("influx-root");

        assert_eq!(format!("{:?}", secret), "SecretString([REDACTED])");
        assert_eq!(format!("{}", secret), "[REDACTED]");
    }

    #[test]
    fn test_expose() {
        let secret = SecretString::new("y89qgmbzadiygry8uazodijnb");
        assert_eq!(secret.expose_secret(), "y89qgmbzadiygry8uazodijnb");
        assert_eq!(secret.len(), 25);
    }

    #[test]
    fn test_blank_detection() {
        assert!(SecretString::new("").is_blank());
        assert!(SecretString::new("  \t").is_blank());
        assert!(!SecretString::new(" a ").is_blank());
        assert!(SecretString::default().is_empty());
    }

    #[test]
    fn test_serialization_redacts() {
        #[derive(Serialize)]
        struct Credential {
            username: String,
            password: SecretString,
        }

        let json = serde_json::to_string(&Credential {
            username: "v_test_test".to_string(),
            password: SecretString::new("hidden-password"),
        })
        .unwrap();

        assert!(json.contains("v_test_test"));
        assert!(json.contains("[REDACTED]"));
        assert!(!json.contains("hidden-password"));
    }

    #[test]
    fn test_deserialization_accepts_values() {
        let secret: SecretString = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(secret.expose_secret(), "admin");
    }
}
