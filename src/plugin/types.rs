//! Request and response types for the plugin contract

use crate::credentials::UsernameMetadata;
use crate::secrets::SecretString;
use crate::statements::Statements;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InitializeRequest {
    /// Raw connection mapping exactly as the host stored it
    pub config: Map<String, Value>,
    /// Ping the backend before reporting success
    #[serde(default)]
    pub verify_connection: bool,
}

impl InitializeRequest {
    pub fn new(config: Map<String, Value>) -> Self {
        Self { config, verify_connection: false }
    }

    pub fn verified(mut self) -> Self {
        self.verify_connection = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializeResponse {
    /// Normalized mapping for the host to persist
    pub config: Map<String, Value>,
}

/// Inbound only: the password cannot be serialized back out.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUserRequest {
    pub username_config: UsernameMetadata,
    pub statements: Statements,
    pub password: SecretString,
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUserResponse {
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePassword {
    pub new_password: SecretString,
    /// Rotation templates; empty means native rotation or the backend default
    #[serde(default)]
    pub statements: Statements,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeExpiration {
    pub new_expiration: DateTime<Utc>,
}

/// Inbound only, like [`NewUserRequest`].
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateUserRequest {
    pub username: String,
    #[serde(default)]
    pub password: Option<ChangePassword>,
    #[serde(default)]
    pub expiration: Option<ChangeExpiration>,
}

impl UpdateUserRequest {
    pub fn new(username: impl Into<String>) -> Self {
        Self { username: username.into(), password: None, expiration: None }
    }

    pub fn with_password(mut self, new_password: SecretString, statements: Statements) -> Self {
        self.password = Some(ChangePassword { new_password, statements });
        self
    }

    pub fn with_expiration(mut self, new_expiration: DateTime<Utc>) -> Self {
        self.expiration = Some(ChangeExpiration { new_expiration });
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateUserResponse {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteUserRequest {
    pub username: String,
    /// Revocation templates; empty means the backend default
    #[serde(default)]
    pub statements: Statements,
}

impl DeleteUserRequest {
    pub fn new(username: impl Into<String>) -> Self {
        Self { username: username.into(), statements: Statements::default() }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteUserResponse {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_user_request_from_json() {
        let request: NewUserRequest = serde_json::from_value(json!({
            "username_config": {"display_name": "test", "role_name": "test"},
            "statements": {"commands": ["CREATE USER \"{{username}}\""]},
            "password": "nuozxby98523u89bdfnkjl"
        }))
        .unwrap();

        assert_eq!(request.username_config.display_name, "test");
        assert_eq!(request.password.expose_secret(), "nuozxby98523u89bdfnkjl");
        assert!(request.expiration.is_none());
    }

    #[test]
    fn test_update_request_from_json_keeps_password() {
        let request: UpdateUserRequest = serde_json::from_value(json!({
            "username": "v_test",
            "password": {"new_password": "y89qgmbzadiygry8uazodijnb"}
        }))
        .unwrap();

        let change = request.password.as_ref().unwrap();
        assert_eq!(change.new_password.expose_secret(), "y89qgmbzadiygry8uazodijnb");
        assert!(change.statements.is_empty());
        assert!(!format!("{:?}", request).contains("y89qgmbzadiygry8uazodijnb"));
    }

    #[test]
    fn test_builders() {
        let request = InitializeRequest::new(Map::new()).verified();
        assert!(request.verify_connection);

        let request = UpdateUserRequest::new("u").with_expiration(Utc::now());
        assert!(request.password.is_none());
        assert!(request.expiration.is_some());
    }
}
