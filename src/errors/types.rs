//! # Error Types
//!
//! Error taxonomy for the credential plugin runtime using `thiserror`.
//!
//! Every error belongs to an [`ErrorCategory`] so a host can tell operator-fixable
//! configuration problems apart from transient connectivity problems and from
//! backend-state problems that need intervention.

use std::fmt;

/// Custom result type for plugin operations
pub type Result<T> = std::result::Result<T, PluginError>;

/// Main error type for the plugin runtime
#[derive(thiserror::Error, Debug)]
pub enum PluginError {
    /// A connection config field is present but unusable
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String, field: Option<String> },

    /// A required connection config field is absent or empty
    #[error("Missing required configuration field: {field}")]
    MissingField { field: String },

    /// A credential operation ran before a successful initialize
    #[error("Plugin is not initialized")]
    NotInitialized,

    /// Handshake, ping or transport failure talking to the backend
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A rendered statement failed to execute
    #[error("Statement {index} failed: {message}")]
    Statement { index: usize, message: String },

    /// Username or password constraints cannot be satisfied
    #[error("Policy violation: {message}")]
    PolicyViolation { message: String },

    /// The caller cancelled the operation or its deadline passed
    #[error("Operation '{operation}' cancelled: {reason}")]
    Cancelled { operation: String, reason: String },

    /// The target user does not exist on the backend
    #[error("User not found: {username}")]
    NotFound { username: String },

    /// The request itself is malformed (no statements, nothing to change)
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },
}

/// Broad classes of failure used for propagation decisions by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad or incomplete input, fixable by the operator
    Configuration,
    /// Connectivity problems, retryable by the host
    Transient,
    /// Backend state problems, not retryable without intervention
    BackendState,
    /// Caller-requested abort
    Cancelled,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Transient => write!(f, "transient"),
            ErrorCategory::BackendState => write!(f, "backend_state"),
            ErrorCategory::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl PluginError {
    /// Create a new invalid configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig { message: message.into(), field: None }
    }

    /// Create an invalid configuration error naming the offending field
    pub fn config_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::InvalidConfig { message: message.into(), field: Some(field.into()) }
    }

    /// Create a missing field error
    pub fn missing_field<F: Into<String>>(field: F) -> Self {
        Self::MissingField { field: field.into() }
    }

    /// Create a connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Create a connection error with source
    pub fn connection_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(source) }
    }

    /// Create a statement execution error for the statement at `index`
    pub fn statement<S: Into<String>>(index: usize, message: S) -> Self {
        Self::Statement { index, message: message.into() }
    }

    /// Create a policy violation error
    pub fn policy<S: Into<String>>(message: S) -> Self {
        Self::PolicyViolation { message: message.into() }
    }

    /// Create a cancellation error
    pub fn cancelled<O: Into<String>, R: Into<String>>(operation: O, reason: R) -> Self {
        Self::Cancelled { operation: operation.into(), reason: reason.into() }
    }

    /// Create a not found error
    pub fn not_found<U: Into<String>>(username: U) -> Self {
        Self::NotFound { username: username.into() }
    }

    /// Create an invalid request error
    pub fn invalid_request<S: Into<String>>(message: S) -> Self {
        Self::InvalidRequest { message: message.into() }
    }

    /// Re-index a statement error relative to a whole batch
    pub(crate) fn at_statement(self, index: usize) -> Self {
        match self {
            PluginError::Statement { message, .. } => PluginError::Statement { index, message },
            other => other,
        }
    }

    /// Classify this error for propagation
    pub fn category(&self) -> ErrorCategory {
        match self {
            PluginError::InvalidConfig { .. }
            | PluginError::MissingField { .. }
            | PluginError::InvalidRequest { .. }
            | PluginError::PolicyViolation { .. }
            | PluginError::Serialization { .. } => ErrorCategory::Configuration,
            PluginError::Connection { .. } => ErrorCategory::Transient,
            PluginError::NotInitialized
            | PluginError::Statement { .. }
            | PluginError::NotFound { .. } => ErrorCategory::BackendState,
            PluginError::Cancelled { .. } => ErrorCategory::Cancelled,
        }
    }

    /// Check if the host may retry this operation unchanged
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }

    /// Short stable label used in metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            PluginError::InvalidConfig { .. } => "invalid_config",
            PluginError::MissingField { .. } => "missing_field",
            PluginError::NotInitialized => "not_initialized",
            PluginError::Connection { .. } => "connection_error",
            PluginError::Statement { .. } => "statement_error",
            PluginError::PolicyViolation { .. } => "policy_violation",
            PluginError::Cancelled { .. } => "cancelled",
            PluginError::NotFound { .. } => "not_found",
            PluginError::InvalidRequest { .. } => "invalid_request",
            PluginError::Serialization { .. } => "serialization",
        }
    }
}

impl From<serde_json::Error> for PluginError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON serialization failed".to_string() }
    }
}

impl From<config::ConfigError> for PluginError {
    fn from(error: config::ConfigError) -> Self {
        Self::config(format!("Settings loading failed: {}", error))
    }
}

impl From<validator::ValidationErrors> for PluginError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::config(format!("Validation failed: {}", message))
    }
}
