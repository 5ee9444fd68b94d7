//! Lifecycle state machine shared by every backend

use super::context::OperationContext;
use super::types::{
    DeleteUserRequest, DeleteUserResponse, InitializeRequest, InitializeResponse, NewUserRequest,
    NewUserResponse, UpdateUserRequest, UpdateUserResponse,
};
use super::Database;
use crate::backends::{Backend, BackendConnector};
use crate::config::{normalize, ConnectionConfig, DeletePolicy, PluginSettings};
use crate::credentials::validate_password;
use crate::errors::{PluginError, Result};
use crate::observability::record_operation;
use crate::plugin_span;
use crate::statements::{render_batch, StatementBindings};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info, warn, Instrument};

/// Where an instance sits in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Uninitialized,
    Initialized,
    Closed,
}

#[derive(Debug)]
struct PluginState {
    lifecycle: LifecycleState,
    backend: Option<Arc<dyn Backend>>,
    config: Option<ConnectionConfig>,
}

impl PluginState {
    fn backend(&self) -> Result<&Arc<dyn Backend>> {
        match (self.lifecycle, &self.backend) {
            (LifecycleState::Initialized, Some(backend)) => Ok(backend),
            _ => Err(PluginError::NotInitialized),
        }
    }
}

/// A credential plugin instance bound to one backend connector.
///
/// `initialize` and `close` take the state lock exclusively; credential operations
/// share it, so many can run at once against the same handle while a re-initialize
/// waits for them to drain.
pub struct DatabasePlugin<C: BackendConnector> {
    connector: C,
    settings: PluginSettings,
    state: RwLock<PluginState>,
}

impl<C: BackendConnector> DatabasePlugin<C> {
    pub fn new(connector: C) -> Self {
        Self::with_settings(connector, PluginSettings::default())
    }

    pub fn with_settings(connector: C, settings: PluginSettings) -> Self {
        Self {
            connector,
            settings,
            state: RwLock::new(PluginState {
                lifecycle: LifecycleState::Uninitialized,
                backend: None,
                config: None,
            }),
        }
    }

    pub fn settings(&self) -> &PluginSettings {
        &self.settings
    }

    pub async fn state(&self) -> LifecycleState {
        self.state.read().await.lifecycle
    }

    pub async fn is_initialized(&self) -> bool {
        self.state().await == LifecycleState::Initialized
    }

    /// Normalized config of the current handle, if initialized
    pub async fn connection_config(&self) -> Option<ConnectionConfig> {
        self.state.read().await.config.clone()
    }

    async fn initialized(&self) -> Result<RwLockReadGuard<'_, PluginState>> {
        let state = self.state.read().await;
        state.backend()?;
        Ok(state)
    }

    async fn run_initialize(&self, request: InitializeRequest) -> Result<InitializeResponse> {
        let config = normalize(&request.config)?;
        let backend = self.connector.connect(&config)?;

        let mut state = self.state.write().await;
        if request.verify_connection {
            backend.ping().await?;
        }

        let response = InitializeResponse { config: config.to_map() };
        let previous = state.lifecycle;
        state.backend = Some(backend);
        state.config = Some(config);
        state.lifecycle = LifecycleState::Initialized;

        info!(
            previous = ?previous,
            verified = request.verify_connection,
            "plugin initialized"
        );
        Ok(response)
    }

    async fn run_new_user(&self, request: NewUserRequest) -> Result<NewUserResponse> {
        let state = self.initialized().await?;
        let backend = state.backend()?;

        if request.statements.is_empty() {
            return Err(PluginError::invalid_request("no creation statements provided"));
        }
        validate_password(&request.password)?;

        let policy = backend.username_policy().with_overrides(&self.settings.username);
        let username = policy.generate(&request.username_config)?;
        tracing::Span::current().record("username", username.as_str());

        let bindings = StatementBindings::new(&username).with_password(&request.password);
        execute_statements(backend.as_ref(), &request.statements.commands, &bindings, &username)
            .await?;

        if let Some(expiration) = request.expiration {
            apply_expiration(backend.as_ref(), &username, expiration).await?;
        }

        info!(username = %username, "user created");
        Ok(NewUserResponse { username })
    }

    async fn run_update_user(&self, request: UpdateUserRequest) -> Result<UpdateUserResponse> {
        let state = self.initialized().await?;
        let backend = state.backend()?;

        if request.password.is_none() && request.expiration.is_none() {
            return Err(PluginError::invalid_request("no changes requested"));
        }
        let username = request.username.as_str();

        if let Some(change) = &request.password {
            let password = &change.new_password;
            validate_password(password)?;
            let bindings = StatementBindings::new(username).with_password(password);

            if !change.statements.is_empty() {
                let templates = &change.statements.commands;
                execute_statements(backend.as_ref(), templates, &bindings, username).await?;
            } else if let Some(result) = backend.rotate_password(username, password).await {
                result?;
            } else {
                let defaults = backend.default_rotation_statements();
                execute_statements(backend.as_ref(), &defaults, &bindings, username).await?;
            }
            info!(username = %username, "password rotated");
        }

        if let Some(change) = request.expiration {
            apply_expiration(backend.as_ref(), username, change.new_expiration).await?;
        }

        Ok(UpdateUserResponse::default())
    }

    async fn run_delete_user(&self, request: DeleteUserRequest) -> Result<DeleteUserResponse> {
        let state = self.initialized().await?;
        let backend = state.backend()?;
        let username = request.username.as_str();

        let templates = if request.statements.is_empty() {
            backend.default_revocation_statements()
        } else {
            request.statements.commands.clone()
        };

        let bindings = StatementBindings::new(username);
        match execute_statements(backend.as_ref(), &templates, &bindings, username).await {
            Ok(()) => {
                info!(username = %username, "user deleted");
                Ok(DeleteUserResponse::default())
            }
            Err(PluginError::NotFound { .. })
                if self.settings.delete_policy == DeletePolicy::Idempotent =>
            {
                warn!(username = %username, "user already absent, treating delete as success");
                Ok(DeleteUserResponse::default())
            }
            Err(e) => Err(e),
        }
    }

    async fn run_close(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if state.lifecycle != LifecycleState::Initialized {
            debug!(state = ?state.lifecycle, "close on inactive plugin ignored");
            return Ok(());
        }

        state.backend = None;
        state.config = None;
        state.lifecycle = LifecycleState::Closed;
        info!(backend = %self.connector.backend_type(), "plugin closed");
        Ok(())
    }

    /// Apply the caller's default deadline and run `future` inside an operation span.
    async fn traced<T, F>(
        &self,
        ctx: &OperationContext,
        operation: &'static str,
        future: F,
    ) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        let ctx = ctx.or_timeout(self.settings.operation_timeout());
        let span = plugin_span!(operation, backend = self.connector.backend_type());

        let result = ctx.run(operation, future).instrument(span.clone()).await;
        if let Err(e) = &result {
            span.in_scope(|| {
                warn!(error = %e, kind = e.kind(), category = %e.category(), "operation failed")
            });
        }
        record_operation(operation, &result);
        result
    }
}

/// Render `templates` and execute each statement in order, stopping at the first failure.
async fn execute_statements(
    backend: &dyn Backend,
    templates: &[String],
    bindings: &StatementBindings<'_>,
    username: &str,
) -> Result<()> {
    let statements = render_batch(templates, bindings);
    for (index, statement) in statements.iter().enumerate() {
        debug!(index, total = statements.len(), "executing statement");
        backend.execute(statement).await.map_err(|e| match e {
            PluginError::NotFound { .. } => PluginError::not_found(username),
            other => other.at_statement(index),
        })?;
    }
    Ok(())
}

async fn apply_expiration(
    backend: &dyn Backend,
    username: &str,
    at: chrono::DateTime<chrono::Utc>,
) -> Result<()> {
    match backend.set_expiration(username, at).await {
        Some(result) => result,
        None => {
            debug!(
                username = %username,
                expiration = %at,
                backend = %backend.backend_type(),
                "backend has no native expiration, leaving it to the host"
            );
            Ok(())
        }
    }
}

#[async_trait]
impl<C: BackendConnector> Database for DatabasePlugin<C> {
    async fn initialize(
        &self,
        ctx: &OperationContext,
        request: InitializeRequest,
    ) -> Result<InitializeResponse> {
        self.traced(ctx, "initialize", self.run_initialize(request)).await
    }

    async fn new_user(
        &self,
        ctx: &OperationContext,
        request: NewUserRequest,
    ) -> Result<NewUserResponse> {
        self.traced(ctx, "new_user", self.run_new_user(request)).await
    }

    async fn update_user(
        &self,
        ctx: &OperationContext,
        request: UpdateUserRequest,
    ) -> Result<UpdateUserResponse> {
        self.traced(ctx, "update_user", self.run_update_user(request)).await
    }

    async fn delete_user(
        &self,
        ctx: &OperationContext,
        request: DeleteUserRequest,
    ) -> Result<DeleteUserResponse> {
        self.traced(ctx, "delete_user", self.run_delete_user(request)).await
    }

    async fn close(&self, ctx: &OperationContext) -> Result<()> {
        self.traced(ctx, "close", self.run_close()).await
    }

    fn type_name(&self) -> &'static str {
        self.connector.backend_type().as_str()
    }
}
