//! # Plugin Lifecycle
//!
//! The host-facing contract: `initialize`, `new_user`, `update_user`,
//! `delete_user`, `close`. [`DatabasePlugin`] implements it once over any
//! [`BackendConnector`](crate::backends::BackendConnector).
//!
//! ```text
//! Uninitialized --initialize--> Initialized --close--> Closed
//!                                    ^                    |
//!                                    +----initialize------+
//! ```

pub mod context;
pub mod lifecycle;
pub mod types;

pub use context::OperationContext;
pub use lifecycle::{DatabasePlugin, LifecycleState};
pub use types::{
    ChangeExpiration, ChangePassword, DeleteUserRequest, DeleteUserResponse, InitializeRequest,
    InitializeResponse, NewUserRequest, NewUserResponse, UpdateUserRequest, UpdateUserResponse,
};

use crate::errors::Result;
use async_trait::async_trait;

/// Host boundary of a database credential plugin
#[async_trait]
pub trait Database: Send + Sync {
    /// Normalize `config`, build the backend handle and mark the instance initialized.
    async fn initialize(
        &self,
        ctx: &OperationContext,
        request: InitializeRequest,
    ) -> Result<InitializeResponse>;

    /// Create a dynamic account and return its generated username.
    async fn new_user(
        &self,
        ctx: &OperationContext,
        request: NewUserRequest,
    ) -> Result<NewUserResponse>;

    /// Rotate the password and/or move the expiration of an existing account.
    async fn update_user(
        &self,
        ctx: &OperationContext,
        request: UpdateUserRequest,
    ) -> Result<UpdateUserResponse>;

    /// Revoke an account.
    async fn delete_user(
        &self,
        ctx: &OperationContext,
        request: DeleteUserRequest,
    ) -> Result<DeleteUserResponse>;

    /// Release the backend handle once in-flight operations drain. Calling it again is a
    /// no-op.
    async fn close(&self, ctx: &OperationContext) -> Result<()>;

    /// Backend type identifier, e.g. `"influxdb"`
    fn type_name(&self) -> &'static str;
}
