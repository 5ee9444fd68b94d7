//! # Command Line Interface
//!
//! Drives the plugin lifecycle against a connection file, for operators checking a
//! config or issuing a credential by hand.

pub mod config;
pub mod output;

use crate::backends::InfluxdbConnector;
use crate::config::{normalize, PluginSettings};
use crate::credentials::UsernameMetadata;
use crate::observability::{describe_metrics, init_logging};
use crate::plugin::{
    Database, DatabasePlugin, DeleteUserRequest, InitializeRequest, NewUserRequest,
    OperationContext, UpdateUserRequest,
};
use crate::secrets::SecretString;
use crate::statements::Statements;
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use output::OutputFormat;
use serde_json::json;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "credplane")]
#[command(about = "Dynamic database credential tooling")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (json or yaml)
    #[arg(short, long, global = true, default_value = "json")]
    pub output: OutputFormat,

    /// Operation timeout in seconds (overrides CREDPLANE_OPERATION_TIMEOUT_SECONDS)
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Connection file (JSON, TOML or YAML)
    #[arg(short, long)]
    pub config: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Normalize a connection file and optionally verify connectivity
    Check {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Skip the connectivity check
        #[arg(long)]
        offline: bool,
    },

    /// Create a dynamic user and print its generated username
    CreateUser {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Display name used in the generated username
        #[arg(long, default_value = "cli")]
        display_name: String,

        /// Role name used in the generated username
        #[arg(long, default_value = "cli")]
        role_name: String,

        /// Creation statement template (repeatable)
        #[arg(short, long = "statement", required = true)]
        statements: Vec<String>,

        /// Password for the new user
        #[arg(long, env = "CREDPLANE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Rotate the password of an existing user
    Rotate {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// User to rotate
        #[arg(short, long)]
        username: String,

        /// Rotation statement template (repeatable, defaults to the backend's)
        #[arg(short, long = "statement")]
        statements: Vec<String>,

        /// New password
        #[arg(long, env = "CREDPLANE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Revoke an existing user
    Revoke {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// User to revoke
        #[arg(short, long)]
        username: String,

        /// Revocation statement template (repeatable, defaults to the backend's)
        #[arg(short, long = "statement")]
        statements: Vec<String>,
    },
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    load_dotenv();
    let cli = Cli::parse();

    let mut settings = PluginSettings::from_env().context("Failed to load settings")?;
    if cli.verbose {
        settings.logging.log_level = "debug".to_string();
    }
    if let Some(timeout) = cli.timeout {
        settings.operation_timeout_seconds = timeout;
        settings.validate().context("Invalid --timeout")?;
    }

    init_logging(&settings.logging);
    describe_metrics();

    let plugin = DatabasePlugin::with_settings(InfluxdbConnector, settings);
    let ctx = OperationContext::new();

    let result = run_command(&plugin, &ctx, cli.command, cli.output).await;
    plugin.close(&ctx).await?;
    result
}

async fn run_command(
    plugin: &DatabasePlugin<InfluxdbConnector>,
    ctx: &OperationContext,
    command: Commands,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match command {
        Commands::Check { connection, offline } => {
            handle_check(plugin, ctx, &connection, offline, format).await
        }
        Commands::CreateUser { connection, display_name, role_name, statements, password } => {
            let password = config::resolve_password(password)?;
            initialize(plugin, ctx, &connection).await?;
            let request = NewUserRequest {
                username_config: UsernameMetadata::new(display_name, role_name),
                statements: Statements::new(statements),
                password: SecretString::new(password),
                expiration: None,
            };
            let response = plugin.new_user(ctx, request).await.context("Failed to create user")?;
            output::print_output(&response, format)
        }
        Commands::Rotate { connection, username, statements, password } => {
            let password = config::resolve_password(password)?;
            initialize(plugin, ctx, &connection).await?;
            let request = UpdateUserRequest::new(username.clone())
                .with_password(SecretString::new(password), Statements::new(statements));
            plugin.update_user(ctx, request).await.context("Failed to rotate password")?;
            output::print_output(&json!({ "username": username, "rotated": true }), format)
        }
        Commands::Revoke { connection, username, statements } => {
            initialize(plugin, ctx, &connection).await?;
            let request = DeleteUserRequest {
                username: username.clone(),
                statements: Statements::new(statements),
            };
            plugin.delete_user(ctx, request).await.context("Failed to revoke user")?;
            output::print_output(&json!({ "username": username, "revoked": true }), format)
        }
    }
}

async fn initialize(
    plugin: &DatabasePlugin<InfluxdbConnector>,
    ctx: &OperationContext,
    connection: &ConnectionArgs,
) -> anyhow::Result<()> {
    let raw = config::load_connection_file(&connection.config)?;
    plugin
        .initialize(ctx, InitializeRequest::new(raw).verified())
        .await
        .with_context(|| format!("Failed to initialize from {}", connection.config.display()))?;
    Ok(())
}

async fn handle_check(
    plugin: &DatabasePlugin<InfluxdbConnector>,
    ctx: &OperationContext,
    connection: &ConnectionArgs,
    offline: bool,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let raw = config::load_connection_file(&connection.config)?;
    let normalized = normalize(&raw).context("Invalid connection config")?;

    if !offline {
        plugin
            .initialize(ctx, InitializeRequest::new(raw).verified())
            .await
            .context("Connectivity check failed")?;
    }

    output::print_output(
        &json!({
            "backend": plugin.type_name(),
            "verified": !offline,
            "config": normalized.to_redacted_map(),
        }),
        format,
    )
}

fn load_dotenv() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }
}
