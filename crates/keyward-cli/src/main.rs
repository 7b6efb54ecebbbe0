#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod config;
mod server;

use std::process;

use anyhow::Context;
use axum::Router;
use keyward_server::handler::routes;
use keyward_server::middleware::{
    RouterObservabilityExt, RouterOpenApiExt, RouterRecoveryExt, RouterSecurityExt,
    SecurityHeadersConfig,
};
use keyward_server::service::ServiceState;

use crate::config::{Cli, MiddlewareConfig};

// Tracing target constants
pub const TRACING_TARGET_SERVER_STARTUP: &str = "keyward_cli::server::startup";
pub const TRACING_TARGET_SERVER_SHUTDOWN: &str = "keyward_cli::server::shutdown";
pub const TRACING_TARGET_CONFIG: &str = "keyward_cli::config";

#[tokio::main]
async fn main() {
    let Err(error) = run().await else {
        process::exit(0);
    };

    if tracing::enabled!(tracing::Level::ERROR) {
        tracing::error!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            error = format!("{error:#}"),
            "Application terminated with error"
        );
    } else {
        eprintln!("Error: {error:#}");
    }

    process::exit(1);
}

/// Parses configuration, builds the state and serves until shutdown.
async fn run() -> anyhow::Result<()> {
    let cli = Cli::init();
    Cli::init_tracing();

    cli.log();
    cli.validate()?;

    let state = ServiceState::from_config(&cli.service)
        .await
        .context("failed to create service state")?;
    let router = create_router(state, &cli.middleware);

    if let Err(error) = server::serve(router, cli.server).await {
        tracing::error!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            error_code = error.error_code(),
            suggestion = error.suggestion(),
            "Server failed"
        );
        return Err(error).context("server terminated unexpectedly");
    }

    tracing::info!(
        target: TRACING_TARGET_SERVER_SHUTDOWN,
        "Application terminated successfully"
    );

    Ok(())
}

/// Creates the router with all middleware layers applied.
///
/// The last layer added is the outermost one:
/// 1. Recovery: panics and timeouts become 500 responses
/// 2. Observability: request ids and tracing spans
/// 3. Security: CORS, security headers, body limit
/// 4. Routes and the OpenAPI document
fn create_router(state: ServiceState, middleware: &MiddlewareConfig) -> Router {
    routes()
        .with_open_api(&middleware.openapi)
        .with_state(state)
        .with_security(&middleware.cors, &SecurityHeadersConfig::default())
        .with_observability()
        .with_recovery(&middleware.recovery)
}
