use std::future::IntoFuture;

use axum::Router;
use tokio::net::TcpListener;

use crate::TRACING_TARGET_SERVER_STARTUP;
use crate::config::ServerConfig;
use crate::server::lifecycle::serve_with_shutdown;
use crate::server::{ServerError, ServerResult, shutdown_signal};

/// Serves `app` over plain HTTP.
pub async fn serve_http(app: Router, config: ServerConfig) -> ServerResult<()> {
    let addr = config.server_addr();
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|err| ServerError::bind(addr, err))?;

    tracing::info!(target: TRACING_TARGET_SERVER_STARTUP, %addr, "listening for http");

    let grace_period = config.shutdown_timeout();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal(grace_period).await;
    });

    serve_with_shutdown(&config, server.into_future())
        .await
        .map_err(ServerError::Runtime)
}
