use std::future::Future;
use std::io;
use std::time::Instant;

use crate::config::ServerConfig;
use crate::{TRACING_TARGET_SERVER_SHUTDOWN, TRACING_TARGET_SERVER_STARTUP};

/// Awaits a running server and logs its uptime once it stops.
pub async fn serve_with_shutdown<F>(config: &ServerConfig, server: F) -> io::Result<()>
where
    F: Future<Output = io::Result<()>>,
{
    if config.binds_to_all_interfaces() {
        tracing::warn!(
            target: TRACING_TARGET_SERVER_STARTUP,
            host = %config.host,
            "listening on every interface"
        );
    }

    let started = Instant::now();
    let outcome = server.await;
    let uptime_secs = started.elapsed().as_secs();

    if let Err(err) = &outcome {
        tracing::error!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            error = %err,
            uptime_secs,
            "server stopped unexpectedly"
        );
    } else {
        tracing::info!(target: TRACING_TARGET_SERVER_SHUTDOWN, uptime_secs, "server stopped");
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_server_outcome() {
        let config = ServerConfig::default();

        assert!(serve_with_shutdown(&config, async { Ok(()) }).await.is_ok());

        let failed = serve_with_shutdown(&config, async {
            Err(io::Error::new(io::ErrorKind::AddrInUse, "port taken"))
        })
        .await;
        assert_eq!(failed.map_err(|e| e.kind()), Err(io::ErrorKind::AddrInUse));
    }
}
