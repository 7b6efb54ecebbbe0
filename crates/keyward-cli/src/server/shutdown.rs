use std::time::Duration;

use crate::TRACING_TARGET_SERVER_SHUTDOWN;

/// Process signal that stopped the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Interrupt,
    Terminate,
}

impl Signal {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
        }
    }
}

async fn interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(target: TRACING_TARGET_SERVER_SHUTDOWN, error = %e, "cannot listen for SIGINT");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            tracing::error!(target: TRACING_TARGET_SERVER_SHUTDOWN, error = %e, "cannot listen for SIGTERM");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

/// Resolves on the first SIGINT or SIGTERM.
///
/// A signal whose handler cannot be installed never fires, so the other
/// one still stops the server.
pub async fn shutdown_signal(grace_period: Duration) -> Signal {
    let signal = tokio::select! {
        () = interrupt() => Signal::Interrupt,
        () = terminate() => Signal::Terminate,
    };

    tracing::info!(
        target: TRACING_TARGET_SERVER_SHUTDOWN,
        signal = signal.as_str(),
        grace_period_secs = grace_period.as_secs(),
        "draining connections"
    );
    signal
}
