use std::path::{Path, PathBuf};

use axum::Router;
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;

use crate::TRACING_TARGET_SERVER_STARTUP;
use crate::config::ServerConfig;
use crate::server::lifecycle::serve_with_shutdown;
use crate::server::{ServerError, ServerResult, shutdown_signal};

/// Serves `app` over HTTPS with a PEM certificate chain and key.
pub async fn serve_https(
    app: Router,
    config: ServerConfig,
    cert_path: PathBuf,
    key_path: PathBuf,
) -> ServerResult<()> {
    ensure_pem_file(&cert_path)?;
    ensure_pem_file(&key_path)?;

    let tls = RustlsConfig::from_pem_file(&cert_path, &key_path)
        .await
        .map_err(|err| ServerError::TlsCertificate(format!("cannot load tls files: {err}")))?;

    let addr = config.server_addr();
    let grace_period = config.shutdown_timeout();
    let handle = Handle::new();

    tokio::spawn({
        let handle = handle.clone();
        async move {
            shutdown_signal(grace_period).await;
            handle.graceful_shutdown(Some(grace_period));
        }
    });

    tracing::info!(
        target: TRACING_TARGET_SERVER_STARTUP,
        %addr,
        cert = %cert_path.display(),
        "listening for https"
    );

    let server = axum_server::bind_rustls(addr, tls)
        .handle(handle)
        .serve(app.into_make_service());

    serve_with_shutdown(&config, server)
        .await
        .map_err(ServerError::Runtime)
}

/// Rejects paths that are missing, not regular files or empty.
fn ensure_pem_file(path: &Path) -> ServerResult<()> {
    let invalid = |reason: String| {
        ServerError::TlsCertificate(format!("{}: {reason}", path.display()))
    };

    let metadata = std::fs::metadata(path).map_err(|err| invalid(err.to_string()))?;
    if !metadata.is_file() {
        return Err(invalid("not a regular file".to_owned()));
    }
    if metadata.len() == 0 {
        return Err(invalid("file is empty".to_owned()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_rejected() {
        let result = ensure_pem_file(Path::new("does-not-exist.pem"));
        assert!(matches!(result, Err(ServerError::TlsCertificate(_))));
    }

    #[test]
    fn empty_file_is_rejected() -> anyhow::Result<()> {
        let empty = tempfile::NamedTempFile::new()?;
        let result = ensure_pem_file(empty.path());
        assert!(matches!(result, Err(ServerError::TlsCertificate(msg)) if msg.ends_with("file is empty")));
        Ok(())
    }

    #[test]
    fn directory_is_rejected() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let result = ensure_pem_file(dir.path());
        assert!(matches!(result, Err(ServerError::TlsCertificate(msg)) if msg.ends_with("not a regular file")));
        Ok(())
    }
}
