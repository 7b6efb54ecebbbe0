//! Key-encryption key loading.
//!
//! The key-encryption key (KEK) seals protection key material before it is
//! handed to a key repository. It is read once at startup from a file that
//! holds exactly 32 raw bytes.

use std::path::Path;

use keyward_core::crypto::EncryptionKey;

use crate::{Error, Result};

/// Tracing target for key-encryption key operations.
const TRACING_TARGET: &str = "keyward_server::service::key_encryption";

/// Loads the key-encryption key from `path`.
///
/// # Errors
///
/// Returns a config error if the path is missing or not a regular file or
/// the key has the wrong length, and a file-system error if it cannot be
/// read.
pub async fn load_key_encryption_key(path: &Path) -> Result<EncryptionKey> {
    validate_path(path)?;

    tracing::debug!(
        target: TRACING_TARGET,
        path = %path.display(),
        "Loading key-encryption key",
    );

    let bytes = tokio::fs::read(path).await.map_err(|e| {
        tracing::error!(
            target: TRACING_TARGET,
            path = %path.display(),
            error = %e,
            "Failed to read key-encryption key file",
        );
        Error::file_system("Failed to read key-encryption key file").with_source(e)
    })?;

    let key = EncryptionKey::from_bytes(&bytes).map_err(|e| {
        tracing::error!(
            target: TRACING_TARGET,
            path = %path.display(),
            len = bytes.len(),
            "Invalid key-encryption key: expected exactly 32 bytes",
        );
        Error::config("Invalid key-encryption key").with_source(e)
    })?;

    tracing::info!(
        target: TRACING_TARGET,
        path = %path.display(),
        "Key-encryption key loaded",
    );

    Ok(key)
}

fn validate_path(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(Error::config("Key-encryption key file does not exist"));
    }

    if !path.is_file() {
        return Err(Error::config("Key-encryption key path is not a file"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::ErrorKind;

    #[tokio::test]
    async fn loads_32_byte_key() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(&[7u8; 32])?;

        let key = load_key_encryption_key(file.path()).await?;
        assert_eq!(key.as_bytes(), &[7u8; 32]);
        Ok(())
    }

    #[tokio::test]
    async fn rejects_wrong_length() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(&[7u8; 16])?;

        let error = load_key_encryption_key(file.path()).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Config);
        Ok(())
    }

    #[tokio::test]
    async fn rejects_missing_file_and_directory() -> anyhow::Result<()> {
        let directory = tempfile::tempdir()?;

        let error = load_key_encryption_key(&directory.path().join("missing.key"))
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Config);

        let error = load_key_encryption_key(directory.path()).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Config);
        Ok(())
    }
}
