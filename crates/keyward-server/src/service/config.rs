//! Service configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "config")]
use clap::{Args, ValueEnum};
use derive_more::Deref;
use keyward_core::crypto::EncryptionKey;
use keyward_core::protection::KeyManagerOptions;
use keyward_core::storage::{FileSystemKeyRepository, KeyRepository, MemoryKeyRepository};
use keyward_postgres::{MigrationStatus, PgClient, PgClientMigrationExt, PgConfig};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use crate::service::{PostgresKeyRepository, load_key_encryption_key};
use crate::{Error, Result};

/// Tracing target for service configuration.
const TRACING_TARGET: &str = "keyward_server::service::config";

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Default values for configuration options.
mod defaults {
    pub const APPLICATION_NAME: &str = "my-application";
    pub const PROTECTION_PURPOSE: &str = "default";
    pub const PAYLOAD_LIFETIME_SECS: u64 = 60;
    pub const KEY_LIFETIME_DAYS: u64 = 90;
}

/// Where protection keys are persisted.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display,
)]
#[cfg_attr(feature = "config", derive(ValueEnum))]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum KeyStorageKind {
    /// Process memory. Keys, and every payload, are lost on restart.
    Memory,
    /// One JSON document per key in a local directory.
    #[default]
    FileSystem,
    /// The `protection_keys` table in PostgreSQL.
    Postgres,
}

/// Lifetime given to payloads created by `/api/protect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deref)]
pub struct PayloadLifetime(pub Duration);

/// App [`state`] configuration.
///
/// [`state`]: crate::service::ServiceState
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
pub struct ServiceConfig {
    /// Namespace for protection keys. Payloads only unprotect under the
    /// application name they were protected with.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "APPLICATION_NAME", default_value = defaults::APPLICATION_NAME)
    )]
    pub application_name: String,

    /// Purpose the HTTP endpoints protect under.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "PROTECTION_PURPOSE", default_value = defaults::PROTECTION_PURPOSE)
    )]
    pub protection_purpose: String,

    /// Lifetime of payloads created by `/api/protect`, in seconds.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "PAYLOAD_LIFETIME_SECS", default_value_t = defaults::PAYLOAD_LIFETIME_SECS)
    )]
    pub payload_lifetime_secs: u64,

    /// Lifetime of a protection key, in days.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "KEY_LIFETIME_DAYS", default_value_t = defaults::KEY_LIFETIME_DAYS)
    )]
    pub key_lifetime_days: u64,

    /// Key storage backend.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "KEY_STORAGE", value_enum, default_value_t = KeyStorageKind::FileSystem)
    )]
    #[serde(default)]
    pub key_storage: KeyStorageKind,

    /// Directory for `file-system` key storage.
    ///
    /// Defaults to `<local data dir>/keyward/keys`.
    #[cfg_attr(feature = "config", arg(long, env = "KEY_DIRECTORY"))]
    #[serde(default)]
    pub key_directory: Option<PathBuf>,

    /// File holding a 32-byte key-encryption key.
    ///
    /// Without it, key material is stored unencrypted.
    #[cfg_attr(feature = "config", arg(long, env = "KEY_ENCRYPTION_KEY_FILEPATH"))]
    #[serde(default)]
    pub key_encryption_key_filepath: Option<PathBuf>,

    /// PostgreSQL settings, used with `postgres` key storage.
    #[cfg_attr(feature = "config", command(flatten))]
    pub postgres: PgConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            application_name: defaults::APPLICATION_NAME.to_owned(),
            protection_purpose: defaults::PROTECTION_PURPOSE.to_owned(),
            payload_lifetime_secs: defaults::PAYLOAD_LIFETIME_SECS,
            key_lifetime_days: defaults::KEY_LIFETIME_DAYS,
            key_storage: KeyStorageKind::default(),
            key_directory: None,
            key_encryption_key_filepath: None,
            postgres: PgConfig::new(String::new()),
        }
    }
}

impl ServiceConfig {
    /// Sets the key storage backend.
    pub fn with_key_storage(mut self, key_storage: KeyStorageKind) -> Self {
        self.key_storage = key_storage;
        self
    }

    /// Sets the directory for `file-system` key storage.
    pub fn with_key_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.key_directory = Some(directory.into());
        self
    }

    /// Sets the application name.
    pub fn with_application_name(mut self, application_name: impl Into<String>) -> Self {
        self.application_name = application_name.into();
        self
    }

    /// Sets the payload lifetime in seconds.
    pub fn with_payload_lifetime_secs(mut self, secs: u64) -> Self {
        self.payload_lifetime_secs = secs;
        self
    }

    /// Sets the key-encryption key file.
    pub fn with_key_encryption_key_filepath(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_encryption_key_filepath = Some(path.into());
        self
    }

    /// Validates all configuration values.
    ///
    /// # Errors
    ///
    /// Returns a config error for empty names, zero lifetimes, a payload
    /// lifetime longer than the key lifetime, or an invalid PostgreSQL
    /// configuration when PostgreSQL storage is selected.
    pub fn validate(&self) -> Result<()> {
        if self.application_name.trim().is_empty() {
            return Err(Error::config("application name cannot be empty"));
        }

        if self.protection_purpose.trim().is_empty() {
            return Err(Error::config("protection purpose cannot be empty"));
        }

        if self.payload_lifetime_secs == 0 {
            return Err(Error::config("payload lifetime must be at least one second"));
        }

        if self.key_lifetime_days == 0 {
            return Err(Error::config("key lifetime must be at least one day"));
        }

        if *self.payload_lifetime() > self.key_lifetime() {
            return Err(Error::config("payload lifetime cannot exceed the key lifetime"));
        }

        if self.key_storage == KeyStorageKind::Postgres {
            self.postgres.validate().map_err(|e| {
                Error::config("invalid PostgreSQL configuration").with_source(e)
            })?;
        }

        Ok(())
    }

    /// Returns the payload lifetime.
    #[inline]
    pub fn payload_lifetime(&self) -> PayloadLifetime {
        PayloadLifetime(Duration::from_secs(self.payload_lifetime_secs))
    }

    /// Returns the key lifetime.
    #[inline]
    pub fn key_lifetime(&self) -> Duration {
        Duration::from_secs(self.key_lifetime_days.saturating_mul(SECONDS_PER_DAY))
    }

    /// Returns the options for the [`KeyManager`].
    ///
    /// [`KeyManager`]: keyward_core::protection::KeyManager
    pub fn key_manager_options(&self) -> KeyManagerOptions {
        KeyManagerOptions::new(&self.application_name).with_key_lifetime(self.key_lifetime())
    }

    /// Loads the key-encryption key, if one is configured.
    pub async fn load_key_encryption_key(&self) -> Result<Option<EncryptionKey>> {
        match self.key_encryption_key_filepath.as_deref() {
            Some(path) => load_key_encryption_key(path).await.map(Some),
            None => Ok(None),
        }
    }

    /// Opens the configured key repository.
    ///
    /// For PostgreSQL this connects, verifies connectivity and applies
    /// pending migrations.
    pub async fn open_key_repository(&self) -> Result<Arc<dyn KeyRepository>> {
        tracing::info!(
            target: TRACING_TARGET,
            key_storage = %self.key_storage,
            "Opening key repository"
        );

        let repository: Arc<dyn KeyRepository> = match self.key_storage {
            KeyStorageKind::Memory => {
                tracing::warn!(
                    target: TRACING_TARGET,
                    "Keys are kept in memory, protected payloads will not survive a restart"
                );
                Arc::new(MemoryKeyRepository::new())
            }
            KeyStorageKind::FileSystem => {
                let repository = match &self.key_directory {
                    Some(directory) => FileSystemKeyRepository::new(directory),
                    None => FileSystemKeyRepository::with_default_directory()?,
                };

                tracing::info!(
                    target: TRACING_TARGET,
                    directory = %repository.directory().display(),
                    "Using file-system key storage"
                );
                Arc::new(repository)
            }
            KeyStorageKind::Postgres => {
                let client = self.connect_postgres().await?;
                Arc::new(PostgresKeyRepository::new(client))
            }
        };

        Ok(repository)
    }

    /// Connects to PostgreSQL and applies pending migrations.
    pub async fn connect_postgres(&self) -> Result<PgClient> {
        self.postgres
            .validate()
            .map_err(|e| Error::config("invalid PostgreSQL configuration").with_source(e))?;

        let pg_client = PgClient::new_with_test(self.postgres.clone())
            .await
            .map_err(|e| Error::key_store("Failed to connect to PostgreSQL").with_source(e))?;

        let result = pg_client.run_pending_migrations().await.map_err(|e| {
            Error::key_store("Failed to apply database migrations").with_source(e)
        })?;

        pg_client
            .verify_schema_integrity()
            .await
            .map_err(|e| Error::key_store("Database schema is not initialized").with_source(e))?;
        let status = pg_client
            .get_migration_status()
            .await
            .map_err(|e| Error::key_store("Failed to read migration status").with_source(e))?;
        ensure_up_to_date(&status)?;

        tracing::info!(
            target: TRACING_TARGET,
            applied = result.processed_versions.len(),
            schema_version = status.last_applied_version().unwrap_or_default(),
            duration_ms = result.duration.as_millis() as u64,
            "PostgreSQL key storage ready"
        );

        Ok(pg_client)
    }
}

/// Fails when embedded migrations are still missing from the database.
fn ensure_up_to_date(status: &MigrationStatus) -> Result<()> {
    match status.next_pending_version() {
        None => Ok(()),
        Some(version) => Err(Error::key_store(format!(
            "{} database migrations still pending, starting at {version}",
            status.pending_migrations()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn defaults_are_valid() {
        let config = ServiceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.key_storage, KeyStorageKind::FileSystem);
        assert_eq!(*config.payload_lifetime(), Duration::from_secs(60));
        assert_eq!(config.key_lifetime(), Duration::from_secs(90 * SECONDS_PER_DAY));
    }

    #[test]
    fn rejects_invalid_lifetimes() {
        let config = ServiceConfig::default().with_payload_lifetime_secs(0);
        assert!(config.validate().is_err());

        let config = ServiceConfig::default().with_payload_lifetime_secs(91 * SECONDS_PER_DAY);
        let error = config.validate().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Config);
        assert!(error.message().contains("exceed the key lifetime"));

        let config = ServiceConfig::default().with_payload_lifetime_secs(90 * SECONDS_PER_DAY);
        assert!(config.validate().is_ok());

        let mut config = ServiceConfig::default();
        config.key_lifetime_days = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_names() {
        let config = ServiceConfig::default().with_application_name("  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn postgres_storage_requires_url() {
        let config = ServiceConfig::default().with_key_storage(KeyStorageKind::Postgres);
        assert!(config.validate().is_err());
    }

    #[test]
    fn storage_kind_names() {
        assert_eq!(KeyStorageKind::FileSystem.to_string(), "file-system");
        assert_eq!(KeyStorageKind::Memory.as_ref(), "memory");
        assert_eq!(KeyStorageKind::Postgres.as_ref(), "postgres");
    }

    #[test]
    fn pending_migrations_block_startup() {
        let applied = vec!["20240101000000".to_owned()];
        assert!(ensure_up_to_date(&MigrationStatus::new(applied.clone(), Vec::new())).is_ok());

        let status = MigrationStatus::new(applied, vec!["20250101000000".to_owned()]);
        let error = ensure_up_to_date(&status).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::KeyStore);
        assert!(error.message().contains("20250101000000"));
    }

    #[tokio::test]
    async fn opens_file_system_repository() -> anyhow::Result<()> {
        let directory = tempfile::tempdir()?;
        let config = ServiceConfig::default().with_key_directory(directory.path());

        let repository = config.open_key_repository().await?;
        assert!(repository.load_keys("my-application").await?.is_empty());
        Ok(())
    }
}
