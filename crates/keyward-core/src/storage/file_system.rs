//! Directory-backed key storage.
//!
//! Each key lives in its own `key-{uuid}.json` document. Writes go to a
//! temporary file first and are then renamed into place, so readers never
//! observe a half-written key.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use jiff::Timestamp;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::KeyRepository;
use crate::protection::KeyRecord;
use crate::{ProtectionError, Result, TRACING_TARGET_STORAGE};

const FILE_PREFIX: &str = "key-";
const FILE_EXTENSION: &str = "json";

/// Key files are readable by the owner only.
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Stores keys as JSON documents inside a directory.
#[derive(Debug, Clone)]
pub struct FileSystemKeyRepository {
    directory: PathBuf,
}

impl FileSystemKeyRepository {
    /// Creates a repository rooted at `directory`.
    ///
    /// The directory is created on the first write.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Creates a repository in [`default_directory`](Self::default_directory).
    pub fn with_default_directory() -> Result<Self> {
        Self::default_directory().map(Self::new).ok_or_else(|| {
            ProtectionError::key_store("no local data directory is available for key storage")
        })
    }

    /// The per-user location keys are stored in when nothing else is configured:
    /// `<local data dir>/keyward/keys`.
    pub fn default_directory() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| dir.join("keyward").join("keys"))
    }

    /// Returns the storage directory.
    #[inline]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn key_path(&self, key_id: Uuid) -> PathBuf {
        self.directory
            .join(format!("{FILE_PREFIX}{key_id}.{FILE_EXTENSION}"))
    }

    fn is_key_file(path: &Path) -> bool {
        let has_prefix = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(FILE_PREFIX));
        has_prefix && path.extension().is_some_and(|ext| ext == FILE_EXTENSION)
    }

    async fn read_record(path: &Path) -> Result<Option<KeyRecord>> {
        let contents = match fs::read(path).await {
            Ok(contents) => contents,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(ProtectionError::key_store(format!(
                    "failed to read key file {}",
                    path.display()
                ))
                .with_source(error));
            }
        };

        match serde_json::from_slice(&contents) {
            Ok(record) => Ok(Some(record)),
            Err(error) => {
                tracing::warn!(
                    target: TRACING_TARGET_STORAGE,
                    path = %path.display(),
                    error = %error,
                    "Ignoring malformed key file"
                );
                Ok(None)
            }
        }
    }

    async fn write_record(&self, record: &KeyRecord) -> Result<()> {
        fs::create_dir_all(&self.directory).await.map_err(|error| {
            ProtectionError::key_store(format!(
                "failed to create key directory {}",
                self.directory.display()
            ))
            .with_source(error)
        })?;

        let contents = serde_json::to_vec_pretty(record).map_err(|error| {
            ProtectionError::key_store("failed to serialize key record").with_source(error)
        })?;

        let path = self.key_path(record.key_id);
        let staging = path.with_extension("tmp");

        write_private(&staging, &contents).await.map_err(|error| {
            ProtectionError::key_store(format!("failed to write key file {}", staging.display()))
                .with_source(error)
        })?;
        fs::rename(&staging, &path).await.map_err(|error| {
            ProtectionError::key_store(format!("failed to move key file into {}", path.display()))
                .with_source(error)
        })?;

        tracing::debug!(
            target: TRACING_TARGET_STORAGE,
            key_id = %record.key_id,
            path = %path.display(),
            "Key file written"
        );

        Ok(())
    }
}

/// Writes `contents` to a freshly created file only its owner can read.
async fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    // A leftover staging file would keep its old permissions.
    match fs::remove_file(path).await {
        Err(error) if error.kind() != ErrorKind::NotFound => return Err(error),
        _ => {}
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(FILE_MODE);

    let mut file = options.open(path).await?;
    file.write_all(contents).await?;
    file.sync_all().await
}

#[async_trait]
impl KeyRepository for FileSystemKeyRepository {
    async fn load_keys(&self, application_name: &str) -> Result<Vec<KeyRecord>> {
        let mut entries = match fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => {
                return Err(ProtectionError::key_store(format!(
                    "failed to list key directory {}",
                    self.directory.display()
                ))
                .with_source(error));
            }
        };

        let mut records = Vec::new();
        loop {
            let entry = entries.next_entry().await.map_err(|error| {
                ProtectionError::key_store("failed to list key directory").with_source(error)
            })?;
            let Some(entry) = entry else {
                break;
            };

            let path = entry.path();
            if !Self::is_key_file(&path) {
                continue;
            }

            if let Some(record) = Self::read_record(&path).await?
                && record.application_name == application_name
            {
                records.push(record);
            }
        }

        tracing::debug!(
            target: TRACING_TARGET_STORAGE,
            directory = %self.directory.display(),
            count = records.len(),
            "Key files loaded"
        );

        Ok(records)
    }

    async fn store_key(&self, record: &KeyRecord) -> Result<()> {
        self.write_record(record).await
    }

    async fn revoke_key(
        &self,
        application_name: &str,
        key_id: Uuid,
        revoked_at: Timestamp,
    ) -> Result<bool> {
        let path = self.key_path(key_id);
        let Some(mut record) = Self::read_record(&path).await? else {
            return Ok(false);
        };

        if record.application_name != application_name {
            return Ok(false);
        }
        if record.is_revoked() {
            return Ok(true);
        }

        record.revoked_at = Some(revoked_at);
        self.write_record(&record).await?;
        Ok(true)
    }
}
