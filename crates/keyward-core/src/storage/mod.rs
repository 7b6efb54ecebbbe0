//! Persistence for protection keys.
//!
//! A [`KeyRepository`] stores [`KeyRecord`]s grouped by application name.
//! Repositories are plain storage: they never decide which key is active,
//! that is the job of the [`KeyManager`](crate::protection::KeyManager).

use async_trait::async_trait;
use jiff::Timestamp;
use uuid::Uuid;

use crate::Result;
use crate::protection::KeyRecord;

mod file_system;
mod memory;

pub use file_system::FileSystemKeyRepository;
pub use memory::MemoryKeyRepository;

/// Storage backend for protection keys.
#[async_trait]
pub trait KeyRepository: Send + Sync + 'static {
    /// Returns every key of `application_name`, revoked ones included.
    async fn load_keys(&self, application_name: &str) -> Result<Vec<KeyRecord>>;

    /// Persists a newly created key.
    async fn store_key(&self, record: &KeyRecord) -> Result<()>;

    /// Marks a key revoked.
    ///
    /// Returns `false` if no such key exists for `application_name`. A key
    /// that is already revoked keeps its original revocation time.
    async fn revoke_key(
        &self,
        application_name: &str,
        key_id: Uuid,
        revoked_at: Timestamp,
    ) -> Result<bool>;
}
