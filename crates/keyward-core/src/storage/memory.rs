//! Process-local key storage.

use std::collections::HashMap;

use async_trait::async_trait;
use jiff::Timestamp;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::KeyRepository;
use crate::Result;
use crate::protection::KeyRecord;

/// Keeps keys in memory. Everything is lost when the process exits, so
/// payloads do not survive restarts.
#[derive(Debug, Default)]
pub struct MemoryKeyRepository {
    records: RwLock<HashMap<Uuid, KeyRecord>>,
}

impl MemoryKeyRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored keys across all applications.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Returns `true` if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl KeyRepository for MemoryKeyRepository {
    async fn load_keys(&self, application_name: &str) -> Result<Vec<KeyRecord>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|record| record.application_name == application_name)
            .cloned()
            .collect())
    }

    async fn store_key(&self, record: &KeyRecord) -> Result<()> {
        let mut records = self.records.write().await;
        records.insert(record.key_id, record.clone());
        Ok(())
    }

    async fn revoke_key(
        &self,
        application_name: &str,
        key_id: Uuid,
        revoked_at: Timestamp,
    ) -> Result<bool> {
        let mut records = self.records.write().await;
        match records.get_mut(&key_id) {
            Some(record) if record.application_name == application_name => {
                record.revoked_at.get_or_insert(revoked_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
