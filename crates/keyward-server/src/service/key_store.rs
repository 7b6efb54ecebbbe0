//! PostgreSQL-backed key repository.

use async_trait::async_trait;
use jiff::Timestamp;
use keyward_core::protection::KeyRecord;
use keyward_core::storage::KeyRepository;
use keyward_core::{ProtectionError, Result};
use keyward_postgres::model::{NewProtectionKey, ProtectionKey};
use keyward_postgres::query::ProtectionKeyRepository;
use keyward_postgres::{PgClient, PgConn, PgError};
use uuid::Uuid;

/// Tracing target for the PostgreSQL key repository.
const TRACING_TARGET: &str = "keyward_server::service::key_store";

/// Stores protection keys in the `protection_keys` table.
#[derive(Clone)]
pub struct PostgresKeyRepository {
    pg_client: PgClient,
}

impl PostgresKeyRepository {
    /// Creates a repository on top of an existing connection pool.
    pub fn new(pg_client: PgClient) -> Self {
        Self { pg_client }
    }

    async fn connection(&self) -> Result<PgConn> {
        self.pg_client
            .get_connection()
            .await
            .map_err(|e| map_pg_error("Failed to acquire a database connection", e))
    }
}

impl std::fmt::Debug for PostgresKeyRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresKeyRepository")
            .field("pg_client", &self.pg_client)
            .finish()
    }
}

#[async_trait]
impl KeyRepository for PostgresKeyRepository {
    async fn load_keys(&self, application_name: &str) -> Result<Vec<KeyRecord>> {
        let mut conn = self.connection().await?;
        let rows = conn
            .list_protection_keys(application_name)
            .await
            .map_err(|e| map_pg_error("Failed to load protection keys", e))?;

        tracing::debug!(
            target: TRACING_TARGET,
            application = application_name,
            count = rows.len(),
            "Loaded protection keys"
        );

        Ok(rows.into_iter().map(into_record).collect())
    }

    async fn store_key(&self, record: &KeyRecord) -> Result<()> {
        let mut conn = self.connection().await?;
        conn.create_protection_key(from_record(record))
            .await
            .map_err(|e| map_pg_error("Failed to store protection key", e))?;
        Ok(())
    }

    async fn revoke_key(
        &self,
        application_name: &str,
        key_id: Uuid,
        revoked_at: Timestamp,
    ) -> Result<bool> {
        let mut conn = self.connection().await?;
        conn.revoke_protection_key(application_name, key_id, revoked_at)
            .await
            .map_err(|e| map_pg_error("Failed to revoke protection key", e))
    }
}

fn map_pg_error(message: &'static str, error: PgError) -> ProtectionError {
    tracing::error!(
        target: TRACING_TARGET,
        error = %error,
        transient = error.is_transient(),
        hint = error.hint().unwrap_or_default(),
        "{message}"
    );
    ProtectionError::key_store(message).with_source(error)
}

fn from_record(record: &KeyRecord) -> NewProtectionKey {
    NewProtectionKey {
        key_id: record.key_id,
        application_name: record.application_name.clone(),
        key_material: record.material.clone(),
        material_encrypted: record.material_encrypted,
        created_at: record.created_at.into(),
        activated_at: record.activated_at.into(),
        expires_at: record.expires_at.into(),
    }
}

fn into_record(row: ProtectionKey) -> KeyRecord {
    KeyRecord {
        key_id: row.key_id,
        application_name: row.application_name,
        created_at: row.created_at.into(),
        activated_at: row.activated_at.into(),
        expires_at: row.expires_at.into(),
        revoked_at: row.revoked_at.map(Into::into),
        material: row.key_material,
        material_encrypted: row.material_encrypted,
    }
}
