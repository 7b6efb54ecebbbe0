//! Protection key repository.

use std::future::Future;

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use jiff::Timestamp;
use uuid::Uuid;

use crate::model::{NewProtectionKey, ProtectionKey};
use crate::{PgConnection, PgError, PgResult, TRACING_TARGET_QUERY, schema};

/// Repository for protection key database operations.
pub trait ProtectionKeyRepository {
    /// Inserts a new protection key.
    fn create_protection_key(
        &mut self,
        new_key: NewProtectionKey,
    ) -> impl Future<Output = PgResult<ProtectionKey>> + Send;

    /// Lists every key of an application, newest activation first.
    fn list_protection_keys(
        &mut self,
        application_name: &str,
    ) -> impl Future<Output = PgResult<Vec<ProtectionKey>>> + Send;

    /// Sets `revoked_at` on a key that is not revoked yet.
    ///
    /// Returns `true` if the key exists for the application, whether it was
    /// revoked by this call or earlier.
    fn revoke_protection_key(
        &mut self,
        application_name: &str,
        key_id: Uuid,
        revoked_at: Timestamp,
    ) -> impl Future<Output = PgResult<bool>> + Send;
}

impl ProtectionKeyRepository for PgConnection {
    async fn create_protection_key(&mut self, new_key: NewProtectionKey) -> PgResult<ProtectionKey> {
        use schema::protection_keys;

        let key = diesel::insert_into(protection_keys::table)
            .values(&new_key)
            .returning(ProtectionKey::as_returning())
            .get_result(self)
            .await
            .map_err(PgError::from)?;

        tracing::debug!(
            target: TRACING_TARGET_QUERY,
            key_id = %key.key_id,
            "Protection key inserted"
        );

        Ok(key)
    }

    async fn list_protection_keys(&mut self, application_name: &str) -> PgResult<Vec<ProtectionKey>> {
        use schema::protection_keys::{self, dsl};

        protection_keys::table
            .filter(dsl::application_name.eq(application_name))
            .order(dsl::activated_at.desc())
            .select(ProtectionKey::as_select())
            .load(self)
            .await
            .map_err(PgError::from)
    }

    async fn revoke_protection_key(
        &mut self,
        application_name: &str,
        key_id: Uuid,
        revoked_at: Timestamp,
    ) -> PgResult<bool> {
        use schema::protection_keys::{self, dsl};

        let scoped = protection_keys::table
            .filter(dsl::key_id.eq(key_id))
            .filter(dsl::application_name.eq(application_name));

        diesel::update(scoped.clone().filter(dsl::revoked_at.is_null()))
            .set(dsl::revoked_at.eq(Some(jiff_diesel::Timestamp::from(revoked_at))))
            .execute(self)
            .await
            .map_err(PgError::from)?;

        let exists = diesel::select(diesel::dsl::exists(scoped))
            .get_result::<bool>(self)
            .await
            .map_err(PgError::from)?;

        Ok(exists)
    }
}
