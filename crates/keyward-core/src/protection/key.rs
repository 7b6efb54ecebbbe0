//! Persisted protection key records.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::{self, EncryptionKey};
use crate::{ProtectionError, Result};

/// A protection key as stored by a [`KeyRepository`].
///
/// The key material is base64 encoded. When a key-encryption key is
/// configured the material is sealed with it first, using the key id as
/// associated data so records cannot be swapped.
///
/// [`KeyRepository`]: crate::storage::KeyRepository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRecord {
    /// Unique key identifier, embedded in every payload it protects.
    pub key_id: Uuid,
    /// The application namespace the key belongs to.
    pub application_name: String,
    /// When the record was created.
    pub created_at: Timestamp,
    /// When the key may start protecting new payloads.
    pub activated_at: Timestamp,
    /// When the key stops protecting new payloads.
    pub expires_at: Timestamp,
    /// When the key was revoked, if ever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<Timestamp>,
    /// Base64 key material, sealed if `material_encrypted` is set.
    pub material: String,
    /// Whether `material` is sealed under a key-encryption key.
    #[serde(default)]
    pub material_encrypted: bool,
}

impl KeyRecord {
    /// Builds a record for `key`, sealing the material when `kek` is given.
    pub fn new(
        application_name: impl Into<String>,
        key: &EncryptionKey,
        kek: Option<&EncryptionKey>,
        activated_at: Timestamp,
        expires_at: Timestamp,
    ) -> Result<Self> {
        let key_id = Uuid::now_v7();

        let (material, material_encrypted) = match kek {
            Some(kek) => {
                let sealed = crypto::seal_with_aad(kek, key.as_bytes(), key_id.as_bytes())?;
                (STANDARD.encode(sealed), true)
            }
            None => (STANDARD.encode(key.as_bytes()), false),
        };

        Ok(Self {
            key_id,
            application_name: application_name.into(),
            created_at: Timestamp::now(),
            activated_at,
            expires_at,
            revoked_at: None,
            material,
            material_encrypted,
        })
    }

    /// Recovers the key material.
    ///
    /// # Errors
    ///
    /// Returns [`ProtectionError::KeyMaterial`] if the material is not valid
    /// base64, is sealed and no (or the wrong) `kek` is given, or has the
    /// wrong length.
    pub fn open(&self, kek: Option<&EncryptionKey>) -> Result<EncryptionKey> {
        let decoded = STANDARD
            .decode(&self.material)
            .map_err(|_| ProtectionError::key_material("key material is not valid base64"))?;

        let raw = match (self.material_encrypted, kek) {
            (false, _) => decoded,
            (true, Some(kek)) => crypto::open_with_aad(kek, &decoded, self.key_id.as_bytes())
                .map_err(|_| {
                    ProtectionError::key_material(
                        "key material could not be opened with the key-encryption key",
                    )
                })?,
            (true, None) => {
                return Err(ProtectionError::key_material(
                    "key material is encrypted but no key-encryption key is configured",
                ));
            }
        };

        EncryptionKey::from_bytes(&raw).map_err(ProtectionError::from)
    }

    /// Returns `true` if the key has been revoked.
    #[inline]
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// Returns `true` if the key may protect new payloads at `now`.
    pub fn is_active_at(&self, now: Timestamp) -> bool {
        !self.is_revoked() && self.activated_at <= now && now < self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use jiff::SignedDuration;

    use super::*;

    fn window() -> (Timestamp, Timestamp) {
        let now = Timestamp::now();
        (now, now + SignedDuration::from_hours(90 * 24))
    }

    #[test]
    fn plain_material_roundtrip() -> anyhow::Result<()> {
        let key = EncryptionKey::generate();
        let (activated_at, expires_at) = window();

        let record = KeyRecord::new("app", &key, None, activated_at, expires_at)?;
        assert!(!record.material_encrypted);
        assert_eq!(record.open(None)?.as_bytes(), key.as_bytes());
        Ok(())
    }

    #[test]
    fn sealed_material_requires_kek() -> anyhow::Result<()> {
        let key = EncryptionKey::generate();
        let kek = EncryptionKey::generate();
        let (activated_at, expires_at) = window();

        let record = KeyRecord::new("app", &key, Some(&kek), activated_at, expires_at)?;
        assert!(record.material_encrypted);
        assert_eq!(record.open(Some(&kek))?.as_bytes(), key.as_bytes());

        assert!(matches!(record.open(None), Err(ProtectionError::KeyMaterial(_))));
        let wrong = EncryptionKey::generate();
        assert!(matches!(
            record.open(Some(&wrong)),
            Err(ProtectionError::KeyMaterial(_))
        ));
        Ok(())
    }

    #[test]
    fn sealed_material_is_bound_to_key_id() -> anyhow::Result<()> {
        let kek = EncryptionKey::generate();
        let (activated_at, expires_at) = window();

        let first = KeyRecord::new("app", &EncryptionKey::generate(), Some(&kek), activated_at, expires_at)?;
        let mut second = KeyRecord::new("app", &EncryptionKey::generate(), Some(&kek), activated_at, expires_at)?;
        second.material = first.material.clone();

        assert!(second.open(Some(&kek)).is_err());
        Ok(())
    }

    #[test]
    fn activity_window() -> anyhow::Result<()> {
        let (activated_at, expires_at) = window();
        let mut record = KeyRecord::new("app", &EncryptionKey::generate(), None, activated_at, expires_at)?;

        assert!(record.is_active_at(activated_at));
        assert!(!record.is_active_at(activated_at - SignedDuration::from_secs(1)));
        assert!(!record.is_active_at(expires_at));

        record.revoked_at = Some(Timestamp::now());
        assert!(!record.is_active_at(activated_at));
        Ok(())
    }

    #[test]
    fn serializes_camel_case() -> anyhow::Result<()> {
        let (activated_at, expires_at) = window();
        let record = KeyRecord::new("app", &EncryptionKey::generate(), None, activated_at, expires_at)?;

        let json = serde_json::to_value(&record)?;
        assert!(json.get("keyId").is_some());
        assert!(json.get("revokedAt").is_none());

        let parsed: KeyRecord = serde_json::from_value(json)?;
        assert_eq!(parsed, record);
        Ok(())
    }
}
