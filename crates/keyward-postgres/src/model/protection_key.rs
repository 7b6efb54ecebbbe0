//! Protection key model for PostgreSQL database operations.

use diesel::prelude::*;
use jiff_diesel::Timestamp;
use uuid::Uuid;

use crate::schema::protection_keys;

/// A stored protection key.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = protection_keys)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProtectionKey {
    /// Unique key identifier.
    pub key_id: Uuid,
    /// Application namespace the key belongs to.
    pub application_name: String,
    /// Base64 key material, possibly sealed.
    pub key_material: String,
    /// Whether the material is sealed with a key-encryption key.
    pub material_encrypted: bool,
    /// Timestamp of row creation.
    pub created_at: Timestamp,
    /// Timestamp from which the key protects new payloads.
    pub activated_at: Timestamp,
    /// Timestamp after which the key no longer protects new payloads.
    pub expires_at: Timestamp,
    /// Timestamp of revocation.
    pub revoked_at: Option<Timestamp>,
}

/// Data for inserting a protection key.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = protection_keys)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewProtectionKey {
    /// Unique key identifier.
    pub key_id: Uuid,
    /// Application namespace the key belongs to.
    pub application_name: String,
    /// Base64 key material, possibly sealed.
    pub key_material: String,
    /// Whether the material is sealed with a key-encryption key.
    pub material_encrypted: bool,
    /// Timestamp of creation.
    pub created_at: Timestamp,
    /// Timestamp from which the key protects new payloads.
    pub activated_at: Timestamp,
    /// Timestamp after which the key no longer protects new payloads.
    pub expires_at: Timestamp,
}
