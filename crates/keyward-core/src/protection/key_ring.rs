//! In-memory snapshot of an application's protection keys.

use std::collections::HashMap;

use jiff::{SignedDuration, Timestamp};
use uuid::Uuid;

use crate::TRACING_TARGET_KEY_MANAGER;
use crate::crypto::EncryptionKey;
use crate::protection::KeyRecord;

/// A key record together with its opened key material.
#[derive(Debug, Clone)]
pub struct RingKey {
    record: KeyRecord,
    key: EncryptionKey,
}

impl RingKey {
    /// Returns the stored record.
    #[inline]
    pub fn record(&self) -> &KeyRecord {
        &self.record
    }

    /// Returns the master key material.
    #[inline]
    pub fn key(&self) -> &EncryptionKey {
        &self.key
    }

    /// Returns the key identifier.
    #[inline]
    pub fn key_id(&self) -> Uuid {
        self.record.key_id
    }
}

/// Immutable view over all keys of one application.
///
/// Built from the repository contents at a point in time. The default key
/// is the most recently activated key that is active at that time; every
/// unrevoked key can still open payloads it protected.
#[derive(Debug, Clone)]
pub struct KeyRing {
    keys: HashMap<Uuid, RingKey>,
    default_key_id: Option<Uuid>,
    built_at: Timestamp,
    refresh_at: Timestamp,
}

impl KeyRing {
    /// Builds a ring from stored records.
    ///
    /// Records whose material cannot be opened are logged and left out.
    pub fn build(
        records: Vec<KeyRecord>,
        kek: Option<&EncryptionKey>,
        now: Timestamp,
        rotation_window: SignedDuration,
        refresh_interval: SignedDuration,
    ) -> Self {
        let mut keys = HashMap::with_capacity(records.len());
        for record in records {
            match record.open(kek) {
                Ok(key) => {
                    keys.insert(record.key_id, RingKey { record, key });
                }
                Err(error) => {
                    tracing::error!(
                        target: TRACING_TARGET_KEY_MANAGER,
                        key_id = %record.key_id,
                        error = %error,
                        "Skipping protection key with unreadable material"
                    );
                }
            }
        }

        let default_key_id = keys
            .values()
            .filter(|entry| entry.record.is_active_at(now))
            .max_by_key(|entry| (entry.record.activated_at, entry.record.key_id))
            .map(RingKey::key_id);

        let mut ring = Self {
            keys,
            default_key_id,
            built_at: now,
            refresh_at: now,
        };
        ring.refresh_at = ring.next_refresh(now, rotation_window, refresh_interval);
        ring
    }

    /// Returns the key used to protect new payloads.
    pub fn default_key(&self) -> Option<&RingKey> {
        self.default_key_id.and_then(|id| self.keys.get(&id))
    }

    /// Looks up a key by identifier, including revoked keys.
    pub fn get(&self, key_id: &Uuid) -> Option<&RingKey> {
        self.keys.get(key_id)
    }

    /// Number of keys in the ring.
    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if the ring holds no keys.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// When this snapshot was built.
    #[inline]
    pub fn built_at(&self) -> Timestamp {
        self.built_at
    }

    /// When this snapshot should be rebuilt from the repository.
    #[inline]
    pub fn refresh_at(&self) -> Timestamp {
        self.refresh_at
    }

    /// Returns `true` once the refresh deadline has passed.
    #[inline]
    pub fn is_stale(&self, now: Timestamp) -> bool {
        now >= self.refresh_at
    }

    /// Returns `true` if a new key has to be created.
    ///
    /// That is the case when there is no default key, or when the default
    /// key expires within `rotation_window` and no successor is scheduled.
    pub fn needs_rotation(&self, now: Timestamp, rotation_window: SignedDuration) -> bool {
        let Some(default) = self.default_key() else {
            return true;
        };

        let remaining = default.record.expires_at.duration_since(now);
        remaining <= rotation_window && self.successor_of(default).is_none()
    }

    /// Activation time for a key created now.
    ///
    /// A replacement for a still valid default key takes over when that
    /// key expires, so both stay usable until then.
    pub fn next_activation(&self, now: Timestamp) -> Timestamp {
        self.default_key()
            .map(|default| default.record.expires_at.max(now))
            .unwrap_or(now)
    }

    /// Finds an unrevoked key that takes over from `current`.
    fn successor_of(&self, current: &RingKey) -> Option<&RingKey> {
        self.keys.values().find(|candidate| {
            let record = &candidate.record;
            candidate.key_id() != current.key_id()
                && !record.is_revoked()
                && record.activated_at <= current.record.expires_at
                && record.expires_at > current.record.expires_at
        })
    }

    fn next_refresh(
        &self,
        now: Timestamp,
        rotation_window: SignedDuration,
        refresh_interval: SignedDuration,
    ) -> Timestamp {
        let periodic = now.checked_add(refresh_interval).unwrap_or(Timestamp::MAX);

        let mut candidates = vec![periodic];
        if let Some(default) = self.default_key() {
            candidates.push(default.record.expires_at);
            if let Ok(rotation_due) = default.record.expires_at.checked_sub(rotation_window) {
                candidates.push(rotation_due);
            }
        }
        candidates.extend(
            self.keys
                .values()
                .filter(|entry| !entry.record.is_revoked())
                .map(|entry| entry.record.activated_at),
        );

        candidates
            .into_iter()
            .filter(|candidate| *candidate > now)
            .min()
            .unwrap_or(periodic)
    }
}
