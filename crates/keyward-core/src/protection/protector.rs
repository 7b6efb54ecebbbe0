//! Purpose-scoped payload protection.
//!
//! # Payload Format
//!
//! A protected payload is the unpadded base64url encoding of
//!
//! ```text
//! magic "KWP1" (4) || key_id (16) || nonce (24) || ciphertext || tag (16)
//! ```
//!
//! The ciphertext is produced with a subkey derived from the master key via
//! HKDF-SHA256 (salt = key id, info = label || purpose digest). The header
//! and the purpose digest are bound as associated data, so a payload only
//! opens under the same application name and purpose chain.

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::{KeyManager, TimeLimitedProtector};
use crate::crypto::{self, EncryptionKey, MIN_CIPHERTEXT_SIZE};
use crate::{PayloadFault, ProtectionError, Result, TRACING_TARGET_PROTECTION};

/// Leading bytes of every payload.
const MAGIC: &[u8; 4] = b"KWP1";

/// Size of the unencrypted header: magic followed by the key id.
const HEADER_SIZE: usize = MAGIC.len() + 16;

/// HKDF info label for payload subkeys.
const SUBKEY_LABEL: &[u8] = b"keyward.protector.v1";

/// Protects and unprotects payloads for one purpose chain.
///
/// Obtained from [`KeyManager::create_protector`]. Protectors are cheap to
/// clone and safe to share between tasks.
#[derive(Clone)]
pub struct Protector {
    manager: KeyManager,
    purposes: Arc<[String]>,
    purpose_digest: [u8; 32],
}

impl Protector {
    pub(crate) fn new(manager: KeyManager, purpose: String) -> Self {
        Self::with_purposes(manager, Arc::from(vec![purpose]))
    }

    fn with_purposes(manager: KeyManager, purposes: Arc<[String]>) -> Self {
        let purpose_digest = purpose_digest(manager.application_name(), &purposes);
        Self {
            manager,
            purposes,
            purpose_digest,
        }
    }

    /// Creates a child protector with `purpose` appended to the chain.
    ///
    /// Payloads of the parent and the child cannot be exchanged.
    pub fn create_protector(&self, purpose: impl Into<String>) -> Self {
        let mut purposes = self.purposes.to_vec();
        purposes.push(purpose.into());
        Self::with_purposes(self.manager.clone(), purposes.into())
    }

    /// Wraps this protector into one that enforces payload expiry.
    pub fn to_time_limited(&self) -> TimeLimitedProtector {
        TimeLimitedProtector::new(self.clone())
    }

    /// Returns the purpose chain.
    #[inline]
    pub fn purposes(&self) -> &[String] {
        &self.purposes
    }

    /// Returns the key manager this protector draws keys from.
    #[inline]
    pub fn key_manager(&self) -> &KeyManager {
        &self.manager
    }

    /// Protects `plaintext` with the current default key.
    pub async fn protect(&self, plaintext: &[u8]) -> Result<String> {
        let ring = self.manager.key_ring().await?;
        let default = ring
            .default_key()
            .ok_or_else(|| ProtectionError::key_store("key ring has no default key"))?;

        let key_id = default.key_id();
        let header = header(key_id);
        let subkey = self.subkey(default.key(), key_id)?;
        let sealed = crypto::seal_with_aad(&subkey, plaintext, &self.aad(&header))?;

        let mut payload = Vec::with_capacity(HEADER_SIZE + sealed.len());
        payload.extend_from_slice(&header);
        payload.extend_from_slice(&sealed);

        tracing::trace!(
            target: TRACING_TARGET_PROTECTION,
            key_id = %key_id,
            size = payload.len(),
            "Payload protected"
        );

        Ok(URL_SAFE_NO_PAD.encode(payload))
    }

    /// Authenticates and decrypts a payload produced by [`protect`](Self::protect).
    ///
    /// # Errors
    ///
    /// Every rejection is [`ProtectionError::InvalidPayload`]; the attached
    /// [`PayloadFault`] is only meant for diagnostics.
    pub async fn unprotect(&self, payload: &str) -> Result<Vec<u8>> {
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim())
            .map_err(|_| reject(PayloadFault::Malformed))?;

        if bytes.len() < HEADER_SIZE + MIN_CIPHERTEXT_SIZE || !bytes.starts_with(MAGIC) {
            return Err(reject(PayloadFault::Malformed));
        }

        let (header, sealed) = bytes.split_at(HEADER_SIZE);
        let key_id = Uuid::from_slice(&header[MAGIC.len()..])
            .map_err(|_| reject(PayloadFault::Malformed))?;

        let ring = self.manager.ring_for_key(&key_id).await?;
        let entry = ring
            .get(&key_id)
            .ok_or_else(|| reject(PayloadFault::UnknownKey))?;
        if entry.record().is_revoked() {
            return Err(reject(PayloadFault::RevokedKey));
        }

        let subkey = self.subkey(entry.key(), key_id)?;
        crypto::open_with_aad(&subkey, sealed, &self.aad(header))
            .map_err(|_| reject(PayloadFault::Authentication))
    }

    fn subkey(&self, master: &EncryptionKey, key_id: Uuid) -> Result<EncryptionKey> {
        master
            .derive_subkey(key_id.as_bytes(), &[SUBKEY_LABEL, &self.purpose_digest])
            .map_err(ProtectionError::from)
    }

    fn aad(&self, header: &[u8]) -> Vec<u8> {
        let mut aad = Vec::with_capacity(header.len() + self.purpose_digest.len());
        aad.extend_from_slice(header);
        aad.extend_from_slice(&self.purpose_digest);
        aad
    }
}

impl fmt::Debug for Protector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Protector")
            .field("application_name", &self.manager.application_name())
            .field("purposes", &self.purposes)
            .finish()
    }
}

fn header(key_id: Uuid) -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[..MAGIC.len()].copy_from_slice(MAGIC);
    header[MAGIC.len()..].copy_from_slice(key_id.as_bytes());
    header
}

/// Hashes the application name and purposes, each length-prefixed so
/// `["ab", "c"]` and `["a", "bc"]` never collide.
fn purpose_digest(application_name: &str, purposes: &[String]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in std::iter::once(application_name).chain(purposes.iter().map(String::as_str)) {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    hasher.finalize().into()
}

pub(crate) fn reject(fault: PayloadFault) -> ProtectionError {
    tracing::debug!(
        target: TRACING_TARGET_PROTECTION,
        fault = fault.as_ref(),
        "Payload rejected"
    );
    ProtectionError::invalid_payload(fault)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protection::KeyManagerOptions;
    use crate::storage::{KeyRepository, MemoryKeyRepository};

    fn manager_for(application_name: &str, repository: Arc<MemoryKeyRepository>) -> KeyManager {
        KeyManager::new(KeyManagerOptions::new(application_name), repository, None)
    }

    fn protector(purpose: &str) -> Protector {
        manager_for("app", Arc::new(MemoryKeyRepository::new())).create_protector(purpose)
    }

    fn fault(result: Result<Vec<u8>>) -> Option<PayloadFault> {
        result.err().and_then(|error| error.payload_fault())
    }

    #[tokio::test]
    async fn roundtrip() -> anyhow::Result<()> {
        let protector = protector("default");

        for plaintext in [&b""[..], b"hello", "h\u{e9}llo w\u{f6}rld \u{1f512}".as_bytes()] {
            let payload = protector.protect(plaintext).await?;
            assert_eq!(protector.unprotect(&payload).await?, plaintext);
        }
        Ok(())
    }

    #[tokio::test]
    async fn payload_is_url_safe_and_randomized() -> anyhow::Result<()> {
        let protector = protector("default");

        let first = protector.protect(b"same").await?;
        let second = protector.protect(b"same").await?;

        assert_ne!(first, second);
        assert!(
            first
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert_eq!(protector.unprotect(&second).await?, b"same");
        Ok(())
    }

    #[tokio::test]
    async fn every_bit_flip_is_rejected() -> anyhow::Result<()> {
        let protector = protector("default");
        let payload = protector.protect(b"tamper me").await?;
        let bytes = URL_SAFE_NO_PAD.decode(&payload)?;

        for index in 0..bytes.len() {
            for bit in 0..8 {
                let mut mutated = bytes.clone();
                mutated[index] ^= 1 << bit;
                let result = protector.unprotect(&URL_SAFE_NO_PAD.encode(&mutated)).await;
                assert!(
                    matches!(result, Err(ProtectionError::InvalidPayload { .. })),
                    "flip at byte {index} bit {bit} was accepted"
                );
            }
        }
        Ok(())
    }

    #[tokio::test]
    async fn malformed_input_is_rejected() -> anyhow::Result<()> {
        let protector = protector("default");

        assert_eq!(fault(protector.unprotect("not base64!").await), Some(PayloadFault::Malformed));
        assert_eq!(fault(protector.unprotect("").await), Some(PayloadFault::Malformed));
        assert_eq!(fault(protector.unprotect("S1dQMQ").await), Some(PayloadFault::Malformed));
        Ok(())
    }

    #[tokio::test]
    async fn purpose_and_application_are_isolated() -> anyhow::Result<()> {
        let repository = Arc::new(MemoryKeyRepository::new());
        let app = manager_for("app", repository.clone());
        let other_app = manager_for("other-app", repository.clone());

        let protector = app.create_protector("default");
        let payload = protector.protect(b"scoped").await?;

        let other_purpose = app.create_protector("other");
        assert_eq!(
            fault(other_purpose.unprotect(&payload).await),
            Some(PayloadFault::Authentication)
        );

        let child = protector.create_protector("child");
        assert_eq!(fault(child.unprotect(&payload).await), Some(PayloadFault::Authentication));
        assert_eq!(child.purposes(), ["default".to_owned(), "child".to_owned()]);

        // Keys of another application are not in its ring at all.
        let foreign = other_app.create_protector("default");
        assert_eq!(fault(foreign.unprotect(&payload).await), Some(PayloadFault::UnknownKey));
        Ok(())
    }

    #[tokio::test]
    async fn application_name_is_authenticated() -> anyhow::Result<()> {
        let repository = Arc::new(MemoryKeyRepository::new());
        let app = manager_for("app", repository.clone());
        let payload = app.create_protector("default").protect(b"scoped").await?;

        // Move the keys under a second application name to isolate the
        // authentication check from key lookup.
        for mut record in repository.load_keys("app").await? {
            record.application_name = "renamed".to_owned();
            repository.store_key(&record).await?;
        }
        let renamed = manager_for("renamed", repository.clone());

        assert_eq!(
            fault(renamed.create_protector("default").unprotect(&payload).await),
            Some(PayloadFault::Authentication)
        );
        Ok(())
    }

    #[tokio::test]
    async fn forged_key_ids_are_unknown_without_reload() -> anyhow::Result<()> {
        let manager = manager_for("app", Arc::new(MemoryKeyRepository::new()));
        let protector = manager.create_protector("default");
        protector.protect(b"warm").await?;
        let ring = manager.key_ring().await?;

        for _ in 0..10 {
            let mut forged = MAGIC.to_vec();
            forged.extend_from_slice(Uuid::now_v7().as_bytes());
            forged.resize(HEADER_SIZE + MIN_CIPHERTEXT_SIZE, 0);
            let forged = URL_SAFE_NO_PAD.encode(forged);

            assert_eq!(fault(protector.unprotect(&forged).await), Some(PayloadFault::UnknownKey));
        }

        assert!(Arc::ptr_eq(&ring, &manager.key_ring().await?));
        Ok(())
    }

    #[tokio::test]
    async fn rotated_key_still_opens_old_payloads() -> anyhow::Result<()> {
        let manager = manager_for("app", Arc::new(MemoryKeyRepository::new()));
        let protector = manager.create_protector("default");

        let old = protector.protect(b"before rotation").await?;
        manager.create_key().await?;
        let new = protector.protect(b"after rotation").await?;

        assert_eq!(protector.unprotect(&old).await?, b"before rotation");
        assert_eq!(protector.unprotect(&new).await?, b"after rotation");
        Ok(())
    }

    #[tokio::test]
    async fn revoked_key_is_rejected() -> anyhow::Result<()> {
        let manager = manager_for("app", Arc::new(MemoryKeyRepository::new()));
        let protector = manager.create_protector("default");
        let payload = protector.protect(b"revoke me").await?;

        let ring = manager.key_ring().await?;
        let key_id = ring
            .default_key()
            .map(|key| key.key_id())
            .ok_or_else(|| anyhow::anyhow!("no default key"))?;
        manager.revoke_key(key_id).await?;

        assert_eq!(fault(protector.unprotect(&payload).await), Some(PayloadFault::RevokedKey));
        Ok(())
    }

    #[test]
    fn purpose_digest_is_length_prefixed() {
        let split_a = purpose_digest("app", &["ab".to_owned(), "c".to_owned()]);
        let split_b = purpose_digest("app", &["a".to_owned(), "bc".to_owned()]);
        let shifted = purpose_digest("appa", &["b".to_owned(), "c".to_owned()]);

        assert_ne!(split_a, split_b);
        assert_ne!(split_a, shifted);
    }
}
