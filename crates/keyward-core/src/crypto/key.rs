//! Symmetric key material.

use std::fmt;

use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;

use super::error::{CryptoError, CryptoResult};

/// The size of an XChaCha20-Poly1305 key in bytes.
pub const KEY_SIZE: usize = 32;

/// A 256-bit key for XChaCha20-Poly1305.
///
/// Used both for master keys held in the key ring and for the subkeys
/// derived from them. `Debug` never prints the bytes.
#[derive(Clone)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] if the slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        let bytes: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength)?;
        Ok(Self { bytes })
    }

    /// Generates a new random key from the thread-local CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Returns the raw key bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Derives a subkey with HKDF-SHA256.
    ///
    /// `salt` and `info` together select the subkey; the same inputs always
    /// yield the same output.
    pub fn derive_subkey(&self, salt: &[u8], info: &[&[u8]]) -> CryptoResult<Self> {
        let hkdf = Hkdf::<Sha256>::new(Some(salt), &self.bytes);

        let mut derived = [0u8; KEY_SIZE];
        hkdf.expand_multi_info(info, &mut derived)
            .map_err(|_| CryptoError::KeyDerivationFailed)?;

        Ok(Self { bytes: derived })
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

impl TryFrom<&[u8]> for EncryptionKey {
    type Error = CryptoError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::from_bytes(bytes)
    }
}

impl TryFrom<Vec<u8>> for EncryptionKey {
    type Error = CryptoError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        Self::from_bytes(&bytes)
    }
}

impl AsRef<[u8]> for EncryptionKey {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_differ() {
        let first = EncryptionKey::generate();
        let second = EncryptionKey::generate();
        assert_ne!(first.as_bytes(), second.as_bytes());
    }

    #[test]
    fn from_bytes_checks_length() {
        let key = EncryptionKey::from_bytes(&[7u8; KEY_SIZE]).unwrap();
        assert_eq!(key.as_bytes(), &[7u8; KEY_SIZE]);

        assert_eq!(
            EncryptionKey::from_bytes(&[0u8; 16]).unwrap_err(),
            CryptoError::InvalidKeyLength
        );
        assert_eq!(
            EncryptionKey::try_from(vec![0u8; 64]).unwrap_err(),
            CryptoError::InvalidKeyLength
        );
    }

    #[test]
    fn debug_redacts_key() {
        let key = EncryptionKey::generate();
        let debug = format!("{:?}", key);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains(&format!("{:?}", key.as_bytes())));
    }

    #[test]
    fn derive_subkey_is_deterministic() {
        let master = EncryptionKey::generate();

        let first = master.derive_subkey(b"salt", &[b"info"]).unwrap();
        let second = master.derive_subkey(b"salt", &[b"in", b"fo"]).unwrap();

        assert_eq!(first.as_bytes(), second.as_bytes());
        assert_ne!(first.as_bytes(), master.as_bytes());
    }

    #[test]
    fn derive_subkey_separates_inputs() {
        let master = EncryptionKey::generate();
        let base = master.derive_subkey(b"salt-a", &[b"info"]).unwrap();

        let other_salt = master.derive_subkey(b"salt-b", &[b"info"]).unwrap();
        let other_info = master.derive_subkey(b"salt-a", &[b"other"]).unwrap();
        let other_master = EncryptionKey::generate()
            .derive_subkey(b"salt-a", &[b"info"])
            .unwrap();

        assert_ne!(base.as_bytes(), other_salt.as_bytes());
        assert_ne!(base.as_bytes(), other_info.as_bytes());
        assert_ne!(base.as_bytes(), other_master.as_bytes());
    }
}
