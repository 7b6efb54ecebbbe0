//! XChaCha20-Poly1305 sealing and opening.
//!
//! # Wire Format
//!
//! Sealed output is `nonce (24 bytes) || ciphertext || tag (16 bytes)`.
//! The nonce is random per call; 24 bytes is large enough that random
//! generation does not risk collisions.

use chacha20poly1305::XChaCha20Poly1305;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};

use super::error::{CryptoError, CryptoResult};
use super::key::EncryptionKey;

/// Size of the XChaCha20-Poly1305 nonce in bytes.
pub const NONCE_SIZE: usize = 24;

/// Size of the Poly1305 authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Minimum size of valid sealed data (nonce + tag, no plaintext).
pub const MIN_CIPHERTEXT_SIZE: usize = NONCE_SIZE + TAG_SIZE;

/// Seals `plaintext` without associated data.
pub fn seal(key: &EncryptionKey, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    seal_with_aad(key, plaintext, &[])
}

/// Opens data produced by [`seal`].
pub fn open(key: &EncryptionKey, sealed: &[u8]) -> CryptoResult<Vec<u8>> {
    open_with_aad(key, sealed, &[])
}

/// Seals `plaintext`, binding `aad` into the authentication tag.
///
/// The same `aad` must be presented to [`open_with_aad`].
pub fn seal_with_aad(key: &EncryptionKey, plaintext: &[u8], aad: &[u8]) -> CryptoResult<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

    let payload = Payload {
        msg: plaintext,
        aad,
    };
    let ciphertext = cipher
        .encrypt(&nonce, payload)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);

    Ok(sealed)
}

/// Opens data produced by [`seal_with_aad`].
///
/// # Errors
///
/// - [`CryptoError::CiphertextTooShort`] if the input cannot hold a nonce and tag
/// - [`CryptoError::DecryptionFailed`] on a wrong key, wrong `aad` or tampering
pub fn open_with_aad(key: &EncryptionKey, sealed: &[u8], aad: &[u8]) -> CryptoResult<Vec<u8>> {
    if sealed.len() < MIN_CIPHERTEXT_SIZE {
        return Err(CryptoError::CiphertextTooShort);
    }

    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);

    let payload = Payload {
        msg: ciphertext,
        aad,
    };
    cipher
        .decrypt(nonce.into(), payload)
        .map_err(|_| CryptoError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let key = EncryptionKey::generate();

        let sealed = seal(&key, b"hello, world!").unwrap();
        assert_eq!(open(&key, &sealed).unwrap(), b"hello, world!");

        let sealed = seal(&key, b"").unwrap();
        assert!(open(&key, &sealed).unwrap().is_empty());
    }

    #[test]
    fn sealed_size() {
        let key = EncryptionKey::generate();
        let sealed = seal(&key, b"test").unwrap();

        assert_eq!(sealed.len(), NONCE_SIZE + 4 + TAG_SIZE);
    }

    #[test]
    fn fresh_nonce_per_call() {
        let key = EncryptionKey::generate();

        let first = seal(&key, b"same data").unwrap();
        let second = seal(&key, b"same data").unwrap();

        assert_ne!(first, second);
        assert_eq!(open(&key, &first).unwrap(), open(&key, &second).unwrap());
    }

    #[test]
    fn wrong_key_fails() {
        let sealed = seal(&EncryptionKey::generate(), b"secret").unwrap();
        let result = open(&EncryptionKey::generate(), &sealed);

        assert_eq!(result, Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn aad_is_authenticated() {
        let key = EncryptionKey::generate();
        let sealed = seal_with_aad(&key, b"secret", b"context-a").unwrap();

        assert_eq!(open_with_aad(&key, &sealed, b"context-a").unwrap(), b"secret");
        assert_eq!(
            open_with_aad(&key, &sealed, b"context-b"),
            Err(CryptoError::DecryptionFailed)
        );
        assert_eq!(open(&key, &sealed), Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn corrupted_data_fails() {
        let key = EncryptionKey::generate();
        let mut sealed = seal(&key, b"secret data").unwrap();
        sealed[NONCE_SIZE + 2] ^= 0xFF;

        assert_eq!(open(&key, &sealed), Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn truncated_data_fails() {
        let key = EncryptionKey::generate();
        let short = vec![0u8; MIN_CIPHERTEXT_SIZE - 1];

        assert_eq!(open(&key, &short), Err(CryptoError::CiphertextTooShort));
    }
}
