//! Cryptographic error types.

use thiserror::Error;

/// Result type for cryptographic operations.
pub type CryptoResult<T> = std::result::Result<T, CryptoError>;

/// Errors that can occur during cryptographic operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// The ciphertext is too short to contain a nonce and a tag.
    #[error("ciphertext too short to contain nonce and authentication tag")]
    CiphertextTooShort,
    /// The tag did not verify under the given key and associated data.
    #[error("decryption failed: data may be corrupted or tampered with")]
    DecryptionFailed,
    /// The cipher refused to encrypt the input.
    #[error("encryption failed")]
    EncryptionFailed,
    /// The provided key has an invalid length.
    #[error("invalid key length: expected 32 bytes")]
    InvalidKeyLength,
    /// HKDF could not expand the requested output length.
    #[error("key derivation failed")]
    KeyDerivationFailed,
}
