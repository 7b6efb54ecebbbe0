//! Authenticated encryption primitives.
//!
//! Everything here composes standard constructions: XChaCha20-Poly1305 for
//! sealing and HKDF-SHA256 for deriving purpose-scoped subkeys. No state is
//! kept between calls.

mod cipher;
mod error;
mod key;

pub use cipher::{MIN_CIPHERTEXT_SIZE, NONCE_SIZE, TAG_SIZE, open, open_with_aad, seal, seal_with_aad};
pub use error::{CryptoError, CryptoResult};
pub use key::{EncryptionKey, KEY_SIZE};
