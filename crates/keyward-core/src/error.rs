//! Error types for key management and data protection.

use std::borrow::Cow;

use strum::{AsRefStr, IntoStaticStr};
use thiserror::Error;

use crate::crypto::CryptoError;

/// Type alias for boxed dynamic errors that can be sent across threads.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Type alias for Results with [`ProtectionError`].
pub type Result<T, E = ProtectionError> = std::result::Result<T, E>;

/// The precise reason a protected payload was rejected.
///
/// Every fault surfaces to callers as the same [`ProtectionError::InvalidPayload`],
/// so the distinction is only available for diagnostics and must never be
/// forwarded to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum PayloadFault {
    /// The payload is not valid base64url or its header is wrong.
    Malformed,
    /// The payload references a key the key ring does not contain.
    UnknownKey,
    /// The payload references a revoked key.
    RevokedKey,
    /// The authentication tag did not verify.
    Authentication,
    /// The embedded expiry has passed.
    Expired,
    /// The decrypted payload is not valid UTF-8.
    Encoding,
}

/// Errors returned by the protection layer.
#[derive(Debug, Error)]
pub enum ProtectionError {
    /// The payload could not be unprotected.
    ///
    /// The display text is intentionally the same for every [`PayloadFault`].
    #[error("invalid payload")]
    InvalidPayload {
        /// The diagnostic cause.
        fault: PayloadFault,
    },

    /// The requested payload lifetime is zero or out of range.
    #[error("payload lifetime must be positive and representable")]
    InvalidLifetime,

    /// The key repository failed to load or persist keys.
    #[error("key store error: {message}")]
    KeyStore {
        /// Human readable description.
        message: Cow<'static, str>,
        /// The underlying error, if any.
        #[source]
        source: Option<BoxedError>,
    },

    /// A stored key record could not be turned into usable key material.
    #[error("key material error: {0}")]
    KeyMaterial(Cow<'static, str>),

    /// A cryptographic primitive failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl ProtectionError {
    /// Creates an [`InvalidPayload`](Self::InvalidPayload) error.
    #[inline]
    pub fn invalid_payload(fault: PayloadFault) -> Self {
        Self::InvalidPayload { fault }
    }

    /// Creates a [`KeyStore`](Self::KeyStore) error without a source.
    pub fn key_store(message: impl Into<Cow<'static, str>>) -> Self {
        Self::KeyStore {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a [`KeyMaterial`](Self::KeyMaterial) error.
    pub fn key_material(message: impl Into<Cow<'static, str>>) -> Self {
        Self::KeyMaterial(message.into())
    }

    /// Attaches a source error. Only [`KeyStore`](Self::KeyStore) keeps it.
    pub fn with_source(self, source: impl Into<BoxedError>) -> Self {
        match self {
            Self::KeyStore { message, .. } => Self::KeyStore {
                message,
                source: Some(source.into()),
            },
            other => other,
        }
    }

    /// Returns the payload fault if this is an invalid payload error.
    pub fn payload_fault(&self) -> Option<PayloadFault> {
        match self {
            Self::InvalidPayload { fault } => Some(*fault),
            _ => None,
        }
    }

    /// Returns `true` if the error was caused by the caller's payload.
    #[inline]
    pub fn is_invalid_payload(&self) -> bool {
        matches!(self, Self::InvalidPayload { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_payload_display_hides_fault() {
        let expired = ProtectionError::invalid_payload(PayloadFault::Expired);
        let tampered = ProtectionError::invalid_payload(PayloadFault::Authentication);

        assert_eq!(expired.to_string(), tampered.to_string());
        assert_eq!(expired.payload_fault(), Some(PayloadFault::Expired));
        assert!(tampered.is_invalid_payload());
    }

    #[test]
    fn key_store_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let error = ProtectionError::key_store("failed to read keys").with_source(io);

        assert!(std::error::Error::source(&error).is_some());
        assert_eq!(error.to_string(), "key store error: failed to read keys");
    }

    #[test]
    fn payload_fault_names() {
        assert_eq!(PayloadFault::UnknownKey.as_ref(), "unknown_key");
        let name: &'static str = PayloadFault::RevokedKey.into();
        assert_eq!(name, "revoked_key");
    }
}
