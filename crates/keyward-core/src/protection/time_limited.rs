//! Protection with an embedded expiry.
//!
//! The expiry is stored as Unix milliseconds (`i64`, big-endian) in front
//! of the user data, inside the encrypted region, so it is covered by the
//! authentication tag like everything else.

use std::fmt;
use std::time::Duration;

use jiff::{SignedDuration, Timestamp};

use super::Protector;
use super::protector::reject;
use crate::{PayloadFault, ProtectionError, Result};

/// Purpose appended to the wrapped protector's chain, keeping time-limited
/// payloads apart from plain ones.
const TIME_LIMITED_PURPOSE: &str = "keyward.time-limited.v1";

const EXPIRY_SIZE: usize = size_of::<i64>();

/// A [`Protector`] whose payloads stop unprotecting after a deadline.
#[derive(Clone)]
pub struct TimeLimitedProtector {
    base: Protector,
    inner: Protector,
}

impl TimeLimitedProtector {
    /// Wraps `base`.
    pub fn new(base: Protector) -> Self {
        let inner = base.create_protector(TIME_LIMITED_PURPOSE);
        Self { base, inner }
    }

    /// Creates a time-limited child for `purpose`.
    pub fn create_protector(&self, purpose: impl Into<String>) -> Self {
        Self::new(self.base.create_protector(purpose))
    }

    /// Returns the purpose chain of the wrapped protector.
    #[inline]
    pub fn purposes(&self) -> &[String] {
        self.base.purposes()
    }

    /// Protects `plaintext` for `lifetime` from now.
    ///
    /// # Errors
    ///
    /// Returns [`ProtectionError::InvalidLifetime`] if `lifetime` is zero or
    /// pushes the expiry past the representable range.
    pub async fn protect(&self, plaintext: &[u8], lifetime: Duration) -> Result<String> {
        if lifetime.is_zero() {
            return Err(ProtectionError::InvalidLifetime);
        }

        let lifetime =
            SignedDuration::try_from(lifetime).map_err(|_| ProtectionError::InvalidLifetime)?;
        let expires_at = Timestamp::now()
            .checked_add(lifetime)
            .map_err(|_| ProtectionError::InvalidLifetime)?;

        self.protect_until(plaintext, expires_at).await
    }

    /// Protects `plaintext` until the absolute time `expires_at`.
    pub async fn protect_until(&self, plaintext: &[u8], expires_at: Timestamp) -> Result<String> {
        let mut buffer = Vec::with_capacity(EXPIRY_SIZE + plaintext.len());
        buffer.extend_from_slice(&expires_at.as_millisecond().to_be_bytes());
        buffer.extend_from_slice(plaintext);

        self.inner.protect(&buffer).await
    }

    /// Unprotects a payload and returns its data together with its expiry.
    ///
    /// # Errors
    ///
    /// Fails with [`PayloadFault::Expired`] once the expiry is reached, in
    /// addition to every failure of [`Protector::unprotect`].
    pub async fn unprotect_with_expiry(&self, payload: &str) -> Result<(Vec<u8>, Timestamp)> {
        let mut buffer = self.inner.unprotect(payload).await?;
        if buffer.len() < EXPIRY_SIZE {
            return Err(reject(PayloadFault::Malformed));
        }

        let mut millis = [0u8; EXPIRY_SIZE];
        millis.copy_from_slice(&buffer[..EXPIRY_SIZE]);
        let expires_at = Timestamp::from_millisecond(i64::from_be_bytes(millis))
            .map_err(|_| reject(PayloadFault::Malformed))?;

        if Timestamp::now() >= expires_at {
            return Err(reject(PayloadFault::Expired));
        }

        buffer.drain(..EXPIRY_SIZE);
        Ok((buffer, expires_at))
    }

    /// Unprotects a payload produced by this protector.
    pub async fn unprotect(&self, payload: &str) -> Result<Vec<u8>> {
        self.unprotect_with_expiry(payload)
            .await
            .map(|(plaintext, _)| plaintext)
    }

    /// Protects a string for `lifetime` from now.
    pub async fn protect_str(&self, plaintext: &str, lifetime: Duration) -> Result<String> {
        self.protect(plaintext.as_bytes(), lifetime).await
    }

    /// Unprotects a payload holding a UTF-8 string.
    pub async fn unprotect_str(&self, payload: &str) -> Result<String> {
        let plaintext = self.unprotect(payload).await?;
        String::from_utf8(plaintext).map_err(|_| reject(PayloadFault::Encoding))
    }
}

impl fmt::Debug for TimeLimitedProtector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeLimitedProtector")
            .field("base", &self.base)
            .finish()
    }
}
