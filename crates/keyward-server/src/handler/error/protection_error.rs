//! Conversion of protection failures into HTTP errors.
//!
//! Every failure maps to a bare 500. Clients cannot tell a tampered payload
//! from an expired one or from a key store outage.

use keyward_core::ProtectionError;

use crate::handler::{Error, ErrorKind};

/// Tracing target for protection error conversion.
const TRACING_TARGET: &str = "keyward_server::handler::protection_error";

impl From<ProtectionError> for Error<'static> {
    fn from(error: ProtectionError) -> Self {
        match &error {
            ProtectionError::InvalidPayload { .. } => {
                tracing::warn!(
                    target: TRACING_TARGET,
                    error = %error,
                    "Rejected protected payload"
                );
            }
            ProtectionError::KeyStore { .. } => {
                tracing::error!(
                    target: TRACING_TARGET,
                    error = %error,
                    source = ?std::error::Error::source(&error),
                    "Key store failure while handling request"
                );
            }
            _ => {
                tracing::error!(
                    target: TRACING_TARGET,
                    error = %error,
                    "Protection failure while handling request"
                );
            }
        }

        ErrorKind::InternalServerError.into_error()
    }
}

#[cfg(test)]
mod tests {
    use keyward_core::PayloadFault;

    use super::*;

    #[test]
    fn every_failure_is_an_opaque_500() {
        let errors = [
            ProtectionError::invalid_payload(PayloadFault::Expired),
            ProtectionError::invalid_payload(PayloadFault::Authentication),
            ProtectionError::InvalidLifetime,
            ProtectionError::key_store("unreachable"),
        ];

        for error in errors {
            let error = Error::from(error);
            assert_eq!(error.kind(), ErrorKind::InternalServerError);
            assert_eq!(error.message(), None);
            assert_eq!(error.context(), None);
        }
    }
}
