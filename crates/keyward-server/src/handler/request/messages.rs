use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Text carried in and out of the protection endpoints.
///
/// `/api/protect` takes plaintext and returns the protected payload,
/// `/api/unprotect` does the reverse.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Message {
    /// Plaintext or protected payload, depending on the endpoint.
    pub text: String,
}

impl Message {
    /// Creates a new message.
    #[inline]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}
