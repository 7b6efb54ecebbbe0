//! Database models.

mod protection_key;

pub use protection_key::{NewProtectionKey, ProtectionKey};
