//! Query repositories.
//!
//! Repositories are extension traits implemented for [`PgConnection`], so
//! any pooled connection can run them directly.
//!
//! [`PgConnection`]: crate::PgConnection

mod protection_key;

pub use protection_key::ProtectionKeyRepository;
