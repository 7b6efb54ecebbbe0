//! Application state and dependency injection.

mod config;
mod key_encryption;
mod key_store;
mod state;

pub use crate::service::config::{KeyStorageKind, PayloadLifetime, ServiceConfig};
pub use crate::service::key_encryption::load_key_encryption_key;
pub use crate::service::key_store::PostgresKeyRepository;
pub use crate::service::state::ServiceState;
// Re-export error types from crate root for convenience
pub use crate::{Error, Result};
