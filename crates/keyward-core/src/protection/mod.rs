//! Key management and payload protection.
//!
//! [`KeyManager`] owns the key ring of one application and hands out
//! [`Protector`]s scoped to a purpose. A [`TimeLimitedProtector`] adds an
//! expiry on top.

mod key;
mod key_manager;
mod key_ring;
mod protector;
mod time_limited;

pub use key::KeyRecord;
pub use key_manager::{
    DEFAULT_KEY_LIFETIME, DEFAULT_REFRESH_INTERVAL, DEFAULT_ROTATION_WINDOW, KeyManager,
    KeyManagerOptions,
};
pub use key_ring::{KeyRing, RingKey};
pub use protector::Protector;
pub use time_limited::TimeLimitedProtector;
