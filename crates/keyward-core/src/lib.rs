#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for protect/unprotect operations.
pub const TRACING_TARGET_PROTECTION: &str = "keyward_core::protection";

/// Tracing target for key ring loading and rotation.
pub const TRACING_TARGET_KEY_MANAGER: &str = "keyward_core::key_manager";

/// Tracing target for key repositories.
pub const TRACING_TARGET_STORAGE: &str = "keyward_core::storage";

mod error;

pub mod crypto;
pub mod protection;
pub mod storage;

pub use error::{BoxedError, PayloadFault, ProtectionError, Result};
