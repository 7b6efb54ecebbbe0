//! Application state and dependency injection.

use keyward_core::protection::{KeyManager, TimeLimitedProtector};

use crate::service::{PayloadLifetime, Result, ServiceConfig};

/// Tracing target for state initialization.
const TRACING_TARGET: &str = "keyward_server::service::state";

/// Application state.
///
/// Used for the [`State`] extraction (dependency injection).
///
/// [`State`]: axum::extract::State
#[must_use = "state does nothing unless you use it"]
#[derive(Clone)]
pub struct ServiceState {
    key_manager: KeyManager,
    protector: TimeLimitedProtector,
    payload_lifetime: PayloadLifetime,
}

impl ServiceState {
    /// Initializes application state from configuration.
    ///
    /// Opens the key repository, loads the key-encryption key and makes sure
    /// an active protection key exists before the first request arrives.
    pub async fn from_config(config: &ServiceConfig) -> Result<Self> {
        config.validate()?;

        let repository = config.open_key_repository().await?;
        let key_encryption_key = config.load_key_encryption_key().await?;
        if key_encryption_key.is_none() {
            tracing::warn!(
                target: TRACING_TARGET,
                "No key-encryption key configured, key material is stored unencrypted"
            );
        }

        let key_manager =
            KeyManager::new(config.key_manager_options(), repository, key_encryption_key);
        key_manager.warm_up().await?;

        let protector = key_manager
            .create_protector(config.protection_purpose.clone())
            .to_time_limited();

        tracing::info!(
            target: TRACING_TARGET,
            application = %config.application_name,
            purpose = %config.protection_purpose,
            payload_lifetime_secs = config.payload_lifetime_secs,
            "Service state initialized"
        );

        Ok(Self {
            key_manager,
            protector,
            payload_lifetime: config.payload_lifetime(),
        })
    }

    /// Returns the key manager.
    #[inline]
    pub fn key_manager(&self) -> &KeyManager {
        &self.key_manager
    }

    /// Returns the protector used by the HTTP endpoints.
    #[inline]
    pub fn protector(&self) -> &TimeLimitedProtector {
        &self.protector
    }
}

macro_rules! impl_di {
    ($($f:ident: $t:ty),+) => {$(
        impl axum::extract::FromRef<ServiceState> for $t {
            fn from_ref(state: &ServiceState) -> Self {
                state.$f.clone()
            }
        }
    )+};
}

impl_di!(key_manager: KeyManager);
impl_di!(protector: TimeLimitedProtector);
impl_di!(payload_lifetime: PayloadLifetime);
