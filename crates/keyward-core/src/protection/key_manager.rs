//! Application key management.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use jiff::{SignedDuration, Timestamp};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{KeyRecord, KeyRing, Protector};
use crate::crypto::EncryptionKey;
use crate::storage::KeyRepository;
use crate::{Result, TRACING_TARGET_KEY_MANAGER};

/// Default lifetime of a protection key.
pub const DEFAULT_KEY_LIFETIME: Duration = Duration::from_secs(90 * 24 * 60 * 60);

/// Default time before expiry at which a successor key is created.
pub const DEFAULT_ROTATION_WINDOW: Duration = Duration::from_secs(2 * 24 * 60 * 60);

/// Default maximum age of a cached key ring.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default minimum ring age before an unknown key id forces a reload.
pub const DEFAULT_RELOAD_COOLDOWN: Duration = Duration::from_secs(30);

/// Tunables for a [`KeyManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyManagerOptions {
    /// Namespace for keys and payloads. Payloads protected under one
    /// application name cannot be opened under another.
    pub application_name: String,
    /// How long a new key protects new payloads.
    pub key_lifetime: Duration,
    /// How long before the default key expires its successor is created.
    pub rotation_window: Duration,
    /// How long a loaded key ring is trusted before it is reloaded.
    pub refresh_interval: Duration,
    /// A ring younger than this is not reloaded for an unknown key id, so
    /// forged payloads cannot turn every request into a repository read.
    pub reload_cooldown: Duration,
}

impl KeyManagerOptions {
    /// Creates options with default lifetimes.
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            key_lifetime: DEFAULT_KEY_LIFETIME,
            rotation_window: DEFAULT_ROTATION_WINDOW,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            reload_cooldown: DEFAULT_RELOAD_COOLDOWN,
        }
    }

    /// Sets the key lifetime.
    pub fn with_key_lifetime(mut self, key_lifetime: Duration) -> Self {
        self.key_lifetime = key_lifetime;
        self
    }

    /// Sets the rotation window.
    pub fn with_rotation_window(mut self, rotation_window: Duration) -> Self {
        self.rotation_window = rotation_window;
        self
    }

    /// Sets the refresh interval.
    pub fn with_refresh_interval(mut self, refresh_interval: Duration) -> Self {
        self.refresh_interval = refresh_interval;
        self
    }

    /// Sets the reload cooldown for unknown key ids.
    pub fn with_reload_cooldown(mut self, reload_cooldown: Duration) -> Self {
        self.reload_cooldown = reload_cooldown;
        self
    }
}

fn signed(duration: Duration) -> SignedDuration {
    SignedDuration::try_from(duration).unwrap_or(SignedDuration::MAX)
}

/// Owns the key ring of one application.
///
/// Cloning is cheap; all clones share the cached ring. The ring is loaded
/// lazily on first use and rebuilt when it goes stale. Rebuilds are
/// serialized, so concurrent first use creates exactly one key.
#[derive(Clone)]
pub struct KeyManager {
    inner: Arc<KeyManagerInner>,
}

struct KeyManagerInner {
    options: KeyManagerOptions,
    repository: Arc<dyn KeyRepository>,
    key_encryption_key: Option<EncryptionKey>,
    ring: RwLock<Option<Arc<KeyRing>>>,
    refresh: Mutex<()>,
}

impl KeyManager {
    /// Creates a manager over `repository`.
    ///
    /// With a `key_encryption_key`, new key material is sealed before it is
    /// stored and existing sealed material is opened on load.
    pub fn new(
        options: KeyManagerOptions,
        repository: Arc<dyn KeyRepository>,
        key_encryption_key: Option<EncryptionKey>,
    ) -> Self {
        Self {
            inner: Arc::new(KeyManagerInner {
                options,
                repository,
                key_encryption_key,
                ring: RwLock::new(None),
                refresh: Mutex::new(()),
            }),
        }
    }

    /// Returns the application name keys are scoped to.
    #[inline]
    pub fn application_name(&self) -> &str {
        &self.inner.options.application_name
    }

    /// Returns the manager options.
    #[inline]
    pub fn options(&self) -> &KeyManagerOptions {
        &self.inner.options
    }

    /// Creates a protector for `purpose`.
    pub fn create_protector(&self, purpose: impl Into<String>) -> Protector {
        Protector::new(self.clone(), purpose.into())
    }

    /// Returns the current key ring, loading or rebuilding it if needed.
    pub async fn key_ring(&self) -> Result<Arc<KeyRing>> {
        if let Some(ring) = self.cached_ring().await
            && !ring.is_stale(Timestamp::now())
        {
            return Ok(ring);
        }

        self.rebuild_ring(false).await
    }

    /// Rebuilds the key ring from the repository unconditionally.
    pub async fn refresh(&self) -> Result<Arc<KeyRing>> {
        self.rebuild_ring(true).await
    }

    /// Loads the key ring once so startup fails early on a broken store.
    pub async fn warm_up(&self) -> Result<()> {
        let ring = self.key_ring().await?;

        tracing::info!(
            target: TRACING_TARGET_KEY_MANAGER,
            application = %self.application_name(),
            keys = ring.len(),
            default_key_id = ?ring.default_key().map(|key| key.key_id()),
            "Key ring ready"
        );

        Ok(())
    }

    /// Returns a key ring that contains `key_id` if the repository has it.
    ///
    /// A ring missing the key is rebuilt, which picks up keys created by
    /// other instances sharing the repository. Rings younger than
    /// [`KeyManagerOptions::reload_cooldown`] are returned as they are.
    pub async fn ring_for_key(&self, key_id: &Uuid) -> Result<Arc<KeyRing>> {
        let ring = self.key_ring().await?;
        if ring.get(key_id).is_some() {
            return Ok(ring);
        }

        let reload_after = ring
            .built_at()
            .checked_add(signed(self.inner.options.reload_cooldown))
            .unwrap_or(Timestamp::MAX);
        if Timestamp::now() < reload_after {
            tracing::debug!(
                target: TRACING_TARGET_KEY_MANAGER,
                key_id = %key_id,
                reload_after = %reload_after,
                "Key not in ring, reload on cooldown"
            );
            return Ok(ring);
        }

        tracing::debug!(
            target: TRACING_TARGET_KEY_MANAGER,
            key_id = %key_id,
            "Key not in ring, reloading"
        );
        self.refresh().await
    }

    /// Creates a key that becomes the default immediately.
    pub async fn create_key(&self) -> Result<KeyRecord> {
        let record = {
            let _guard = self.inner.refresh.lock().await;
            self.store_new_key(Timestamp::now()).await?
        };

        self.refresh().await?;
        Ok(record)
    }

    /// Revokes a key. Payloads protected with it can no longer be opened.
    ///
    /// Returns `false` if the key does not exist.
    pub async fn revoke_key(&self, key_id: Uuid) -> Result<bool> {
        let revoked = self
            .inner
            .repository
            .revoke_key(self.application_name(), key_id, Timestamp::now())
            .await?;

        if revoked {
            tracing::info!(
                target: TRACING_TARGET_KEY_MANAGER,
                key_id = %key_id,
                "Protection key revoked"
            );
            self.refresh().await?;
        }

        Ok(revoked)
    }

    async fn cached_ring(&self) -> Option<Arc<KeyRing>> {
        self.inner.ring.read().await.clone()
    }

    async fn rebuild_ring(&self, force: bool) -> Result<Arc<KeyRing>> {
        let observed = self.cached_ring().await;
        let _guard = self.inner.refresh.lock().await;

        // Another task may have rebuilt the ring while this one waited.
        if let Some(current) = self.cached_ring().await {
            let replaced = observed
                .as_ref()
                .is_none_or(|observed| !Arc::ptr_eq(observed, &current));
            let fresh = !current.is_stale(Timestamp::now());
            if (force && replaced) || (!force && fresh) {
                return Ok(current);
            }
        }

        let options = &self.inner.options;
        let rotation_window = signed(options.rotation_window);
        let refresh_interval = signed(options.refresh_interval);
        let kek = self.inner.key_encryption_key.as_ref();

        let mut records = self
            .inner
            .repository
            .load_keys(&options.application_name)
            .await?;

        let now = Timestamp::now();
        let mut ring = KeyRing::build(records.clone(), kek, now, rotation_window, refresh_interval);

        if ring.needs_rotation(now, rotation_window) {
            let record = self.store_new_key(ring.next_activation(now)).await?;
            records.push(record);
            ring = KeyRing::build(records, kek, now, rotation_window, refresh_interval);
        }

        tracing::debug!(
            target: TRACING_TARGET_KEY_MANAGER,
            keys = ring.len(),
            refresh_at = %ring.refresh_at(),
            "Key ring rebuilt"
        );

        let ring = Arc::new(ring);
        *self.inner.ring.write().await = Some(ring.clone());
        Ok(ring)
    }

    /// Generates, persists and returns a key activating at `activated_at`.
    ///
    /// Callers must hold the refresh lock.
    async fn store_new_key(&self, activated_at: Timestamp) -> Result<KeyRecord> {
        let options = &self.inner.options;
        let expires_at = activated_at
            .checked_add(signed(options.key_lifetime))
            .unwrap_or(Timestamp::MAX);

        let key = EncryptionKey::generate();
        let record = KeyRecord::new(
            options.application_name.clone(),
            &key,
            self.inner.key_encryption_key.as_ref(),
            activated_at,
            expires_at,
        )?;

        self.inner.repository.store_key(&record).await?;

        tracing::info!(
            target: TRACING_TARGET_KEY_MANAGER,
            key_id = %record.key_id,
            activated_at = %record.activated_at,
            expires_at = %record.expires_at,
            "Protection key created"
        );

        Ok(record)
    }
}

impl fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyManager")
            .field("options", &self.inner.options)
            .field(
                "key_encryption_key",
                &self.inner.key_encryption_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::storage::MemoryKeyRepository;

    fn manager(repository: Arc<MemoryKeyRepository>) -> KeyManager {
        KeyManager::new(KeyManagerOptions::new("app"), repository, None)
    }

    /// Memory repository that counts `load_keys` calls.
    #[derive(Default)]
    struct CountingRepository {
        inner: MemoryKeyRepository,
        loads: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl KeyRepository for CountingRepository {
        async fn load_keys(&self, application_name: &str) -> Result<Vec<KeyRecord>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.inner.load_keys(application_name).await
        }

        async fn store_key(&self, record: &KeyRecord) -> Result<()> {
            self.inner.store_key(record).await
        }

        async fn revoke_key(
            &self,
            application_name: &str,
            key_id: Uuid,
            revoked_at: Timestamp,
        ) -> Result<bool> {
            self.inner.revoke_key(application_name, key_id, revoked_at).await
        }
    }

    #[tokio::test]
    async fn first_use_creates_default_key() -> anyhow::Result<()> {
        let repository = Arc::new(MemoryKeyRepository::new());
        let manager = manager(repository.clone());

        let ring = manager.key_ring().await?;
        assert_eq!(ring.len(), 1);
        assert!(ring.default_key().is_some());
        assert_eq!(repository.len().await, 1);

        let again = manager.key_ring().await?;
        assert!(Arc::ptr_eq(&ring, &again));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_use_creates_one_key() -> anyhow::Result<()> {
        let repository = Arc::new(MemoryKeyRepository::new());
        let manager = manager(repository.clone());

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.key_ring().await })
            })
            .collect();

        for task in tasks {
            task.await??;
        }

        assert_eq!(repository.len().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn expiring_key_gets_successor_at_expiry() -> anyhow::Result<()> {
        let repository = Arc::new(MemoryKeyRepository::new());
        let now = Timestamp::now();
        let expires_at = now + SignedDuration::from_hours(12);
        let expiring = KeyRecord::new(
            "app",
            &EncryptionKey::generate(),
            None,
            now - SignedDuration::from_hours(100),
            expires_at,
        )?;
        repository.store_key(&expiring).await?;

        let ring = manager(repository.clone()).key_ring().await?;

        assert_eq!(ring.len(), 2);
        assert_eq!(
            ring.default_key().map(|key| key.key_id()),
            Some(expiring.key_id)
        );
        let successor = repository
            .load_keys("app")
            .await?
            .into_iter()
            .find(|record| record.key_id != expiring.key_id)
            .ok_or_else(|| anyhow::anyhow!("successor key missing"))?;
        assert_eq!(successor.activated_at, expires_at);
        Ok(())
    }

    #[tokio::test]
    async fn create_key_replaces_default() -> anyhow::Result<()> {
        let manager = manager(Arc::new(MemoryKeyRepository::new()));
        let first = manager.key_ring().await?;
        let first_id = first.default_key().map(|key| key.key_id());

        let created = manager.create_key().await?;
        let ring = manager.key_ring().await?;

        assert_eq!(ring.len(), 2);
        assert_ne!(first_id, Some(created.key_id));
        assert_eq!(ring.default_key().map(|key| key.key_id()), Some(created.key_id));
        Ok(())
    }

    #[tokio::test]
    async fn revoking_default_key_rotates() -> anyhow::Result<()> {
        let manager = manager(Arc::new(MemoryKeyRepository::new()));
        let ring = manager.key_ring().await?;
        let key_id = ring
            .default_key()
            .map(|key| key.key_id())
            .ok_or_else(|| anyhow::anyhow!("no default key"))?;

        assert!(manager.revoke_key(key_id).await?);
        assert!(!manager.revoke_key(Uuid::now_v7()).await?);

        let ring = manager.key_ring().await?;
        assert!(ring.get(&key_id).is_some_and(|key| key.record().is_revoked()));
        assert_ne!(ring.default_key().map(|key| key.key_id()), Some(key_id));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_key_triggers_reload() -> anyhow::Result<()> {
        let repository = Arc::new(MemoryKeyRepository::new());
        let options = KeyManagerOptions::new("app").with_reload_cooldown(Duration::ZERO);
        let reader = KeyManager::new(options, repository.clone(), None);
        let writer = manager(repository.clone());

        reader.key_ring().await?;
        let created = writer.create_key().await?;

        let ring = reader.ring_for_key(&created.key_id).await?;
        assert!(ring.get(&created.key_id).is_some());
        Ok(())
    }

    #[tokio::test]
    async fn unknown_keys_do_not_reload_a_fresh_ring() -> anyhow::Result<()> {
        let repository = Arc::new(CountingRepository::default());
        let manager = KeyManager::new(KeyManagerOptions::new("app"), repository.clone(), None);

        let ring = manager.key_ring().await?;
        assert_eq!(repository.loads.load(Ordering::SeqCst), 1);

        for _ in 0..100 {
            let returned = manager.ring_for_key(&Uuid::now_v7()).await?;
            assert!(Arc::ptr_eq(&ring, &returned));
        }
        assert_eq!(repository.loads.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn sealed_keys_need_the_same_kek() -> anyhow::Result<()> {
        let repository = Arc::new(MemoryKeyRepository::new());
        let kek = EncryptionKey::generate();

        let sealed = KeyManager::new(KeyManagerOptions::new("app"), repository.clone(), Some(kek.clone()));
        sealed.key_ring().await?;
        let stored = repository.load_keys("app").await?;
        assert!(stored.iter().all(|record| record.material_encrypted));

        let reopened = KeyManager::new(KeyManagerOptions::new("app"), repository.clone(), Some(kek));
        assert_eq!(reopened.key_ring().await?.len(), 1);
        Ok(())
    }
}
