//! Key providers: where the engine's symmetric keys come from.
//!
//! The engine performs AES-256-GCM locally but never generates its own
//! long-lived keys; it asks a [`KeyProvider`]. Multiple logical keys may be
//! active at once: exactly one version is current for new encryptions,
//! older versions stay available for decrypting legacy ciphertext until
//! purged.

use async_trait::async_trait;
use dashmap::DashMap;
use rand::RngCore;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::errors::{Error, Result};
use crate::secrets::store::SecretStore;
use crate::secrets::types::SecretBytes;

/// Key material length in bytes (AES-256).
const KEY_LEN: usize = 32;

/// A handle to one version of a logical key.
///
/// The material is zeroized when the handle is dropped.
#[derive(Clone)]
pub struct KeyHandle {
    /// Logical key id.
    pub key_id: String,
    /// Version of the logical key this material belongs to.
    pub version: u32,
    /// Raw key material.
    pub material: SecretBytes,
}

impl std::fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyHandle")
            .field("key_id", &self.key_id)
            .field("version", &self.version)
            .field("material", &self.material)
            .finish()
    }
}

/// Capability interface for sourcing symmetric keys.
///
/// Implementations: [`TransitKeyProvider`] (backend-wrapped data keys) and
/// [`LocalKeyProvider`] (in-process keyring at the HSM boundary).
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Current key version for new encryptions; provisions the key on first
    /// use.
    async fn current_key(&self, key_id: &str) -> Result<KeyHandle>;

    /// A specific key version, for decrypting legacy ciphertext.
    async fn key_version(&self, key_id: &str, version: u32) -> Result<KeyHandle>;

    /// Advance the logical key to a new version. Old versions remain
    /// available until [`KeyProvider::purge`].
    async fn rotate(&self, key_id: &str) -> Result<u32>;

    /// Drop all cached key material from memory.
    async fn purge(&self);
}

/// In-process keyring.
///
/// Stands at the HSM boundary: deployments backed by a hardware module
/// implement [`KeyProvider`] the same way, with generation and storage on
/// the module. Keys live only in memory and zero on drop.
#[derive(Default)]
pub struct LocalKeyProvider {
    keys: DashMap<String, Vec<SecretBytes>>,
}

impl LocalKeyProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn generate() -> SecretBytes {
        let mut material = vec![0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut material);
        SecretBytes::new(material)
    }
}

#[async_trait]
impl KeyProvider for LocalKeyProvider {
    async fn current_key(&self, key_id: &str) -> Result<KeyHandle> {
        let versions = self.keys.entry(key_id.to_string()).or_insert_with(|| vec![Self::generate()]);
        Ok(KeyHandle {
            key_id: key_id.to_string(),
            version: versions.len() as u32,
            material: versions.last().expect("at least one version").clone(),
        })
    }

    async fn key_version(&self, key_id: &str, version: u32) -> Result<KeyHandle> {
        let versions = self
            .keys
            .get(key_id)
            .ok_or_else(|| Error::not_found("encryption key", key_id))?;
        let material = version
            .checked_sub(1)
            .and_then(|idx| versions.get(idx as usize))
            .cloned()
            .ok_or_else(|| {
                Error::integrity(format!("No version {} of key '{}'", version, key_id))
            })?;
        Ok(KeyHandle { key_id: key_id.to_string(), version, material })
    }

    async fn rotate(&self, key_id: &str) -> Result<u32> {
        let mut versions = self.keys.entry(key_id.to_string()).or_default();
        versions.push(Self::generate());
        Ok(versions.len() as u32)
    }

    async fn purge(&self) {
        // SecretBytes zeroizes on drop.
        self.keys.clear();
    }
}

/// Wrapped data key stored in the backend for a transit-backed logical key.
#[derive(serde::Serialize, serde::Deserialize)]
struct WrappedDataKey {
    wrapped: String,
}

struct CachedKey {
    material: SecretBytes,
    cached_at: Instant,
}

/// Backend-transit-backed provider using the data-key pattern.
///
/// Each logical key version is a locally generated 256-bit data key wrapped
/// by the backend's transit engine; the wrapping master key never leaves the
/// backend. Wrapped keys are persisted in the KV store under
/// `{prefix}/{key_id}/v{version}`; unwrapped material is cached in memory
/// with a bounded TTL.
pub struct TransitKeyProvider {
    store: Arc<dyn SecretStore>,
    /// KV prefix for wrapped data keys.
    prefix: String,
    /// Transit key that wraps data keys.
    wrapping_key: String,
    cache: DashMap<(String, u32), CachedKey>,
    cache_ttl: Duration,
}

impl TransitKeyProvider {
    pub fn new(store: Arc<dyn SecretStore>, cache_ttl: Duration) -> Self {
        Self {
            store,
            prefix: "trustplane/data-keys".to_string(),
            wrapping_key: "trustplane-master".to_string(),
            cache: DashMap::new(),
            cache_ttl,
        }
    }

    /// Override the KV prefix for wrapped keys.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Override the transit wrapping key name.
    pub fn with_wrapping_key(mut self, key: impl Into<String>) -> Self {
        self.wrapping_key = key.into();
        self
    }

    fn key_path(&self, key_id: &str, version: u32) -> String {
        format!("{}/{}/v{}", self.prefix, key_id, version)
    }

    fn version_index_path(&self, key_id: &str) -> String {
        format!("{}/{}/current", self.prefix, key_id)
    }

    async fn current_version(&self, key_id: &str) -> Result<Option<u32>> {
        let record = self.store.get(&self.version_index_path(key_id)).await?;
        Ok(record.and_then(|r| r.value.get("version").and_then(|v| v.as_u64())).map(|v| v as u32))
    }

    async fn unwrap_version(&self, key_id: &str, version: u32) -> Result<SecretBytes> {
        if let Some(cached) = self.cache.get(&(key_id.to_string(), version)) {
            if cached.cached_at.elapsed() <= self.cache_ttl {
                return Ok(cached.material.clone());
            }
        }

        let record = self
            .store
            .get(&self.key_path(key_id, version))
            .await?
            .ok_or_else(|| {
                Error::integrity(format!("No version {} of key '{}'", version, key_id))
            })?;
        let wrapped: WrappedDataKey = serde_json::from_value(record.value)?;

        let material = self
            .store
            .transit_decrypt(&self.wrapping_key, &wrapped.wrapped, Some(key_id.as_bytes()))
            .await?;
        let material = SecretBytes::new(material);

        self.cache.insert(
            (key_id.to_string(), version),
            CachedKey { material: material.clone(), cached_at: Instant::now() },
        );
        Ok(material)
    }

    async fn provision_version(&self, key_id: &str, version: u32) -> Result<SecretBytes> {
        let mut material = vec![0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut material);

        let wrapped = self
            .store
            .transit_encrypt(&self.wrapping_key, &material, Some(key_id.as_bytes()))
            .await?;

        self.store
            .put(
                &self.key_path(key_id, version),
                serde_json::to_value(WrappedDataKey { wrapped })?,
                None,
            )
            .await?;
        self.store
            .put(
                &self.version_index_path(key_id),
                serde_json::json!({ "version": version }),
                None,
            )
            .await?;

        let material = SecretBytes::new(material);
        self.cache.insert(
            (key_id.to_string(), version),
            CachedKey { material: material.clone(), cached_at: Instant::now() },
        );
        tracing::info!(key_id = %key_id, version = version, "Provisioned wrapped data key");
        Ok(material)
    }
}

#[async_trait]
impl KeyProvider for TransitKeyProvider {
    async fn current_key(&self, key_id: &str) -> Result<KeyHandle> {
        match self.current_version(key_id).await? {
            Some(version) => {
                let material = self.unwrap_version(key_id, version).await?;
                Ok(KeyHandle { key_id: key_id.to_string(), version, material })
            }
            None => {
                let material = self.provision_version(key_id, 1).await?;
                Ok(KeyHandle { key_id: key_id.to_string(), version: 1, material })
            }
        }
    }

    async fn key_version(&self, key_id: &str, version: u32) -> Result<KeyHandle> {
        let material = self.unwrap_version(key_id, version).await?;
        Ok(KeyHandle { key_id: key_id.to_string(), version, material })
    }

    async fn rotate(&self, key_id: &str) -> Result<u32> {
        let next = self.current_version(key_id).await?.unwrap_or(0) + 1;
        self.provision_version(key_id, next).await?;
        Ok(next)
    }

    async fn purge(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::secrets::memory::MemorySecretStore;

    #[tokio::test]
    async fn local_provider_provisions_on_first_use() {
        let provider = LocalKeyProvider::new();
        let handle = provider.current_key("app-data").await.unwrap();
        assert_eq!(handle.version, 1);
        assert_eq!(handle.material.len(), KEY_LEN);

        // Same key comes back on subsequent calls.
        let again = provider.current_key("app-data").await.unwrap();
        assert_eq!(handle.material, again.material);
    }

    #[tokio::test]
    async fn local_provider_rotation_retains_old_versions() {
        let provider = LocalKeyProvider::new();
        let v1 = provider.current_key("app-data").await.unwrap();
        let next = provider.rotate("app-data").await.unwrap();
        assert_eq!(next, 2);

        let current = provider.current_key("app-data").await.unwrap();
        assert_eq!(current.version, 2);
        assert_ne!(current.material, v1.material);

        let old = provider.key_version("app-data", 1).await.unwrap();
        assert_eq!(old.material, v1.material);
    }

    #[tokio::test]
    async fn local_provider_purge_drops_material() {
        let provider = LocalKeyProvider::new();
        provider.current_key("app-data").await.unwrap();
        provider.purge().await;
        assert!(provider.key_version("app-data", 1).await.is_err());
    }

    #[tokio::test]
    async fn transit_provider_round_trips_through_backend() {
        let store = Arc::new(MemorySecretStore::new(EventBus::new()));
        let provider = TransitKeyProvider::new(store.clone(), Duration::from_secs(60));

        let handle = provider.current_key("app-data").await.unwrap();
        assert_eq!(handle.version, 1);

        // A second provider instance over the same backend recovers the same
        // material by unwrapping the persisted data key.
        let other = TransitKeyProvider::new(store, Duration::from_secs(60));
        let recovered = other.current_key("app-data").await.unwrap();
        assert_eq!(handle.material, recovered.material);
    }

    #[tokio::test]
    async fn transit_provider_rotation_advances_current() {
        let store = Arc::new(MemorySecretStore::new(EventBus::new()));
        let provider = TransitKeyProvider::new(store, Duration::from_secs(60));

        let v1 = provider.current_key("app-data").await.unwrap();
        assert_eq!(provider.rotate("app-data").await.unwrap(), 2);

        let current = provider.current_key("app-data").await.unwrap();
        assert_eq!(current.version, 2);
        assert_ne!(current.material, v1.material);

        // Legacy ciphertext still decryptable: old version remains readable.
        let old = provider.key_version("app-data", 1).await.unwrap();
        assert_eq!(old.material, v1.material);
    }

    #[tokio::test]
    async fn transit_provider_unknown_version_is_integrity_error() {
        let store = Arc::new(MemorySecretStore::new(EventBus::new()));
        let provider = TransitKeyProvider::new(store, Duration::from_secs(60));
        provider.current_key("app-data").await.unwrap();

        let err = provider.key_version("app-data", 9).await.unwrap_err();
        assert!(matches!(err, Error::Integrity { .. }));
    }
}
