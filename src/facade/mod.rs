//! Application-facing SDK facade.
//!
//! [`SecretsFacade`] composes the secret store and the encryption engine
//! behind a caching, retrying surface for application callers:
//!
//! - read-through cache with TTL, invalidated on write/delete
//! - bounded retry with exponential backoff for retryable (connection /
//!   timeout) errors only: integrity and authorization failures propagate
//!   immediately
//! - bulk reads, field encryption, dynamic database credentials
//! - configuration documents with embedded `ref:<path>` secret references
//! - scoped accessors bound to a path prefix
//!
//! The cache is advisory: the backend owns every record, and a cached copy
//! is dropped on any local write or delete of its path.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::crypto::engine::{EncryptedEnvelope, EncryptionEngine};
use crate::errors::{Error, Result};
use crate::events::{EventBus, TrustEvent, TrustEventKind};
use crate::observability::{HealthCheck, HealthChecker, HealthStatus};
use crate::secrets::record::{DatabaseCredentials, SecretRecord, SecretRecordMetadata};
use crate::secrets::store::SecretStore;

const COMPONENT: &str = "facade";

/// Maximum depth of `ref:` indirection in configuration documents.
const MAX_REF_DEPTH: usize = 8;

/// Prefix marking an embedded secret reference in a config document.
const REF_PREFIX: &str = "ref:";

/// Per-call options for [`SecretsFacade::get_secret`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GetOptions {
    /// Skip the cache and read from the backend.
    pub bypass_cache: bool,
}

/// Bounded retry with exponential backoff, applied to retryable errors only.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_backoff: Duration::from_millis(100) }
    }
}

#[derive(Clone)]
struct CachedSecret {
    record: SecretRecord,
    cached_at: Instant,
}

struct FacadeInner {
    store: Arc<dyn SecretStore>,
    engine: Arc<EncryptionEngine>,
    events: EventBus,
    health: HealthChecker,
    cache: RwLock<HashMap<String, CachedSecret>>,
    cache_ttl: Duration,
    retry: RetryPolicy,
    /// Caller identity recorded on audit events for reads/decrypts.
    actor: String,
}

/// Caching, retrying facade over the trust core.
#[derive(Clone)]
pub struct SecretsFacade {
    inner: Arc<FacadeInner>,
}

impl SecretsFacade {
    pub fn new(
        store: Arc<dyn SecretStore>,
        engine: Arc<EncryptionEngine>,
        events: EventBus,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(FacadeInner {
                store,
                engine,
                events,
                health: HealthChecker::new(),
                cache: RwLock::new(HashMap::new()),
                cache_ttl,
                retry: RetryPolicy::default(),
                actor: "application".to_string(),
            }),
        }
    }

    /// Set the caller identity recorded on audit events. Call before
    /// sharing the facade.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.actor = actor.into(),
            None => tracing::warn!("with_actor called on a shared facade, keeping existing actor"),
        }
        self
    }

    /// Override the retry policy. Call before sharing the facade.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.retry = retry;
        }
        self
    }

    /// Run an operation with bounded retries on retryable errors.
    async fn with_retries<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let policy = self.inner.retry;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                    let backoff = policy.base_backoff * 2u32.saturating_pow(attempt - 1);
                    tracing::warn!(
                        operation = %operation,
                        attempt = attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Retryable backend failure, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Read a secret, serving from cache inside the TTL.
    pub async fn get_secret(
        &self,
        path: &str,
        opts: GetOptions,
    ) -> Result<Option<SecretRecord>> {
        if !opts.bypass_cache {
            let cache = self.inner.cache.read().await;
            if let Some(cached) = cache.get(path) {
                if cached.cached_at.elapsed() <= self.inner.cache_ttl {
                    tracing::debug!(path = %path, "Secret cache hit");
                    return Ok(Some(cached.record.clone()));
                }
            }
        }

        let record = self
            .with_retries("get_secret", || self.inner.store.get(path))
            .await?;

        if let Some(record) = &record {
            let mut cache = self.inner.cache.write().await;
            cache.insert(
                path.to_string(),
                CachedSecret { record: record.clone(), cached_at: Instant::now() },
            );
        }
        Ok(record)
    }

    /// Read many secrets concurrently. Missing paths map to `None`; the
    /// first non-retryable error fails the call.
    pub async fn get_bulk_secrets(
        &self,
        paths: &[&str],
    ) -> Result<HashMap<String, Option<SecretRecord>>> {
        let reads = paths
            .iter()
            .map(|path| async move {
                let record = self.get_secret(path, GetOptions::default()).await?;
                Ok::<_, Error>((path.to_string(), record))
            })
            .collect::<Vec<_>>();

        let results = futures::future::try_join_all(reads).await?;
        Ok(results.into_iter().collect())
    }

    /// Write a secret through to the backend and refresh the cache.
    pub async fn store_secret(
        &self,
        path: &str,
        value: serde_json::Value,
        metadata: Option<SecretRecordMetadata>,
    ) -> Result<SecretRecord> {
        let record = self
            .with_retries("store_secret", || {
                self.inner.store.put(path, value.clone(), metadata.clone())
            })
            .await?;

        let mut cache = self.inner.cache.write().await;
        cache.insert(
            path.to_string(),
            CachedSecret { record: record.clone(), cached_at: Instant::now() },
        );
        Ok(record)
    }

    /// Delete a secret and drop it from the cache.
    pub async fn delete_secret(&self, path: &str) -> Result<()> {
        self.with_retries("delete_secret", || self.inner.store.delete(path)).await?;
        self.inner.cache.write().await.remove(path);
        Ok(())
    }

    /// List secret paths under a prefix (never cached).
    pub async fn list_secrets(&self, prefix: &str) -> Result<Vec<String>> {
        self.with_retries("list_secrets", || self.inner.store.list(prefix)).await
    }

    /// Encrypt a field value into an envelope.
    pub async fn encrypt_field(
        &self,
        data: &[u8],
        key_id: Option<&str>,
        context: Option<&[u8]>,
    ) -> Result<EncryptedEnvelope> {
        self.inner.engine.encrypt(data, key_id, context).await
    }

    /// Decrypt an envelope. The caller identity configured on the facade is
    /// recorded on the audit stream, success or failure.
    pub async fn decrypt_field(
        &self,
        envelope: &EncryptedEnvelope,
        context: Option<&[u8]>,
    ) -> Result<Vec<u8>> {
        let result = self.inner.engine.decrypt(envelope, context).await;
        let event = match &result {
            Ok(_) => TrustEvent::success(
                TrustEventKind::SecretRead,
                envelope.key_id.clone(),
                self.inner.actor.clone(),
                COMPONENT,
            ),
            Err(e) => TrustEvent::failure(
                TrustEventKind::SecretRead,
                envelope.key_id.clone(),
                self.inner.actor.clone(),
                COMPONENT,
                e.to_string(),
            ),
        };
        self.inner.events.publish(event.with_metadata(serde_json::json!({
            "operation": "decrypt_field",
        })));
        result
    }

    /// Issue short-lived database credentials.
    pub async fn get_database_credentials(&self, role: &str) -> Result<DatabaseCredentials> {
        self.with_retries("get_database_credentials", || {
            self.inner.store.issue_database_credentials(role)
        })
        .await
    }

    /// Read a configuration document and resolve embedded `ref:<path>`
    /// secret references, recursively.
    pub async fn get_app_config(&self, path: &str) -> Result<serde_json::Value> {
        let record = self
            .get_secret(path, GetOptions::default())
            .await?
            .ok_or_else(|| Error::not_found("configuration", path))?;
        self.resolve_refs(record.value, 0).await
    }

    fn resolve_refs(
        &self,
        value: serde_json::Value,
        depth: usize,
    ) -> futures::future::BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            if depth > MAX_REF_DEPTH {
                return Err(Error::validation(format!(
                    "Secret reference chain exceeds {} levels",
                    MAX_REF_DEPTH
                )));
            }
            match value {
                serde_json::Value::String(s) => match s.strip_prefix(REF_PREFIX) {
                    Some(ref_path) => {
                        let record = self
                            .get_secret(ref_path, GetOptions::default())
                            .await?
                            .ok_or_else(|| Error::not_found("referenced secret", ref_path))?;
                        self.resolve_refs(record.value, depth + 1).await
                    }
                    None => Ok(serde_json::Value::String(s)),
                },
                serde_json::Value::Object(map) => {
                    let mut out = serde_json::Map::new();
                    for (k, v) in map {
                        out.insert(k, self.resolve_refs(v, depth).await?);
                    }
                    Ok(serde_json::Value::Object(out))
                }
                serde_json::Value::Array(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(self.resolve_refs(item, depth).await?);
                    }
                    Ok(serde_json::Value::Array(out))
                }
                scalar => Ok(scalar),
            }
        })
    }

    /// A typed accessor scoped to a path prefix.
    pub fn scoped(&self, base_path: impl Into<String>) -> ScopedAccessor {
        ScopedAccessor { facade: self.clone(), base_path: base_path.into() }
    }

    /// Drop every cached secret.
    pub async fn invalidate_cache(&self) {
        let mut cache = self.inner.cache.write().await;
        let count = cache.len();
        cache.clear();
        tracing::info!(count, "Invalidated facade secret cache");
    }

    /// Number of cached secrets.
    pub async fn cache_size(&self) -> usize {
        self.inner.cache.read().await.len()
    }

    /// Probe the backing components and report overall health.
    pub async fn health_check(&self) -> HealthStatus {
        let store_check = if self.inner.store.is_healthy().await {
            HealthCheck::healthy("secret-store")
        } else {
            HealthCheck::unhealthy("secret-store", "backend unreachable")
        };
        self.inner.health.report(store_check).await;
        self.inner.health.overall().await
    }
}

/// Scoped get/set/delete/list under a base path.
pub struct ScopedAccessor {
    facade: SecretsFacade,
    base_path: String,
}

impl ScopedAccessor {
    fn full_path(&self, relative: &str) -> String {
        format!("{}/{}", self.base_path.trim_end_matches('/'), relative)
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub async fn get(&self, relative: &str) -> Result<Option<SecretRecord>> {
        self.facade.get_secret(&self.full_path(relative), GetOptions::default()).await
    }

    pub async fn set(
        &self,
        relative: &str,
        value: serde_json::Value,
    ) -> Result<SecretRecord> {
        self.facade.store_secret(&self.full_path(relative), value, None).await
    }

    pub async fn delete(&self, relative: &str) -> Result<()> {
        self.facade.delete_secret(&self.full_path(relative)).await
    }

    pub async fn list(&self) -> Result<Vec<String>> {
        self.facade.list_secrets(&self.base_path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncryptionConfig;
    use crate::crypto::provider::LocalKeyProvider;
    use crate::secrets::memory::MemorySecretStore;

    async fn facade() -> (Arc<MemorySecretStore>, SecretsFacade) {
        let events = EventBus::new();
        let store = Arc::new(MemorySecretStore::new(events.clone()));
        let engine = EncryptionEngine::initialize(
            Arc::new(LocalKeyProvider::new()),
            EncryptionConfig::default(),
            events.clone(),
        )
        .await
        .unwrap();
        let facade = SecretsFacade::new(
            store.clone(),
            engine,
            events,
            Duration::from_secs(60),
        )
        .with_actor("test-suite");
        (store, facade)
    }

    #[tokio::test]
    async fn cache_serves_repeat_reads_and_write_invalidates() {
        let (store, facade) = facade().await;
        store.put("app/token", serde_json::json!({"v": 1}), None).await.unwrap();

        let first = facade.get_secret("app/token", GetOptions::default()).await.unwrap().unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(facade.cache_size().await, 1);

        // Backend changes behind the cache are not observed inside the TTL...
        store.put("app/token", serde_json::json!({"v": 2}), None).await.unwrap();
        let cached = facade.get_secret("app/token", GetOptions::default()).await.unwrap().unwrap();
        assert_eq!(cached.version, 1);

        // ...but a bypass read sees them,
        let fresh = facade
            .get_secret("app/token", GetOptions { bypass_cache: true })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fresh.version, 2);

        // and a local write refreshes the cached copy.
        facade.store_secret("app/token", serde_json::json!({"v": 3}), None).await.unwrap();
        let after = facade.get_secret("app/token", GetOptions::default()).await.unwrap().unwrap();
        assert_eq!(after.value["v"], 3);
    }

    #[tokio::test]
    async fn missing_secret_is_none_and_uncached() {
        let (_, facade) = facade().await;
        let record = facade.get_secret("app/none", GetOptions::default()).await.unwrap();
        assert!(record.is_none());
        assert_eq!(facade.cache_size().await, 0);
    }

    #[tokio::test]
    async fn delete_drops_cache_entry() {
        let (store, facade) = facade().await;
        store.put("app/token", serde_json::json!(1), None).await.unwrap();
        facade.get_secret("app/token", GetOptions::default()).await.unwrap();
        assert_eq!(facade.cache_size().await, 1);

        facade.delete_secret("app/token").await.unwrap();
        assert_eq!(facade.cache_size().await, 0);
        assert!(facade
            .get_secret("app/token", GetOptions::default())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn bulk_reads_return_per_path_results() {
        let (store, facade) = facade().await;
        store.put("app/a", serde_json::json!("a"), None).await.unwrap();
        store.put("app/b", serde_json::json!("b"), None).await.unwrap();

        let results = facade.get_bulk_secrets(&["app/a", "app/b", "app/missing"]).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results["app/a"].is_some());
        assert!(results["app/b"].is_some());
        assert!(results["app/missing"].is_none());
    }

    #[tokio::test]
    async fn field_encryption_round_trips_through_facade() {
        let (_, facade) = facade().await;
        let envelope = facade
            .encrypt_field(b"card-number", None, Some(b"customer-1"))
            .await
            .unwrap();
        let plaintext = facade.decrypt_field(&envelope, Some(b"customer-1")).await.unwrap();
        assert_eq!(plaintext, b"card-number");

        // Integrity failures are not retried and propagate immediately.
        let err = facade.decrypt_field(&envelope, Some(b"customer-2")).await.unwrap_err();
        assert!(matches!(err, Error::Integrity { .. }));
    }

    #[tokio::test]
    async fn app_config_resolves_refs_recursively() {
        let (store, facade) = facade().await;
        store
            .put("app/db-password", serde_json::json!("hunter2"), None)
            .await
            .unwrap();
        store
            .put("app/indirect", serde_json::json!("ref:app/db-password"), None)
            .await
            .unwrap();
        store
            .put(
                "config/service",
                serde_json::json!({
                    "listen": "0.0.0.0:8080",
                    "database": { "password": "ref:app/db-password", "pool": 8 },
                    "chained": "ref:app/indirect",
                }),
                None,
            )
            .await
            .unwrap();

        let config = facade.get_app_config("config/service").await.unwrap();
        assert_eq!(config["listen"], "0.0.0.0:8080");
        assert_eq!(config["database"]["password"], "hunter2");
        assert_eq!(config["database"]["pool"], 8);
        assert_eq!(config["chained"], "hunter2");
    }

    #[tokio::test]
    async fn app_config_ref_cycle_is_bounded() {
        let (store, facade) = facade().await;
        store.put("cfg/a", serde_json::json!("ref:cfg/b"), None).await.unwrap();
        store.put("cfg/b", serde_json::json!("ref:cfg/a"), None).await.unwrap();

        let err = facade.get_app_config("cfg/a").await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn scoped_accessor_prefixes_paths() {
        let (store, facade) = facade().await;
        let scoped = facade.scoped("services/payments");

        scoped.set("api-key", serde_json::json!("k")).await.unwrap();
        assert!(store.get("services/payments/api-key").await.unwrap().is_some());

        let record = scoped.get("api-key").await.unwrap().unwrap();
        assert_eq!(record.value, "k");

        let listed = scoped.list().await.unwrap();
        assert_eq!(listed, vec!["services/payments/api-key"]);

        scoped.delete("api-key").await.unwrap();
        assert!(scoped.get("api-key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn health_check_reflects_backend() {
        let (store, facade) = facade().await;
        assert!(facade.health_check().await.is_healthy());

        store.close().await;
        let status = facade.health_check().await;
        assert!(!status.is_operational());
    }

    #[tokio::test]
    async fn non_retryable_errors_are_not_retried() {
        let (store, facade) = facade().await;
        store.set_fail_writes(true);
        // Backend error (not connection): surfaces immediately.
        let err = facade
            .store_secret("app/x", serde_json::json!(1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Backend { .. }));
    }
}
