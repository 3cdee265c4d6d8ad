//! HashiCorp Vault secret-store implementation.
//!
//! Implements [`SecretStore`] against Vault's KV v2, transit, database, and
//! PKI secrets engines via `vaultrs`. Supports token, AppRole, Kubernetes
//! service-account, and AWS-IAM authentication, with proactive session
//! renewal (`ttl − safety_buffer`) and full re-authentication when a renewal
//! fails.
//!
//! # Security
//!
//! - All communication uses TLS (backend address decides)
//! - Tokens and secret values are never logged
//! - Transit operations keep raw key material inside Vault
//! - Every state-changing call publishes a lifecycle event
//!
//! # Example
//!
//! ```rust,ignore
//! use trustplane::config::StoreConfig;
//! use trustplane::events::EventBus;
//! use trustplane::secrets::{AuthMethod, SecretString, VaultAuth, VaultSecretStore};
//!
//! let auth = VaultAuth::new(AuthMethod::AppRole {
//!     role_id: "trustplane".into(),
//!     secret_id: SecretString::new("..."),
//! });
//! let store = VaultSecretStore::connect(StoreConfig::default(), auth, EventBus::new()).await?;
//! let record = store.get("app/database/primary").await?;
//! ```

use async_trait::async_trait;
use base64::Engine;
use vaultrs::client::Client;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;
use vaultrs::kv2;

use crate::config::StoreConfig;
use crate::errors::{Error, Result};
use crate::events::{EventBus, TrustEvent, TrustEventKind};
use crate::secrets::record::{
    validate_secret_path, CertificateAsset, CertificateParamsSpec, CertificateState,
    DatabaseCredentials, SecretRecord, SecretRecordMetadata, SessionLease,
};
use crate::secrets::store::{AuthMethod, SecretStore};
use crate::secrets::types::SecretString;

const COMPONENT: &str = "secrets.vault";

/// Actor recorded on events emitted by the store itself.
const STORE_ACTOR: &str = "secret-store";

/// Authentication method plus the auth mount it lives under.
#[derive(Debug, Clone)]
pub struct VaultAuth {
    pub method: AuthMethod,
    pub mount: String,
}

impl VaultAuth {
    /// Wrap a method with the conventional mount for its kind.
    pub fn new(method: AuthMethod) -> Self {
        let mount = match &method {
            AuthMethod::Token { .. } => "token",
            AuthMethod::AppRole { .. } => "approle",
            AuthMethod::PlatformIdentity { .. } => "kubernetes",
            AuthMethod::CloudIam { .. } => "aws",
        }
        .to_string();
        Self { method, mount }
    }

    /// Override the auth mount path.
    pub fn with_mount(mut self, mount: impl Into<String>) -> Self {
        self.mount = mount.into();
        self
    }
}

/// Payload stored at each KV path. The record metadata rides along with the
/// value so a single read returns both.
#[derive(Debug, Serialize, Deserialize)]
struct StoredSecret {
    value: serde_json::Value,
    metadata: SecretRecordMetadata,
}

/// Vault-backed secret store.
///
/// Cheap to share: wrap in `Arc` (see [`VaultSecretStore::connect`], which
/// already returns one and spawns the renewal task against it).
pub struct VaultSecretStore {
    client: RwLock<VaultClient>,
    config: StoreConfig,
    auth: VaultAuth,
    events: EventBus,
    lease: RwLock<Option<SessionLease>>,
    renewal_task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl VaultSecretStore {
    /// Connect, authenticate, and start the session-renewal task.
    pub async fn connect(
        config: StoreConfig,
        auth: VaultAuth,
        events: EventBus,
    ) -> Result<Arc<Self>> {
        if config.address.is_empty() {
            return Err(Error::validation("Vault address cannot be empty"));
        }

        let settings = VaultClientSettingsBuilder::default()
            .address(&config.address)
            .build()
            .map_err(|e| Error::validation(format!("Invalid Vault configuration: {}", e)))?;

        let client = VaultClient::new(settings)
            .map_err(|e| Error::connection(format!("Failed to create Vault client: {}", e)))?;

        let store = Arc::new(Self {
            client: RwLock::new(client),
            config,
            auth,
            events,
            lease: RwLock::new(None),
            renewal_task: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        store.authenticate().await?;
        store.spawn_renewal_task().await;

        Ok(store)
    }

    /// Spawn the background task that renews the session at
    /// `ttl − safety_buffer` and falls back to full re-authentication on
    /// renewal failure.
    async fn spawn_renewal_task(self: &Arc<Self>) {
        let store = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                let wait = {
                    let lease = store.lease.read().await;
                    match lease.as_ref() {
                        Some(lease) => lease.renew_after(Duration::from_secs(
                            store.config.renewal_safety_buffer_secs,
                        )),
                        None => Duration::from_secs(store.config.renewal_safety_buffer_secs),
                    }
                };
                tokio::time::sleep(wait).await;

                if store.closed.load(Ordering::SeqCst) {
                    break;
                }

                match store.renew_session().await {
                    Ok(lease) => {
                        tracing::debug!(ttl_secs = lease.ttl.as_secs(), "Renewed Vault session");
                    }
                    Err(renew_err) => {
                        tracing::warn!(
                            error = %renew_err,
                            "Session renewal failed, re-authenticating"
                        );
                        store.events.publish(TrustEvent::failure(
                            TrustEventKind::SessionRenewalFailed,
                            store.config.address.clone(),
                            STORE_ACTOR,
                            COMPONENT,
                            renew_err.to_string(),
                        ));
                        if let Err(auth_err) = store.authenticate().await {
                            tracing::error!(
                                error = %auth_err,
                                "Re-authentication after failed renewal also failed"
                            );
                        }
                    }
                }
            }
        });
        *self.renewal_task.lock().await = Some(handle);
    }

    /// Run a backend call under the configured per-call timeout.
    async fn with_timeout<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let timeout = self.config.request_timeout();
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(operation, timeout.as_millis() as u64)),
        }
    }

    fn map_error(context: &str, err: ClientError) -> Error {
        match err {
            ClientError::APIError { code: 403, .. } => {
                Error::auth(format!("{}: permission denied", context))
            }
            ClientError::APIError { code, errors } => {
                Error::backend(format!("{}: HTTP {}: {}", context, code, errors.join("; ")))
            }
            other => Error::connection(format!("{}: {}", context, other)),
        }
    }

    fn is_not_found(err: &ClientError) -> bool {
        matches!(err, ClientError::APIError { code: 404, .. })
    }

    fn is_permission_denied(err: &ClientError) -> bool {
        matches!(err, ClientError::APIError { code: 403, .. })
    }

    async fn read_stored(&self, path: &str) -> std::result::Result<StoredSecret, ClientError> {
        let client = self.client.read().await;
        kv2::read::<StoredSecret>(&*client, &self.config.kv_mount, path).await
    }

    async fn read_version(&self, path: &str) -> u64 {
        let client = self.client.read().await;
        match kv2::read_metadata(&*client, &self.config.kv_mount, path).await {
            Ok(meta) => meta.current_version,
            Err(e) => {
                tracing::warn!(error = %e, path = %path, "Failed to read secret version metadata");
                0
            }
        }
    }

    fn publish(&self, kind: TrustEventKind, subject: &str, success: bool, error: Option<String>) {
        let event = match error {
            None => TrustEvent::success(kind, subject, STORE_ACTOR, COMPONENT),
            Some(e) => TrustEvent::failure(kind, subject, STORE_ACTOR, COMPONENT, e),
        };
        debug_assert_eq!(event.success, success);
        self.events.publish(event);
    }
}

#[async_trait]
impl SecretStore for VaultSecretStore {
    async fn authenticate(&self) -> Result<SessionLease> {
        let lease = match &self.auth.method {
            AuthMethod::Token { token } => {
                {
                    let mut client = self.client.write().await;
                    client.set_token(token.expose());
                }
                let client = self.client.read().await;
                let info = self
                    .with_timeout("auth.lookup_self", async {
                        vaultrs::token::lookup_self(&*client)
                            .await
                            .map_err(|e| Self::map_error("Token lookup failed", e))
                    })
                    .await
                    .map_err(|e| Error::auth(e.to_string()))?;
                SessionLease {
                    ttl: Duration::from_secs(info.ttl),
                    renewable: info.renewable,
                    policies: info.policies,
                    issued_at: Utc::now(),
                }
            }
            AuthMethod::AppRole { role_id, secret_id } => {
                let info = {
                    let client = self.client.read().await;
                    self.with_timeout("auth.approle", async {
                        vaultrs::auth::approle::login(
                            &*client,
                            &self.auth.mount,
                            role_id,
                            secret_id.expose(),
                        )
                        .await
                        .map_err(|e| Error::auth(format!("AppRole login failed: {}", e)))
                    })
                    .await?
                };
                let mut client = self.client.write().await;
                client.set_token(&info.client_token);
                SessionLease {
                    ttl: Duration::from_secs(info.lease_duration),
                    renewable: info.renewable,
                    policies: info.policies,
                    issued_at: Utc::now(),
                }
            }
            AuthMethod::PlatformIdentity { role, jwt } => {
                let info = {
                    let client = self.client.read().await;
                    self.with_timeout("auth.kubernetes", async {
                        vaultrs::auth::kubernetes::login(
                            &*client,
                            &self.auth.mount,
                            role,
                            jwt.expose(),
                        )
                        .await
                        .map_err(|e| Error::auth(format!("Kubernetes login failed: {}", e)))
                    })
                    .await?
                };
                let mut client = self.client.write().await;
                client.set_token(&info.client_token);
                SessionLease {
                    ttl: Duration::from_secs(info.lease_duration),
                    renewable: info.renewable,
                    policies: info.policies,
                    issued_at: Utc::now(),
                }
            }
            AuthMethod::CloudIam {
                role,
                request_method,
                request_url,
                request_body,
                request_headers,
            } => {
                let info = {
                    let client = self.client.read().await;
                    self.with_timeout("auth.aws_iam", async {
                        vaultrs::auth::aws::iam_login(
                            &*client,
                            &self.auth.mount,
                            request_method,
                            request_url,
                            request_body,
                            request_headers,
                            Some(role.as_str()),
                        )
                        .await
                        .map_err(|e| Error::auth(format!("AWS IAM login failed: {}", e)))
                    })
                    .await?
                };
                let mut client = self.client.write().await;
                client.set_token(&info.client_token);
                SessionLease {
                    ttl: Duration::from_secs(info.lease_duration),
                    renewable: info.renewable,
                    policies: info.policies,
                    issued_at: Utc::now(),
                }
            }
        };

        *self.lease.write().await = Some(lease.clone());

        tracing::info!(
            method = self.auth.method.kind(),
            ttl_secs = lease.ttl.as_secs(),
            renewable = lease.renewable,
            "Authenticated to secret store"
        );
        self.publish(
            TrustEventKind::SessionAuthenticated,
            &self.config.address,
            true,
            None,
        );

        Ok(lease)
    }

    async fn renew_session(&self) -> Result<SessionLease> {
        let current = self.lease.read().await.clone();
        let renewable = current.as_ref().map(|l| l.renewable).unwrap_or(false);
        if !renewable {
            return Err(Error::auth("Session is not renewable"));
        }

        let info = {
            let client = self.client.read().await;
            self.with_timeout("auth.renew_self", async {
                vaultrs::token::renew_self(&*client, None)
                    .await
                    .map_err(|e| Self::map_error("Token renewal failed", e))
            })
            .await?
        };

        let lease = SessionLease {
            ttl: Duration::from_secs(info.lease_duration),
            renewable: info.renewable,
            policies: info.policies,
            issued_at: Utc::now(),
        };
        *self.lease.write().await = Some(lease.clone());

        self.publish(TrustEventKind::SessionRenewed, &self.config.address, true, None);
        Ok(lease)
    }

    async fn get(&self, path: &str) -> Result<Option<SecretRecord>> {
        validate_secret_path(path)?;

        let mut attempt = self
            .with_timeout("kv.get", async { Ok(self.read_stored(path).await) })
            .await?;

        // An expired session surfaces as permission-denied; one transparent
        // re-authentication is attempted before the error propagates.
        if let Err(ref e) = attempt {
            if Self::is_permission_denied(e) {
                tracing::warn!(path = %path, "Read denied, attempting re-authentication");
                self.authenticate().await?;
                attempt = self
                    .with_timeout("kv.get", async { Ok(self.read_stored(path).await) })
                    .await?;
            }
        }

        match attempt {
            Ok(stored) => {
                let version = self.read_version(path).await;
                self.publish(TrustEventKind::SecretRead, path, true, None);
                Ok(Some(SecretRecord {
                    path: path.to_string(),
                    value: stored.value,
                    version,
                    metadata: stored.metadata,
                }))
            }
            Err(e) if Self::is_not_found(&e) => Ok(None),
            Err(e) => {
                let err = Self::map_error("Failed to read secret", e);
                self.publish(TrustEventKind::SecretRead, path, false, Some(err.to_string()));
                Err(err)
            }
        }
    }

    async fn put(
        &self,
        path: &str,
        value: serde_json::Value,
        metadata: Option<SecretRecordMetadata>,
    ) -> Result<SecretRecord> {
        validate_secret_path(path)?;

        // Preserve created_at across versions when the path already exists.
        let mut metadata = metadata.unwrap_or_default();
        if let Ok(existing) = self.read_stored(path).await {
            metadata.created_at = existing.metadata.created_at;
        }
        metadata.updated_at = Utc::now();

        let stored = StoredSecret { value: value.clone(), metadata: metadata.clone() };
        let result = {
            let client = self.client.read().await;
            self.with_timeout("kv.put", async {
                kv2::set(&*client, &self.config.kv_mount, path, &stored)
                    .await
                    .map_err(|e| Self::map_error("Failed to write secret", e))
            })
            .await
        };

        match result {
            Ok(version_meta) => {
                tracing::info!(path = %path, version = version_meta.version, "Stored secret");
                self.publish(TrustEventKind::SecretStored, path, true, None);
                Ok(SecretRecord {
                    path: path.to_string(),
                    value,
                    version: version_meta.version,
                    metadata,
                })
            }
            Err(err) => {
                self.publish(TrustEventKind::SecretStored, path, false, Some(err.to_string()));
                Err(err)
            }
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        validate_secret_path(path)?;
        let result = {
            let client = self.client.read().await;
            self.with_timeout("kv.delete", async {
                kv2::delete_metadata(&*client, &self.config.kv_mount, path)
                    .await
                    .map_err(|e| Self::map_error("Failed to delete secret", e))
            })
            .await
        };

        match result {
            Ok(()) => {
                tracing::info!(path = %path, "Deleted secret");
                self.publish(TrustEventKind::SecretDeleted, path, true, None);
                Ok(())
            }
            Err(err) => {
                self.publish(TrustEventKind::SecretDeleted, path, false, Some(err.to_string()));
                Err(err)
            }
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let client = self.client.read().await;
        let result = self
            .with_timeout("kv.list", async {
                match kv2::list(&*client, &self.config.kv_mount, prefix).await {
                    Ok(keys) => Ok(keys),
                    Err(e) if Self::is_not_found(&e) => Ok(Vec::new()),
                    Err(e) => Err(Self::map_error("Failed to list secrets", e)),
                }
            })
            .await?;
        Ok(result)
    }

    async fn issue_database_credentials(&self, role: &str) -> Result<DatabaseCredentials> {
        let result = {
            let client = self.client.read().await;
            self.with_timeout("database.creds", async {
                vaultrs::database::role::creds(&*client, &self.config.database_mount, role)
                    .await
                    .map_err(|e| Self::map_error("Failed to issue database credentials", e))
            })
            .await
        };

        match result {
            Ok(creds) => {
                tracing::info!(role = %role, username = %creds.username, "Issued database credentials");
                self.publish(TrustEventKind::SecretRead, role, true, None);
                Ok(DatabaseCredentials {
                    username: creds.username,
                    password: SecretString::new(creds.password),
                    lease: SessionLease {
                        ttl: Duration::from_secs(self.config.default_lease_ttl_secs),
                        renewable: true,
                        policies: Vec::new(),
                        issued_at: Utc::now(),
                    },
                    role: role.to_string(),
                })
            }
            Err(err) => {
                self.publish(TrustEventKind::SecretRead, role, false, Some(err.to_string()));
                Err(err)
            }
        }
    }

    async fn transit_encrypt(
        &self,
        key_name: &str,
        plaintext: &[u8],
        context: Option<&[u8]>,
    ) -> Result<String> {
        let engine = base64::engine::general_purpose::STANDARD;
        let encoded = engine.encode(plaintext);
        let client = self.client.read().await;

        let mut opts = vaultrs::api::transit::requests::EncryptDataRequestBuilder::default();
        if let Some(context) = context {
            opts.context(engine.encode(context));
        }

        let response = self
            .with_timeout("transit.encrypt", async {
                vaultrs::transit::data::encrypt(
                    &*client,
                    &self.config.transit_mount,
                    key_name,
                    &encoded,
                    Some(&mut opts),
                )
                .await
                .map_err(|e| Self::map_error("Transit encryption failed", e))
            })
            .await?;

        Ok(response.ciphertext)
    }

    async fn transit_decrypt(
        &self,
        key_name: &str,
        ciphertext: &str,
        context: Option<&[u8]>,
    ) -> Result<Vec<u8>> {
        let engine = base64::engine::general_purpose::STANDARD;
        let client = self.client.read().await;

        let mut opts = vaultrs::api::transit::requests::DecryptDataRequestBuilder::default();
        if let Some(context) = context {
            opts.context(engine.encode(context));
        }

        let response = self
            .with_timeout("transit.decrypt", async {
                vaultrs::transit::data::decrypt(
                    &*client,
                    &self.config.transit_mount,
                    key_name,
                    ciphertext,
                    Some(&mut opts),
                )
                .await
                .map_err(|e| {
                    // A transit decrypt rejection is an integrity failure,
                    // not a generic backend error.
                    match e {
                        ClientError::APIError { code: 400, errors } => Error::integrity(format!(
                            "Transit decryption rejected: {}",
                            errors.join("; ")
                        )),
                        other => Self::map_error("Transit decryption failed", other),
                    }
                })
            })
            .await?;

        engine
            .decode(&response.plaintext)
            .map_err(|e| Error::backend(format!("Transit returned invalid base64: {}", e)))
    }

    async fn transit_sign(&self, key_name: &str, data: &[u8]) -> Result<String> {
        let engine = base64::engine::general_purpose::STANDARD;
        let encoded = engine.encode(data);
        let client = self.client.read().await;

        let response = self
            .with_timeout("transit.sign", async {
                vaultrs::transit::data::sign(
                    &*client,
                    &self.config.transit_mount,
                    key_name,
                    &encoded,
                    None,
                )
                .await
                .map_err(|e| Self::map_error("Transit signing failed", e))
            })
            .await?;

        Ok(response.signature)
    }

    async fn transit_verify(&self, key_name: &str, data: &[u8], signature: &str) -> Result<bool> {
        let engine = base64::engine::general_purpose::STANDARD;
        let encoded = engine.encode(data);
        let client = self.client.read().await;

        let mut opts = vaultrs::api::transit::requests::VerifySignedDataRequestBuilder::default();
        opts.signature(signature.to_string());

        let response = self
            .with_timeout("transit.verify", async {
                vaultrs::transit::data::verify(
                    &*client,
                    &self.config.transit_mount,
                    key_name,
                    &encoded,
                    Some(&mut opts),
                )
                .await
                .map_err(|e| Self::map_error("Transit verification failed", e))
            })
            .await?;

        Ok(response.valid)
    }

    async fn rotate_transit_key(&self, key_name: &str) -> Result<()> {
        let result = {
            let client = self.client.read().await;
            self.with_timeout("transit.rotate", async {
                vaultrs::transit::key::rotate(&*client, &self.config.transit_mount, key_name)
                    .await
                    .map_err(|e| Self::map_error("Transit key rotation failed", e))
            })
            .await
        };

        match result {
            Ok(_) => {
                tracing::info!(key = %key_name, "Rotated transit key");
                self.publish(TrustEventKind::KeyRotated, key_name, true, None);
                Ok(())
            }
            Err(err) => {
                self.publish(TrustEventKind::KeyRotated, key_name, false, Some(err.to_string()));
                Err(err)
            }
        }
    }

    async fn issue_certificate(
        &self,
        role: &str,
        params: &CertificateParamsSpec,
    ) -> Result<CertificateAsset> {
        use vaultrs::pki::cert;

        let mut opts = vaultrs::api::pki::requests::GenerateCertificateRequestBuilder::default();
        opts.common_name(params.common_name.clone());
        if !params.alt_names.is_empty() {
            // alt_names expects a comma-separated string for multiple SANs
            opts.alt_names(params.alt_names.join(","));
        }
        opts.ttl(format!("{}h", params.ttl_hours));

        let result = {
            let client = self.client.read().await;
            self.with_timeout("pki.issue", async {
                cert::generate(&*client, &self.config.pki_mount, role, Some(&mut opts))
                    .await
                    .map_err(|e| Self::map_error("PKI certificate issuance failed", e))
            })
            .await
        };

        match result {
            Ok(response) => {
                let not_after = match response.expiration {
                    Some(ts) => chrono::DateTime::from_timestamp(ts as i64, 0).ok_or_else(|| {
                        Error::backend(format!("Invalid expiration timestamp from PKI: {}", ts))
                    })?,
                    None => {
                        return Err(Error::backend("PKI response missing expiration timestamp"))
                    }
                };

                let ca_chain = response
                    .ca_chain
                    .map(|chain| chain.join("\n"))
                    .unwrap_or_else(|| response.issuing_ca.clone());

                tracing::info!(
                    role = %role,
                    common_name = %params.common_name,
                    serial_number = %response.serial_number,
                    not_after = %not_after,
                    "Issued certificate"
                );
                self.publish(TrustEventKind::CertificateIssued, &params.common_name, true, None);

                Ok(CertificateAsset {
                    subject: params.common_name.clone(),
                    serial_number: response.serial_number,
                    issuer: self.config.pki_mount.clone(),
                    certificate_pem: response.certificate,
                    private_key_pem: SecretString::new(response.private_key),
                    ca_chain_pem: ca_chain,
                    not_before: Utc::now(),
                    not_after,
                    subject_alt_names: params.alt_names.clone(),
                    state: CertificateState::Issued,
                })
            }
            Err(err) => {
                self.publish(
                    TrustEventKind::CertificateIssued,
                    &params.common_name,
                    false,
                    Some(err.to_string()),
                );
                Err(err)
            }
        }
    }

    async fn revoke_certificate(&self, serial_number: &str) -> Result<()> {
        let result = {
            let client = self.client.read().await;
            self.with_timeout("pki.revoke", async {
                vaultrs::pki::cert::revoke(&*client, &self.config.pki_mount, serial_number)
                    .await
                    .map_err(|e| Self::map_error("Certificate revocation failed", e))
            })
            .await
        };

        match result {
            Ok(_) => {
                tracing::info!(serial_number = %serial_number, "Revoked certificate");
                self.publish(TrustEventKind::CertificateRevoked, serial_number, true, None);
                Ok(())
            }
            Err(err) => {
                self.publish(
                    TrustEventKind::CertificateRevoked,
                    serial_number,
                    false,
                    Some(err.to_string()),
                );
                Err(err)
            }
        }
    }

    async fn is_healthy(&self) -> bool {
        let client = self.client.read().await;
        match tokio::time::timeout(self.config.request_timeout(), vaultrs::sys::health(&*client))
            .await
        {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Vault health check failed");
                false
            }
            Err(_) => {
                tracing::warn!("Vault health check timed out");
                false
            }
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(handle) = self.renewal_task.lock().await.take() {
            handle.abort();
        }
        *self.lease.write().await = None;
        tracing::info!("Closed Vault secret store");
    }
}
