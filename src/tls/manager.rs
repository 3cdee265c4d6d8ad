//! Named TLS context management.

use chrono::{DateTime, Utc};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::RootCertStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::TlsConfig;
use crate::errors::{Error, Result};
use crate::events::{EventBus, TrustEvent, TrustEventKind};
use crate::secrets::record::{CertificateAsset, CertificateParamsSpec, CertificateState};
use crate::secrets::store::SecretStore;
use crate::secrets::types::SecretString;
use crate::tls::validation::{self, CertificateValidation};
use crate::tls::verifier::PresenceOnlyClientVerifier;

const COMPONENT: &str = "tls.manager";
const MANAGER_ACTOR: &str = "mtls-manager";

/// Client-certificate policy for a TLS listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthPolicy {
    /// No client certificate requested.
    NoClientCert,
    /// Certificate requested; connection proceeds without one or with one
    /// that fails verification.
    RequestButAllowUnverified,
    /// A certificate must be presented but is not chain-validated.
    RequireAny,
    /// A certificate must be presented and verify against the trusted CAs.
    RequireAndVerify,
}

/// KV representation of a certificate. Unlike [`CertificateAsset`], the
/// private key serializes in the clear here: the record only ever lives
/// inside the secret store, which is the trust boundary.
#[derive(Debug, Serialize, Deserialize)]
struct StoredCertificate {
    subject: String,
    serial_number: String,
    issuer: String,
    certificate_pem: String,
    private_key_pem: String,
    ca_chain_pem: String,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    subject_alt_names: Vec<String>,
    state: CertificateState,
}

impl StoredCertificate {
    fn from_asset(asset: &CertificateAsset) -> Self {
        Self {
            subject: asset.subject.clone(),
            serial_number: asset.serial_number.clone(),
            issuer: asset.issuer.clone(),
            certificate_pem: asset.certificate_pem.clone(),
            private_key_pem: asset.private_key_pem.expose().to_string(),
            ca_chain_pem: asset.ca_chain_pem.clone(),
            not_before: asset.not_before,
            not_after: asset.not_after,
            subject_alt_names: asset.subject_alt_names.clone(),
            state: asset.state,
        }
    }

    fn into_asset(self) -> CertificateAsset {
        CertificateAsset {
            subject: self.subject,
            serial_number: self.serial_number,
            issuer: self.issuer,
            certificate_pem: self.certificate_pem,
            private_key_pem: SecretString::new(self.private_key_pem),
            ca_chain_pem: self.ca_chain_pem,
            not_before: self.not_before,
            not_after: self.not_after,
            subject_alt_names: self.subject_alt_names,
            state: self.state,
        }
    }
}

/// CA-bundle record format: `{ "ca_pem": "<PEM>" }`.
#[derive(Debug, Serialize, Deserialize)]
struct StoredCaBundle {
    ca_pem: String,
}

struct TlsContext {
    id: String,
    /// Active server certificate and the KV path it came from.
    server: Option<(String, CertificateAsset)>,
    /// Active client certificate and the KV path it came from.
    client: Option<(String, CertificateAsset)>,
    trusted_cas_pem: Option<String>,
    created_at: DateTime<Utc>,
}

/// Public snapshot of a context.
#[derive(Debug, Clone)]
pub struct TlsContextSummary {
    pub id: String,
    pub has_server_certificate: bool,
    pub has_client_certificate: bool,
    pub server_not_after: Option<DateTime<Utc>>,
    pub client_not_after: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Builds and maintains named TLS contexts from store-held certificates.
pub struct MutualTlsManager {
    store: Arc<dyn SecretStore>,
    config: TlsConfig,
    events: EventBus,
    contexts: RwLock<HashMap<String, TlsContext>>,
}

impl MutualTlsManager {
    pub fn new(store: Arc<dyn SecretStore>, config: TlsConfig, events: EventBus) -> Arc<Self> {
        Arc::new(Self { store, config, events, contexts: RwLock::new(HashMap::new()) })
    }

    /// Issue a certificate through the store's PKI and persist it at `path`.
    /// Returns the active asset. Used for initial provisioning; rotation
    /// reuses it internally.
    pub async fn issue_and_store(
        &self,
        path: &str,
        common_name: &str,
        alt_names: Vec<String>,
    ) -> Result<CertificateAsset> {
        let params = CertificateParamsSpec {
            common_name: common_name.to_string(),
            alt_names,
            ttl_hours: self.config.certificate_ttl_hours,
        };
        let mut asset = self.store.issue_certificate(&self.config.issuance_role, &params).await?;
        asset.state = CertificateState::Active;

        self.store
            .put(path, serde_json::to_value(StoredCertificate::from_asset(&asset))?, None)
            .await?;
        Ok(asset)
    }

    async fn load_certificate(&self, path: &str) -> Result<CertificateAsset> {
        let record = self
            .store
            .get(path)
            .await?
            .ok_or_else(|| Error::not_found("certificate", path))?;
        let stored: StoredCertificate = serde_json::from_value(record.value)?;
        Ok(stored.into_asset())
    }

    async fn load_ca_bundle(&self, path: &str) -> Result<String> {
        let record = self
            .store
            .get(path)
            .await?
            .ok_or_else(|| Error::not_found("CA bundle", path))?;
        let stored: StoredCaBundle = serde_json::from_value(record.value)?;
        Ok(stored.ca_pem)
    }

    /// Build a named context from store paths. At least one certificate
    /// path must be given.
    pub async fn create_context(
        &self,
        id: &str,
        server_cert_path: Option<&str>,
        client_cert_path: Option<&str>,
        ca_path: Option<&str>,
    ) -> Result<TlsContextSummary> {
        if server_cert_path.is_none() && client_cert_path.is_none() {
            return Err(Error::validation(
                "A TLS context needs a server or client certificate path",
            ));
        }

        let server = match server_cert_path {
            Some(path) => Some((path.to_string(), self.load_certificate(path).await?)),
            None => None,
        };
        let client = match client_cert_path {
            Some(path) => Some((path.to_string(), self.load_certificate(path).await?)),
            None => None,
        };
        let trusted_cas_pem = match ca_path {
            Some(path) => Some(self.load_ca_bundle(path).await?),
            None => None,
        };

        let context = TlsContext {
            id: id.to_string(),
            server,
            client,
            trusted_cas_pem,
            created_at: Utc::now(),
        };
        let summary = Self::summarize(&context);

        let mut contexts = self.contexts.write().await;
        if contexts.contains_key(id) {
            return Err(Error::validation(format!("TLS context '{}' already exists", id)));
        }
        contexts.insert(id.to_string(), context);
        drop(contexts);

        tracing::info!(
            context_id = %id,
            has_server = summary.has_server_certificate,
            has_client = summary.has_client_certificate,
            "Created TLS context"
        );
        Ok(summary)
    }

    fn summarize(context: &TlsContext) -> TlsContextSummary {
        TlsContextSummary {
            id: context.id.clone(),
            has_server_certificate: context.server.is_some(),
            has_client_certificate: context.client.is_some(),
            server_not_after: context.server.as_ref().map(|(_, c)| c.not_after),
            client_not_after: context.client.as_ref().map(|(_, c)| c.not_after),
            created_at: context.created_at,
        }
    }

    /// Snapshot of all contexts.
    pub async fn list_contexts(&self) -> Vec<TlsContextSummary> {
        self.contexts.read().await.values().map(Self::summarize).collect()
    }

    pub async fn remove_context(&self, id: &str) -> Result<()> {
        self.contexts
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found("TLS context", id))
    }

    fn cert_chain(asset: &CertificateAsset) -> Result<Vec<CertificateDer<'static>>> {
        let mut combined = asset.certificate_pem.clone();
        if !asset.ca_chain_pem.is_empty() && asset.ca_chain_pem != asset.certificate_pem {
            combined.push('\n');
            combined.push_str(&asset.ca_chain_pem);
        }
        let chain: std::result::Result<Vec<_>, _> =
            rustls_pemfile::certs(&mut combined.as_bytes()).collect();
        let chain =
            chain.map_err(|e| Error::validation(format!("Invalid certificate PEM: {}", e)))?;
        if chain.is_empty() {
            return Err(Error::validation("Certificate PEM contains no certificates"));
        }
        Ok(chain)
    }

    fn private_key(asset: &CertificateAsset) -> Result<PrivateKeyDer<'static>> {
        rustls_pemfile::private_key(&mut asset.private_key_pem.expose().as_bytes())
            .map_err(|e| Error::validation(format!("Invalid private key PEM: {}", e)))?
            .ok_or_else(|| Error::validation("No private key found in PEM"))
    }

    fn root_store(cas_pem: &str) -> Result<RootCertStore> {
        let mut roots = RootCertStore::empty();
        let certs: std::result::Result<Vec<_>, _> =
            rustls_pemfile::certs(&mut cas_pem.as_bytes()).collect();
        for cert in certs.map_err(|e| Error::validation(format!("Invalid CA PEM: {}", e)))? {
            roots
                .add(cert)
                .map_err(|e| Error::validation(format!("Rejected CA certificate: {}", e)))?;
        }
        if roots.is_empty() {
            return Err(Error::validation("CA bundle contains no certificates"));
        }
        Ok(roots)
    }

    /// The context's trusted CA PEM, falling back to the certificate's own
    /// chain.
    fn effective_cas(context: &TlsContext, asset: &CertificateAsset) -> Result<String> {
        match &context.trusted_cas_pem {
            Some(pem) => Ok(pem.clone()),
            None if !asset.ca_chain_pem.is_empty() => Ok(asset.ca_chain_pem.clone()),
            None => Err(Error::validation(
                "Client-certificate policy needs a trusted CA set on the context",
            )),
        }
    }

    /// Build listener parameters enforcing a client-auth policy.
    pub async fn server_options(
        &self,
        context_id: &str,
        policy: ClientAuthPolicy,
    ) -> Result<Arc<rustls::ServerConfig>> {
        let contexts = self.contexts.read().await;
        let context = contexts
            .get(context_id)
            .ok_or_else(|| Error::not_found("TLS context", context_id))?;
        let (_, asset) = context
            .server
            .as_ref()
            .ok_or_else(|| Error::validation("Context has no server certificate"))?;

        let chain = Self::cert_chain(asset)?;
        let key = Self::private_key(asset)?;

        let config = match policy {
            ClientAuthPolicy::NoClientCert => rustls::ServerConfig::builder()
                .with_no_client_auth()
                .with_single_cert(chain, key),
            ClientAuthPolicy::RequireAny => rustls::ServerConfig::builder()
                .with_client_cert_verifier(PresenceOnlyClientVerifier::new())
                .with_single_cert(chain, key),
            ClientAuthPolicy::RequestButAllowUnverified => {
                let roots = Self::root_store(&Self::effective_cas(context, asset)?)?;
                let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
                    .allow_unauthenticated()
                    .build()
                    .map_err(|e| {
                        Error::validation(format!("Client verifier build failed: {}", e))
                    })?;
                rustls::ServerConfig::builder()
                    .with_client_cert_verifier(verifier)
                    .with_single_cert(chain, key)
            }
            ClientAuthPolicy::RequireAndVerify => {
                let roots = Self::root_store(&Self::effective_cas(context, asset)?)?;
                let verifier =
                    WebPkiClientVerifier::builder(Arc::new(roots)).build().map_err(|e| {
                        Error::validation(format!("Client verifier build failed: {}", e))
                    })?;
                rustls::ServerConfig::builder()
                    .with_client_cert_verifier(verifier)
                    .with_single_cert(chain, key)
            }
        };

        config
            .map(Arc::new)
            .map_err(|e| Error::validation(format!("TLS server config rejected: {}", e)))
    }

    /// Build outbound-connection parameters presenting the client
    /// certificate.
    pub async fn client_options(&self, context_id: &str) -> Result<Arc<rustls::ClientConfig>> {
        let contexts = self.contexts.read().await;
        let context = contexts
            .get(context_id)
            .ok_or_else(|| Error::not_found("TLS context", context_id))?;
        let (_, asset) = context
            .client
            .as_ref()
            .ok_or_else(|| Error::validation("Context has no client certificate"))?;

        let roots = Self::root_store(&Self::effective_cas(context, asset)?)?;
        let chain = Self::cert_chain(asset)?;
        let key = Self::private_key(asset)?;

        rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_client_auth_cert(chain, key)
            .map(Arc::new)
            .map_err(|e| Error::validation(format!("TLS client config rejected: {}", e)))
    }

    /// Acceptor for a TLS listener backed by this context.
    pub async fn tls_acceptor(
        &self,
        context_id: &str,
        policy: ClientAuthPolicy,
    ) -> Result<tokio_rustls::TlsAcceptor> {
        Ok(tokio_rustls::TlsAcceptor::from(self.server_options(context_id, policy).await?))
    }

    /// Connector for outbound connections presenting the context's client
    /// certificate.
    pub async fn tls_connector(&self, context_id: &str) -> Result<tokio_rustls::TlsConnector> {
        Ok(tokio_rustls::TlsConnector::from(self.client_options(context_id).await?))
    }

    /// Validate a peer certificate against the context's trusted CAs.
    pub async fn validate_peer(
        &self,
        context_id: &str,
        cert_pem: &str,
    ) -> Result<CertificateValidation> {
        let contexts = self.contexts.read().await;
        let context = contexts
            .get(context_id)
            .ok_or_else(|| Error::not_found("TLS context", context_id))?;
        validation::validate_certificate(cert_pem, context.trusted_cas_pem.as_deref())
    }

    /// Request fresh certificates for every certificate the context holds
    /// and atomically swap them in. The replaced assets transition to
    /// `Rotated`; in-flight connections finish on the certificate they
    /// negotiated.
    pub async fn rotate_certificates(&self, context_id: &str) -> Result<()> {
        // Issue outside the lock so a slow backend cannot block readers.
        let (server_source, client_source) = {
            let contexts = self.contexts.read().await;
            let context = contexts
                .get(context_id)
                .ok_or_else(|| Error::not_found("TLS context", context_id))?;
            (
                context
                    .server
                    .as_ref()
                    .map(|(path, c)| (path.clone(), c.subject.clone(), c.subject_alt_names.clone())),
                context
                    .client
                    .as_ref()
                    .map(|(path, c)| (path.clone(), c.subject.clone(), c.subject_alt_names.clone())),
            )
        };

        let new_server = match &server_source {
            Some((path, subject, sans)) => {
                Some((path.clone(), self.issue_and_store(path, subject, sans.clone()).await?))
            }
            None => None,
        };
        let new_client = match &client_source {
            Some((path, subject, sans)) => {
                Some((path.clone(), self.issue_and_store(path, subject, sans.clone()).await?))
            }
            None => None,
        };

        let mut contexts = self.contexts.write().await;
        let context = contexts
            .get_mut(context_id)
            .ok_or_else(|| Error::not_found("TLS context", context_id))?;
        if let Some(new) = new_server {
            if let Some((_, old)) = &mut context.server {
                old.state = CertificateState::Rotated;
            }
            context.server = Some(new);
        }
        if let Some(new) = new_client {
            if let Some((_, old)) = &mut context.client {
                old.state = CertificateState::Rotated;
            }
            context.client = Some(new);
        }
        drop(contexts);

        tracing::info!(context_id = %context_id, "Rotated TLS context certificates");
        Ok(())
    }

    /// One expiry sweep: emit a warning event for every certificate whose
    /// remaining validity is below the configured threshold. Advisory only -
    /// triggering rotation is the scheduler's job. Returns the number of
    /// warnings emitted.
    pub async fn scan_expiring(&self) -> usize {
        let threshold = chrono::Duration::days(self.config.expiry_warning_days);
        let now = Utc::now();
        let mut warnings = 0;

        let contexts = self.contexts.read().await;
        for context in contexts.values() {
            for (kind, slot) in [("server", &context.server), ("client", &context.client)] {
                if let Some((_, asset)) = slot {
                    if asset.remaining_validity(now) < threshold {
                        warnings += 1;
                        tracing::warn!(
                            context_id = %context.id,
                            certificate = kind,
                            subject = %asset.subject,
                            not_after = %asset.not_after,
                            "Certificate approaching expiry"
                        );
                        self.events.publish(
                            TrustEvent::success(
                                TrustEventKind::CertificateExpiring,
                                format!("{}/{}", context.id, kind),
                                MANAGER_ACTOR,
                                COMPONENT,
                            )
                            .with_metadata(serde_json::json!({
                                "subject": asset.subject,
                                "serial_number": asset.serial_number,
                                "not_after": asset.not_after,
                            })),
                        );
                    }
                }
            }
        }
        warnings
    }

    /// Drop all contexts (certificate private keys zeroize on drop).
    pub async fn close(&self) {
        self.contexts.write().await.clear();
        tracing::info!("Closed mTLS manager");
    }
}
