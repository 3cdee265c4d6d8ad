//! Core secret-store trait and authentication methods.

use async_trait::async_trait;

use crate::errors::Result;
use crate::secrets::record::{
    CertificateAsset, CertificateParamsSpec, DatabaseCredentials, SecretRecord,
    SecretRecordMetadata, SessionLease,
};
use crate::secrets::types::SecretString;

/// How the client authenticates to the backend.
///
/// All variants produce a renewable session lease. Credentials are wrapped in
/// [`SecretString`] so a Debug-printed method never leaks them.
#[derive(Debug, Clone)]
pub enum AuthMethod {
    /// Static pre-issued token.
    Token { token: SecretString },

    /// Role-id + secret-id pair (AppRole).
    AppRole { role_id: String, secret_id: SecretString },

    /// Platform-issued identity token (Kubernetes service account JWT).
    PlatformIdentity { role: String, jwt: SecretString },

    /// Cloud-IAM-signed request (AWS STS). The caller supplies the
    /// pre-signed `GetCallerIdentity` request elements.
    CloudIam {
        role: String,
        request_method: String,
        request_url: String,
        request_body: String,
        request_headers: String,
    },
}

impl AuthMethod {
    /// Label used in logs and audit events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Token { .. } => "token",
            Self::AppRole { .. } => "approle",
            Self::PlatformIdentity { .. } => "platform_identity",
            Self::CloudIam { .. } => "cloud_iam",
        }
    }
}

/// Backend-agnostic secret store.
///
/// The KV surface works on versioned [`SecretRecord`]s; transit operations
/// delegate cryptography to the backend so raw key material never crosses the
/// trust boundary; PKI operations issue and revoke certificates.
///
/// # Failure semantics
///
/// - `get` of a missing path returns `Ok(None)`
/// - an unreachable backend surfaces [`Error::Connection`], retried by the
///   caller (the facade), never swallowed here
/// - an expired session on a read triggers exactly one transparent
///   re-authentication before the error propagates
/// - every state-changing call publishes a lifecycle event
///
/// [`Error::Connection`]: crate::errors::Error::Connection
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Establish a renewable session with the backend.
    async fn authenticate(&self) -> Result<SessionLease>;

    /// Renew the current session in place. Implementations fall back to full
    /// re-authentication when renewal fails.
    async fn renew_session(&self) -> Result<SessionLease>;

    /// Read the latest version of a secret. Missing paths are `Ok(None)`.
    async fn get(&self, path: &str) -> Result<Option<SecretRecord>>;

    /// Write a secret, creating a new version. Returns the stored record
    /// with its backend-assigned version.
    async fn put(
        &self,
        path: &str,
        value: serde_json::Value,
        metadata: Option<SecretRecordMetadata>,
    ) -> Result<SecretRecord>;

    /// Delete a secret and all of its versions.
    async fn delete(&self, path: &str) -> Result<()>;

    /// List secret paths under a prefix.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Issue short-lived database credentials for a backend role.
    async fn issue_database_credentials(&self, role: &str) -> Result<DatabaseCredentials>;

    /// Encrypt via the backend's transit engine. `context` binds the
    /// ciphertext to a caller-supplied value that must be presented again at
    /// decrypt time.
    async fn transit_encrypt(
        &self,
        key_name: &str,
        plaintext: &[u8],
        context: Option<&[u8]>,
    ) -> Result<String>;

    /// Decrypt transit ciphertext.
    async fn transit_decrypt(
        &self,
        key_name: &str,
        ciphertext: &str,
        context: Option<&[u8]>,
    ) -> Result<Vec<u8>>;

    /// Sign data with a transit key.
    async fn transit_sign(&self, key_name: &str, data: &[u8]) -> Result<String>;

    /// Verify a transit signature.
    async fn transit_verify(&self, key_name: &str, data: &[u8], signature: &str) -> Result<bool>;

    /// Rotate a transit key to a new version. Old versions remain available
    /// for decryption until explicitly purged backend-side.
    async fn rotate_transit_key(&self, key_name: &str) -> Result<()>;

    /// Issue a certificate through the backend's PKI engine.
    async fn issue_certificate(
        &self,
        role: &str,
        params: &CertificateParamsSpec,
    ) -> Result<CertificateAsset>;

    /// Revoke a certificate by serial number.
    async fn revoke_certificate(&self, serial_number: &str) -> Result<()>;

    /// Whether the backend is currently reachable and the session valid.
    async fn is_healthy(&self) -> bool;

    /// Release resources and purge any cached session material.
    async fn close(&self);
}
