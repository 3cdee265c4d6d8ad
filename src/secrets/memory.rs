//! In-memory secret store for development and tests.
//!
//! A fully-functional [`SecretStore`] with versioned KV storage, local
//! transit-style AEAD (the backend trust boundary collapses to process
//! memory), HMAC signing, and an rcgen-backed PKI that mints self-signed
//! certificates. Development-only: nothing here survives a restart.

use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use rand::RngCore;
use ring::aead::{self, Aad, BoundKey, Nonce, NonceSequence, UnboundKey, AES_256_GCM};
use ring::hmac;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::errors::{Error, Result};
use crate::events::{EventBus, TrustEvent, TrustEventKind};
use crate::secrets::record::{
    validate_secret_path, CertificateAsset, CertificateParamsSpec, CertificateState,
    DatabaseCredentials, SecretRecord, SecretRecordMetadata, SessionLease,
};
use crate::secrets::store::SecretStore;
use crate::secrets::types::{SecretBytes, SecretString};

const COMPONENT: &str = "secrets.memory";
const STORE_ACTOR: &str = "secret-store";

const NONCE_SIZE: usize = 12;

/// Ciphertext prefix marking locally-produced transit ciphertext.
const CIPHERTEXT_PREFIX: &str = "mem";

#[derive(Debug, Clone)]
struct StoredVersion {
    value: serde_json::Value,
    metadata: SecretRecordMetadata,
}

/// Single-use nonce sequence for AES-GCM.
struct SingleNonce {
    nonce: Option<[u8; NONCE_SIZE]>,
}

impl SingleNonce {
    fn new(nonce_bytes: [u8; NONCE_SIZE]) -> Self {
        Self { nonce: Some(nonce_bytes) }
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.nonce.take().map(Nonce::assume_unique_for_key).ok_or(ring::error::Unspecified)
    }
}

/// In-memory secret store.
pub struct MemorySecretStore {
    events: EventBus,
    secrets: RwLock<HashMap<String, Vec<StoredVersion>>>,
    transit_keys: RwLock<HashMap<String, Vec<SecretBytes>>>,
    issued_certificates: RwLock<HashMap<String, CertificateAsset>>,
    revoked_serials: RwLock<HashSet<String>>,
    fail_writes: AtomicBool,
    closed: AtomicBool,
}

impl MemorySecretStore {
    pub fn new(events: EventBus) -> Self {
        Self {
            events,
            secrets: RwLock::new(HashMap::new()),
            transit_keys: RwLock::new(HashMap::new()),
            issued_certificates: RwLock::new(HashMap::new()),
            revoked_serials: RwLock::new(HashSet::new()),
            fail_writes: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Make subsequent writes fail with a backend error. Test hook for
    /// exercising rotation-failure paths.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of versions stored at a path.
    pub async fn version_count(&self, path: &str) -> usize {
        self.secrets.read().await.get(path).map(|v| v.len()).unwrap_or(0)
    }

    /// Whether a serial number has been revoked.
    pub async fn is_revoked(&self, serial_number: &str) -> bool {
        self.revoked_serials.read().await.contains(serial_number)
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::connection("Store is closed"));
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        self.check_open()?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::backend("Write failure injected"));
        }
        Ok(())
    }

    fn publish(&self, kind: TrustEventKind, subject: &str) {
        self.events.publish(TrustEvent::success(kind, subject, STORE_ACTOR, COMPONENT));
    }

    /// Fetch (creating on first use) the newest version of a transit key.
    async fn transit_key(&self, key_name: &str) -> (u32, SecretBytes) {
        let mut keys = self.transit_keys.write().await;
        let versions = keys.entry(key_name.to_string()).or_insert_with(|| {
            let mut material = vec![0u8; 32];
            rand::thread_rng().fill_bytes(&mut material);
            vec![SecretBytes::new(material)]
        });
        (versions.len() as u32, versions.last().expect("at least one key version").clone())
    }

    async fn transit_key_version(&self, key_name: &str, version: u32) -> Result<SecretBytes> {
        let keys = self.transit_keys.read().await;
        keys.get(key_name)
            .and_then(|versions| versions.get(version.checked_sub(1)? as usize).cloned())
            .ok_or_else(|| {
                Error::integrity(format!(
                    "No version {} of transit key '{}'",
                    version, key_name
                ))
            })
    }

    fn seal(key: &SecretBytes, plaintext: &[u8], context: Option<&[u8]>) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let unbound = UnboundKey::new(&AES_256_GCM, key.expose())
            .map_err(|_| Error::internal("Failed to build sealing key"))?;
        let mut sealing_key = aead::SealingKey::new(unbound, SingleNonce::new(nonce_bytes));

        let mut buffer = plaintext.to_vec();
        let aad = Aad::from(context.unwrap_or(&[]));
        sealing_key
            .seal_in_place_append_tag(aad, &mut buffer)
            .map_err(|_| Error::internal("Local transit encryption failed"))?;

        let mut out = nonce_bytes.to_vec();
        out.extend_from_slice(&buffer);
        Ok(out)
    }

    fn open(key: &SecretBytes, sealed: &[u8], context: Option<&[u8]>) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_SIZE {
            return Err(Error::integrity("Ciphertext too short"));
        }
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        nonce_bytes.copy_from_slice(&sealed[..NONCE_SIZE]);

        let unbound = UnboundKey::new(&AES_256_GCM, key.expose())
            .map_err(|_| Error::internal("Failed to build opening key"))?;
        let mut opening_key = aead::OpeningKey::new(unbound, SingleNonce::new(nonce_bytes));

        let mut buffer = sealed[NONCE_SIZE..].to_vec();
        let aad = Aad::from(context.unwrap_or(&[]));
        let plaintext = opening_key
            .open_in_place(aad, &mut buffer)
            .map_err(|_| Error::integrity("Transit decryption rejected: authentication failed"))?;
        Ok(plaintext.to_vec())
    }

    fn synthetic_lease() -> SessionLease {
        SessionLease {
            ttl: Duration::from_secs(3600),
            renewable: true,
            policies: vec!["root".to_string()],
            issued_at: Utc::now(),
        }
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn authenticate(&self) -> Result<SessionLease> {
        self.check_open()?;
        self.publish(TrustEventKind::SessionAuthenticated, "memory");
        Ok(Self::synthetic_lease())
    }

    async fn renew_session(&self) -> Result<SessionLease> {
        self.check_open()?;
        self.publish(TrustEventKind::SessionRenewed, "memory");
        Ok(Self::synthetic_lease())
    }

    async fn get(&self, path: &str) -> Result<Option<SecretRecord>> {
        self.check_open()?;
        validate_secret_path(path)?;

        let secrets = self.secrets.read().await;
        let record = secrets.get(path).and_then(|versions| {
            versions.last().map(|stored| SecretRecord {
                path: path.to_string(),
                value: stored.value.clone(),
                version: versions.len() as u64,
                metadata: stored.metadata.clone(),
            })
        });
        drop(secrets);

        if record.is_some() {
            self.publish(TrustEventKind::SecretRead, path);
        }
        Ok(record)
    }

    async fn put(
        &self,
        path: &str,
        value: serde_json::Value,
        metadata: Option<SecretRecordMetadata>,
    ) -> Result<SecretRecord> {
        self.check_writable()?;
        validate_secret_path(path)?;

        let mut metadata = metadata.unwrap_or_default();
        metadata.updated_at = Utc::now();

        let mut secrets = self.secrets.write().await;
        let versions = secrets.entry(path.to_string()).or_default();
        if let Some(first) = versions.first() {
            metadata.created_at = first.metadata.created_at;
        }
        versions.push(StoredVersion { value: value.clone(), metadata: metadata.clone() });
        let version = versions.len() as u64;
        drop(secrets);

        self.publish(TrustEventKind::SecretStored, path);
        Ok(SecretRecord { path: path.to_string(), value, version, metadata })
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.check_writable()?;
        validate_secret_path(path)?;

        let removed = self.secrets.write().await.remove(path).is_some();
        if !removed {
            return Err(Error::not_found("secret", path));
        }
        self.publish(TrustEventKind::SecretDeleted, path);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.check_open()?;
        let secrets = self.secrets.read().await;
        let mut paths: Vec<String> =
            secrets.keys().filter(|path| path.starts_with(prefix)).cloned().collect();
        paths.sort();
        Ok(paths)
    }

    async fn issue_database_credentials(&self, role: &str) -> Result<DatabaseCredentials> {
        self.check_open()?;

        let mut password_bytes = vec![0u8; 24];
        rand::thread_rng().fill_bytes(&mut password_bytes);
        let password =
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&password_bytes);
        let suffix: u32 = rand::random();

        self.publish(TrustEventKind::SecretRead, role);
        Ok(DatabaseCredentials {
            username: format!("v-{}-{:08x}", role, suffix),
            password: SecretString::new(password),
            lease: SessionLease {
                ttl: Duration::from_secs(900),
                renewable: true,
                policies: Vec::new(),
                issued_at: Utc::now(),
            },
            role: role.to_string(),
        })
    }

    async fn transit_encrypt(
        &self,
        key_name: &str,
        plaintext: &[u8],
        context: Option<&[u8]>,
    ) -> Result<String> {
        self.check_open()?;
        let (version, key) = self.transit_key(key_name).await;
        let sealed = Self::seal(&key, plaintext, context)?;
        Ok(format!(
            "{}:v{}:{}",
            CIPHERTEXT_PREFIX,
            version,
            base64::engine::general_purpose::STANDARD.encode(sealed)
        ))
    }

    async fn transit_decrypt(
        &self,
        key_name: &str,
        ciphertext: &str,
        context: Option<&[u8]>,
    ) -> Result<Vec<u8>> {
        self.check_open()?;

        let mut parts = ciphertext.splitn(3, ':');
        let (prefix, version, payload) = (parts.next(), parts.next(), parts.next());
        let (version, payload) = match (prefix, version, payload) {
            (Some(CIPHERTEXT_PREFIX), Some(v), Some(payload)) => {
                let version: u32 = v
                    .strip_prefix('v')
                    .and_then(|n| n.parse().ok())
                    .ok_or_else(|| Error::integrity("Malformed ciphertext version"))?;
                (version, payload)
            }
            _ => return Err(Error::integrity("Unrecognized ciphertext format")),
        };

        let key = self.transit_key_version(key_name, version).await?;
        let sealed = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|_| Error::integrity("Ciphertext is not valid base64"))?;
        Self::open(&key, &sealed, context)
    }

    async fn transit_sign(&self, key_name: &str, data: &[u8]) -> Result<String> {
        self.check_open()?;
        let (version, key) = self.transit_key(key_name).await;
        let tag = hmac::sign(&hmac::Key::new(hmac::HMAC_SHA256, key.expose()), data);
        Ok(format!(
            "{}:v{}:{}",
            CIPHERTEXT_PREFIX,
            version,
            base64::engine::general_purpose::STANDARD.encode(tag.as_ref())
        ))
    }

    async fn transit_verify(&self, key_name: &str, data: &[u8], signature: &str) -> Result<bool> {
        self.check_open()?;

        let mut parts = signature.splitn(3, ':');
        let (prefix, version, payload) = (parts.next(), parts.next(), parts.next());
        let (version, payload) = match (prefix, version, payload) {
            (Some(CIPHERTEXT_PREFIX), Some(v), Some(payload)) => {
                let version: u32 = v
                    .strip_prefix('v')
                    .and_then(|n| n.parse().ok())
                    .ok_or_else(|| Error::integrity("Malformed signature version"))?;
                (version, payload)
            }
            _ => return Err(Error::integrity("Unrecognized signature format")),
        };

        let key = self.transit_key_version(key_name, version).await?;
        let expected = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|_| Error::integrity("Signature is not valid base64"))?;
        let verify_key = hmac::Key::new(hmac::HMAC_SHA256, key.expose());
        Ok(hmac::verify(&verify_key, data, &expected).is_ok())
    }

    async fn rotate_transit_key(&self, key_name: &str) -> Result<()> {
        self.check_writable()?;

        let mut keys = self.transit_keys.write().await;
        let versions = keys.entry(key_name.to_string()).or_default();
        let mut material = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut material);
        versions.push(SecretBytes::new(material));
        drop(keys);

        self.publish(TrustEventKind::KeyRotated, key_name);
        Ok(())
    }

    async fn issue_certificate(
        &self,
        _role: &str,
        params: &CertificateParamsSpec,
    ) -> Result<CertificateAsset> {
        self.check_writable()?;

        let san_names = if params.alt_names.is_empty() {
            vec![params.common_name.clone()]
        } else {
            params.alt_names.clone()
        };

        let mut cert_params = rcgen::CertificateParams::new(san_names.clone())
            .map_err(|e| Error::backend(format!("Invalid certificate params: {}", e)))?;
        cert_params
            .distinguished_name
            .push(rcgen::DnType::CommonName, params.common_name.clone());

        let not_before = time::OffsetDateTime::now_utc();
        let not_after = not_before + time::Duration::hours(params.ttl_hours as i64);
        cert_params.not_before = not_before;
        cert_params.not_after = not_after;

        let key_pair = rcgen::KeyPair::generate()
            .map_err(|e| Error::backend(format!("Key generation failed: {}", e)))?;
        let certificate = cert_params
            .self_signed(&key_pair)
            .map_err(|e| Error::backend(format!("Certificate issuance failed: {}", e)))?;

        let mut serial_bytes = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut serial_bytes);
        let serial_number = hex::encode(serial_bytes);

        let now = Utc::now();
        let asset = CertificateAsset {
            subject: params.common_name.clone(),
            serial_number: serial_number.clone(),
            issuer: "memory-pki".to_string(),
            certificate_pem: certificate.pem(),
            private_key_pem: SecretString::new(key_pair.serialize_pem()),
            ca_chain_pem: certificate.pem(),
            not_before: now,
            not_after: now + chrono::Duration::hours(params.ttl_hours as i64),
            subject_alt_names: san_names,
            state: CertificateState::Issued,
        };

        self.issued_certificates.write().await.insert(serial_number, asset.clone());
        self.publish(TrustEventKind::CertificateIssued, &params.common_name);
        Ok(asset)
    }

    async fn revoke_certificate(&self, serial_number: &str) -> Result<()> {
        self.check_writable()?;

        let known = self.issued_certificates.read().await.contains_key(serial_number);
        if !known {
            return Err(Error::not_found("certificate", serial_number));
        }
        self.revoked_serials.write().await.insert(serial_number.to_string());
        self.publish(TrustEventKind::CertificateRevoked, serial_number);
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // Key material zeroizes on drop via SecretBytes.
        self.transit_keys.write().await.clear();
        self.secrets.write().await.clear();
    }
}
