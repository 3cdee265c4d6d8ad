//! Symmetric authenticated encryption with key-versioned envelopes.
//!
//! AES-256-GCM with unique nonces per operation. The optional caller
//! context is bound as additional authenticated data: a ciphertext encrypted
//! under context `C` only decrypts under the identical `C`.

use base64::Engine as _;
use chrono::{DateTime, Utc};
use rand::RngCore;
use ring::aead::{self, Aad, BoundKey, Nonce, NonceSequence, UnboundKey, AES_256_GCM};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::EncryptionConfig;
use crate::crypto::kdf::{self, DerivedKey};
use crate::crypto::provider::KeyProvider;
use crate::errors::{Error, Result};
use crate::events::{EventBus, TrustEvent, TrustEventKind};
use crate::secrets::types::SecretBytes;

const COMPONENT: &str = "crypto.engine";

/// Size of the AES-256-GCM nonce in bytes.
const NONCE_SIZE: usize = 12;

/// Size of the AES-256-GCM authentication tag in bytes.
const TAG_SIZE: usize = 16;

const ALGORITHM: &str = "AES-256-GCM";

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

/// Ciphertext envelope produced by [`EncryptionEngine::encrypt`].
///
/// Carries everything needed for decryption except the key material itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncryptedEnvelope {
    /// Base64 ciphertext (tag excluded).
    pub ciphertext: String,

    /// Logical key id the material was encrypted under.
    pub key_id: String,

    /// Version of the logical key.
    pub key_version: u32,

    /// Cipher identifier.
    pub algorithm: String,

    /// Base64 nonce.
    pub iv: String,

    /// Base64 authentication tag.
    pub auth_tag: String,

    /// When the envelope was produced.
    pub timestamp: DateTime<Utc>,
}

impl EncryptedEnvelope {
    /// Whether a JSON value looks like an envelope (used by object-level
    /// decryption to find encrypted fields).
    pub fn is_envelope(value: &serde_json::Value) -> bool {
        value.get("ciphertext").is_some()
            && value.get("key_id").is_some()
            && value.get("auth_tag").is_some()
    }
}

/// Local encryption engine.
///
/// Keys come from the injected [`KeyProvider`]; the engine itself holds no
/// long-lived key material. [`EncryptionEngine::initialize`] validates the
/// key-derivation cost floors and runs an encrypt→decrypt self-test (one
/// plain round trip plus one field-level round trip) before the engine is
/// considered ready.
pub struct EncryptionEngine {
    provider: Arc<dyn KeyProvider>,
    config: EncryptionConfig,
    events: EventBus,
    ready: AtomicBool,
}

impl EncryptionEngine {
    /// Validate configuration, run the self-test, and return a ready engine.
    pub async fn initialize(
        provider: Arc<dyn KeyProvider>,
        config: EncryptionConfig,
        events: EventBus,
    ) -> Result<Arc<Self>> {
        kdf::validate_costs(&config.kdf)?;

        let engine = Arc::new(Self { provider, config, events, ready: AtomicBool::new(false) });
        engine.self_test().await?;
        engine.ready.store(true, Ordering::SeqCst);

        tracing::info!(
            default_key_id = %engine.config.default_key_id,
            emergency_key_id = %engine.config.emergency_key_id,
            "Encryption engine initialized"
        );
        Ok(engine)
    }

    /// The logical key id used when callers do not name one.
    pub fn default_key_id(&self) -> &str {
        &self.config.default_key_id
    }

    /// The reserved break-glass emergency key id.
    pub fn emergency_key_id(&self) -> &str {
        &self.config.emergency_key_id
    }

    pub(crate) fn config(&self) -> &EncryptionConfig {
        &self.config
    }

    fn check_ready(&self) -> Result<()> {
        if !self.ready.load(Ordering::SeqCst) {
            return Err(Error::internal("Encryption engine is not ready"));
        }
        Ok(())
    }

    /// Encrypt plaintext under a logical key, producing an envelope.
    pub async fn encrypt(
        &self,
        plaintext: &[u8],
        key_id: Option<&str>,
        context: Option<&[u8]>,
    ) -> Result<EncryptedEnvelope> {
        self.check_ready()?;
        let key_id = key_id.unwrap_or(&self.config.default_key_id);
        let handle = self.provider.current_key(key_id).await?;
        self.encrypt_with_key(plaintext, key_id, handle.version, &handle.material, context)
    }

    fn encrypt_with_key(
        &self,
        plaintext: &[u8],
        key_id: &str,
        key_version: u32,
        material: &SecretBytes,
        context: Option<&[u8]>,
    ) -> Result<EncryptedEnvelope> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let unbound = UnboundKey::new(&AES_256_GCM, material.expose())
            .map_err(|_| Error::internal("Failed to build sealing key"))?;
        let mut sealing_key = aead::SealingKey::new(unbound, SingleNonce::new(nonce_bytes));

        let mut buffer = plaintext.to_vec();
        sealing_key
            .seal_in_place_append_tag(Aad::from(context.unwrap_or(&[])), &mut buffer)
            .map_err(|_| Error::internal("Encryption failed"))?;

        // ring appends the tag; the envelope carries it separately.
        let tag_offset = buffer.len() - TAG_SIZE;
        let engine = base64::engine::general_purpose::STANDARD;
        Ok(EncryptedEnvelope {
            ciphertext: engine.encode(&buffer[..tag_offset]),
            key_id: key_id.to_string(),
            key_version,
            algorithm: ALGORITHM.to_string(),
            iv: engine.encode(nonce_bytes),
            auth_tag: engine.encode(&buffer[tag_offset..]),
            timestamp: Utc::now(),
        })
    }

    /// Decrypt an envelope. The context supplied at encrypt time must be
    /// supplied identically or decryption fails with an integrity error.
    pub async fn decrypt(
        &self,
        envelope: &EncryptedEnvelope,
        context: Option<&[u8]>,
    ) -> Result<Vec<u8>> {
        self.check_ready()?;

        if envelope.algorithm != ALGORITHM {
            return Err(Error::validation(format!(
                "Unsupported algorithm '{}'",
                envelope.algorithm
            )));
        }

        let handle = self.provider.key_version(&envelope.key_id, envelope.key_version).await?;

        let engine = base64::engine::general_purpose::STANDARD;
        let nonce_raw = engine
            .decode(&envelope.iv)
            .map_err(|_| Error::integrity("Envelope iv is not valid base64"))?;
        if nonce_raw.len() != NONCE_SIZE {
            return Err(Error::integrity(format!(
                "Invalid nonce length: expected {} bytes, got {}",
                NONCE_SIZE,
                nonce_raw.len()
            )));
        }
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        nonce_bytes.copy_from_slice(&nonce_raw);

        let mut buffer = engine
            .decode(&envelope.ciphertext)
            .map_err(|_| Error::integrity("Envelope ciphertext is not valid base64"))?;
        let tag = engine
            .decode(&envelope.auth_tag)
            .map_err(|_| Error::integrity("Envelope auth tag is not valid base64"))?;
        if tag.len() != TAG_SIZE {
            return Err(Error::integrity("Invalid authentication tag length"));
        }
        buffer.extend_from_slice(&tag);

        let unbound = UnboundKey::new(&AES_256_GCM, handle.material.expose())
            .map_err(|_| Error::internal("Failed to build opening key"))?;
        let mut opening_key = aead::OpeningKey::new(unbound, SingleNonce::new(nonce_bytes));

        let result = opening_key.open_in_place(Aad::from(context.unwrap_or(&[])), &mut buffer);
        match result {
            Ok(plaintext) => Ok(plaintext.to_vec()),
            Err(_) => {
                let err = Error::integrity(
                    "Decryption failed: authentication tag or context mismatch",
                );
                self.events.publish(TrustEvent::failure(
                    TrustEventKind::SecretRead,
                    envelope.key_id.clone(),
                    "encryption-engine",
                    COMPONENT,
                    err.to_string(),
                ));
                Err(err)
            }
        }
    }

    /// Derive a fixed-length key from a password using the configured
    /// Argon2id parameters.
    pub fn derive_key(&self, password: &str, salt: Option<&[u8]>) -> Result<DerivedKey> {
        kdf::derive_key(password, salt, &self.config.kdf)
    }

    /// Advance a logical key to a new version.
    pub async fn rotate_key(&self, key_id: &str) -> Result<u32> {
        self.check_ready()?;
        let version = self.provider.rotate(key_id).await?;
        self.events.publish(TrustEvent::success(
            TrustEventKind::KeyRotated,
            key_id,
            "encryption-engine",
            COMPONENT,
        ));
        Ok(version)
    }

    /// Encrypt→decrypt round trip, plus one field-level round trip. Runs at
    /// initialization; the engine refuses work until it passes.
    async fn self_test(&self) -> Result<()> {
        let plaintext = b"trustplane-self-test";
        let context = b"self-test-context";

        let handle = self.provider.current_key(&self.config.default_key_id).await?;
        let envelope = self.encrypt_with_key(
            plaintext,
            &self.config.default_key_id,
            handle.version,
            &handle.material,
            Some(context),
        )?;

        // decrypt() gates on ready, so open inline here.
        let engine = base64::engine::general_purpose::STANDARD;
        let mut buffer = engine
            .decode(&envelope.ciphertext)
            .map_err(|_| Error::internal("Self-test produced invalid ciphertext"))?;
        buffer.extend_from_slice(
            &engine
                .decode(&envelope.auth_tag)
                .map_err(|_| Error::internal("Self-test produced invalid tag"))?,
        );
        let nonce_raw = engine
            .decode(&envelope.iv)
            .map_err(|_| Error::internal("Self-test produced invalid nonce"))?;
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        nonce_bytes.copy_from_slice(&nonce_raw);

        let unbound = UnboundKey::new(&AES_256_GCM, handle.material.expose())
            .map_err(|_| Error::internal("Self-test key setup failed"))?;
        let mut opening_key = aead::OpeningKey::new(unbound, SingleNonce::new(nonce_bytes));
        let recovered = opening_key
            .open_in_place(Aad::from(&context[..]), &mut buffer)
            .map_err(|_| Error::internal("Encryption self-test failed: round trip mismatch"))?;

        if recovered != plaintext {
            return Err(Error::internal("Encryption self-test failed: plaintext mismatch"));
        }

        // Field-level round trip runs through the public object walkers once
        // the ready flag is up; mark ready provisionally for the check.
        self.ready.store(true, Ordering::SeqCst);
        let result = self.field_level_self_test().await;
        self.ready.store(false, Ordering::SeqCst);
        result?;

        tracing::debug!("Encryption self-test passed");
        Ok(())
    }

    async fn field_level_self_test(&self) -> Result<()> {
        use crate::crypto::fields::FieldRule;

        let input = serde_json::json!({ "username": "probe", "password": "check" });
        let rules = vec![FieldRule::new("password")];
        let encrypted = self.encrypt_object(&input, &rules).await?;

        if encrypted["username"] != "probe" || encrypted["password_encrypted"] != true {
            return Err(Error::internal("Field-level self-test failed: selectivity"));
        }

        let decrypted = self.decrypt_object(&encrypted, &rules).await?;
        if decrypted["password"] != "check" {
            return Err(Error::internal("Field-level self-test failed: round trip"));
        }
        Ok(())
    }

    /// Purge cached key material. The engine refuses further work.
    pub async fn close(&self) {
        self.ready.store(false, Ordering::SeqCst);
        self.provider.purge().await;
        tracing::info!("Encryption engine closed, key material purged");
    }
}

impl std::fmt::Debug for EncryptionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionEngine")
            .field("default_key_id", &self.config.default_key_id)
            .field("ready", &self.ready.load(Ordering::SeqCst))
            .finish()
    }
}
