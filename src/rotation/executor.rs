//! Rotation strategy execution.
//!
//! Generates fresh material per secret type and applies one of the three
//! transition strategies. Every strategy verifies the new material is
//! retrievable before the job can be reported complete, and the old value
//! stays valid until the transition finishes.

use base64::Engine;
use rand::RngCore;
use std::sync::Arc;
use std::time::Duration;

use crate::crypto::engine::EncryptionEngine;
use crate::errors::{Error, Result};
use crate::rotation::job::{RotationJob, RotationStrategy, SecretType};
use crate::secrets::record::CertificateParamsSpec;
use crate::secrets::store::SecretStore;

/// Suffix for blue-green staging copies.
const STAGING_SUFFIX: &str = ".staged";

/// Versions before/after a successful rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationOutcome {
    pub old_version: Option<u64>,
    pub new_version: u64,
}

/// Executes rotation jobs against the secret store (and the encryption
/// engine for logical-key rotation).
pub struct RotationExecutor {
    store: Arc<dyn SecretStore>,
    engine: Option<Arc<EncryptionEngine>>,
    /// PKI role for certificate-type rotations.
    pki_role: String,
    /// Requested TTL for rotated certificates.
    certificate_ttl_hours: u32,
    /// Grace period applied when the job's policy does not set one.
    default_grace: Duration,
}

impl RotationExecutor {
    pub fn new(store: Arc<dyn SecretStore>, default_grace: Duration) -> Self {
        Self {
            store,
            engine: None,
            pki_role: "service".to_string(),
            certificate_ttl_hours: 720,
            default_grace,
        }
    }

    /// Attach an encryption engine so `EncryptionKey` rotations advance the
    /// engine's logical keys instead of backend transit keys.
    pub fn with_engine(mut self, engine: Arc<EncryptionEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_pki_role(mut self, role: impl Into<String>) -> Self {
        self.pki_role = role.into();
        self
    }

    pub fn with_certificate_ttl_hours(mut self, hours: u32) -> Self {
        self.certificate_ttl_hours = hours;
        self
    }

    /// The last path segment names the backend role / key / subject.
    fn target_name(path: &str) -> &str {
        path.rsplit('/').next().unwrap_or(path)
    }

    /// Generate fresh material for a secret type.
    async fn generate_material(
        &self,
        path: &str,
        secret_type: SecretType,
    ) -> Result<serde_json::Value> {
        let name = Self::target_name(path);
        match secret_type {
            SecretType::ApiKey | SecretType::SigningSecret => {
                let mut bytes = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut bytes);
                let value = base64::engine::general_purpose::STANDARD.encode(bytes);
                Ok(serde_json::json!({ "value": value }))
            }
            SecretType::DatabaseCredential => {
                let creds = self.store.issue_database_credentials(name).await?;
                Ok(serde_json::json!({
                    "username": creds.username,
                    "password": creds.password.expose(),
                    "role": creds.role,
                }))
            }
            SecretType::Certificate => {
                let params = CertificateParamsSpec {
                    common_name: name.to_string(),
                    alt_names: vec![name.to_string()],
                    ttl_hours: self.certificate_ttl_hours,
                };
                let asset = self.store.issue_certificate(&self.pki_role, &params).await?;
                Ok(serde_json::json!({
                    "certificate_pem": asset.certificate_pem,
                    "private_key_pem": asset.private_key_pem.expose(),
                    "ca_chain_pem": asset.ca_chain_pem,
                    "serial_number": asset.serial_number,
                    "not_after": asset.not_after,
                }))
            }
            SecretType::EncryptionKey => {
                let version = match &self.engine {
                    Some(engine) => engine.rotate_key(name).await?,
                    None => {
                        self.store.rotate_transit_key(name).await?;
                        0
                    }
                };
                Ok(serde_json::json!({ "key_id": name, "key_version": version }))
            }
        }
    }

    fn grace(&self, job: &RotationJob) -> Duration {
        job.policy.grace_secs.map(Duration::from_secs).unwrap_or(self.default_grace)
    }

    /// Run a rotation. The caller (scheduler) owns job-state bookkeeping and
    /// per-path exclusion; this only touches material.
    pub async fn execute(&self, job: &RotationJob) -> Result<RotationOutcome> {
        let old = self.store.get(&job.path).await?;
        let old_version = old.as_ref().map(|record| record.version);

        let new_value = self.generate_material(&job.path, job.secret_type).await?;

        let new_version = match job.policy.strategy {
            RotationStrategy::Immediate => self.apply_immediate(job, new_value).await?,
            RotationStrategy::BlueGreen => self.apply_blue_green(job, new_value).await?,
            RotationStrategy::Gradual => {
                self.apply_gradual(job, new_value, old.map(|r| r.value)).await?
            }
        };

        // A job never reports complete unless the new material is
        // retrievable.
        let verify = self
            .store
            .get(&job.path)
            .await?
            .ok_or_else(|| Error::rotation(&job.path, "New material not retrievable"))?;
        if verify.version != new_version {
            return Err(Error::rotation(
                &job.path,
                format!(
                    "Version mismatch after rotation: stored {}, expected {}",
                    verify.version, new_version
                ),
            ));
        }

        Ok(RotationOutcome { old_version, new_version })
    }

    /// Generate and overwrite in one step.
    async fn apply_immediate(
        &self,
        job: &RotationJob,
        new_value: serde_json::Value,
    ) -> Result<u64> {
        let record = self.store.put(&job.path, new_value, None).await?;
        Ok(record.version)
    }

    /// Stage, verify the staging copy, switch the live path, then delete the
    /// staging copy after the grace period.
    async fn apply_blue_green(
        &self,
        job: &RotationJob,
        new_value: serde_json::Value,
    ) -> Result<u64> {
        let staging_path = format!("{}{}", job.path, STAGING_SUFFIX);

        self.store.put(&staging_path, new_value.clone(), None).await?;

        let staged = self
            .store
            .get(&staging_path)
            .await?
            .ok_or_else(|| Error::rotation(&job.path, "Staged material not retrievable"))?;
        if staged.value != new_value {
            return Err(Error::rotation(&job.path, "Staged material failed verification"));
        }

        let record = self.store.put(&job.path, new_value, None).await?;

        let store = Arc::clone(&self.store);
        let grace = self.grace(job);
        let path = job.path.clone();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Err(e) = store.delete(&staging_path).await {
                tracing::warn!(path = %path, error = %e, "Failed to delete staging copy after grace period");
            }
        });

        Ok(record.version)
    }

    /// Write the new value with the previous one embedded, then purge the
    /// previous value after the grace window.
    async fn apply_gradual(
        &self,
        job: &RotationJob,
        new_value: serde_json::Value,
        old_value: Option<serde_json::Value>,
    ) -> Result<u64> {
        let mut combined = match &new_value {
            serde_json::Value::Object(map) => map.clone(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other.clone());
                map
            }
        };
        if let Some(old_value) = old_value {
            combined.insert("previous_value".to_string(), old_value);
        }

        let record =
            self.store.put(&job.path, serde_json::Value::Object(combined), None).await?;
        let version = record.version;

        let store = Arc::clone(&self.store);
        let grace = self.grace(job);
        let path = job.path.clone();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            // Purge only if the record has not been rotated again since.
            match store.get(&path).await {
                Ok(Some(current)) if current.version == version => {
                    if let serde_json::Value::Object(mut map) = current.value {
                        if map.remove("previous_value").is_some() {
                            if let Err(e) =
                                store.put(&path, serde_json::Value::Object(map), None).await
                            {
                                tracing::warn!(path = %path, error = %e, "Failed to purge previous value after grace window");
                            }
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "Grace-window purge read failed");
                }
            }
        });

        Ok(version)
    }
}
