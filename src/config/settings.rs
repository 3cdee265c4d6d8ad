//! # Configuration Settings
//!
//! Defines the configuration structure for the trust-infrastructure core.

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Minimum Argon2 time cost (passes over memory). Three passes over ≥ 1 MiB
/// is the 10000-iteration-equivalent work floor for a memory-hard function.
pub const MIN_KDF_TIME_COST: u32 = 3;

/// Minimum Argon2 memory cost in KiB (1 MiB).
pub const MIN_KDF_MEMORY_KIB: u32 = 1024;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct AppConfig {
    /// Secret-store backend configuration.
    #[validate(nested)]
    pub store: StoreConfig,

    /// Encryption engine configuration.
    #[validate(nested)]
    pub encryption: EncryptionConfig,

    /// Mutual-TLS manager configuration.
    #[validate(nested)]
    pub tls: TlsConfig,

    /// Rotation scheduler configuration.
    #[validate(nested)]
    pub rotation: RotationConfig,

    /// Break-glass controller configuration.
    #[validate(nested)]
    pub break_glass: BreakGlassConfig,

    /// Observability configuration.
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Validate the entire configuration, fail-fast.
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self)
            .map_err(|e| Error::validation(format!("Configuration invalid: {}", e)))?;
        self.validate_custom()
    }

    /// Custom validation beyond what the validator derive can express.
    fn validate_custom(&self) -> Result<()> {
        // Key-derivation cost floors are a hard security requirement and are
        // enforced before any cryptographic operation is attempted.
        if self.encryption.kdf.time_cost < MIN_KDF_TIME_COST {
            return Err(Error::validation(format!(
                "KDF time cost {} below minimum {}",
                self.encryption.kdf.time_cost, MIN_KDF_TIME_COST
            )));
        }
        if self.encryption.kdf.memory_kib < MIN_KDF_MEMORY_KIB {
            return Err(Error::validation(format!(
                "KDF memory cost {} KiB below minimum {} KiB",
                self.encryption.kdf.memory_kib, MIN_KDF_MEMORY_KIB
            )));
        }

        if self.store.renewal_safety_buffer_secs >= self.store.default_lease_ttl_secs {
            return Err(Error::validation(
                "Session renewal safety buffer must be shorter than the lease TTL",
            ));
        }

        Ok(())
    }

    /// Load the full configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let config = Self {
            store: StoreConfig::from_env()?,
            encryption: EncryptionConfig::from_env()?,
            tls: TlsConfig::from_env()?,
            rotation: RotationConfig::default(),
            break_glass: BreakGlassConfig::default(),
            observability: ObservabilityConfig::from_env(),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Secret-store backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StoreConfig {
    /// Backend address (e.g. "https://vault.example.com:8200").
    #[validate(length(min = 1, message = "Store address cannot be empty"))]
    pub address: String,

    /// KV v2 mount path.
    #[validate(length(min = 1))]
    pub kv_mount: String,

    /// Transit engine mount path.
    #[validate(length(min = 1))]
    pub transit_mount: String,

    /// Database secrets engine mount path.
    #[validate(length(min = 1))]
    pub database_mount: String,

    /// PKI engine mount path.
    #[validate(length(min = 1))]
    pub pki_mount: String,

    /// Per-call timeout in seconds for backend operations.
    #[validate(range(min = 1, max = 300))]
    pub request_timeout_secs: u64,

    /// Assumed lease TTL when the backend does not report one.
    #[validate(range(min = 60))]
    pub default_lease_ttl_secs: u64,

    /// Renew the session this many seconds before the lease expires.
    #[validate(range(min = 1))]
    pub renewal_safety_buffer_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:8200".to_string(),
            kv_mount: "secret".to_string(),
            transit_mount: "transit".to_string(),
            database_mount: "database".to_string(),
            pki_mount: "pki".to_string(),
            request_timeout_secs: 10,
            default_lease_ttl_secs: 3600,
            renewal_safety_buffer_secs: 300,
        }
    }
}

impl StoreConfig {
    /// Load from `TRUSTPLANE_STORE_*` environment variables with defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            address: env_or("TRUSTPLANE_STORE_ADDR", &defaults.address),
            kv_mount: env_or("TRUSTPLANE_STORE_KV_MOUNT", &defaults.kv_mount),
            transit_mount: env_or("TRUSTPLANE_STORE_TRANSIT_MOUNT", &defaults.transit_mount),
            database_mount: env_or("TRUSTPLANE_STORE_DATABASE_MOUNT", &defaults.database_mount),
            pki_mount: env_or("TRUSTPLANE_STORE_PKI_MOUNT", &defaults.pki_mount),
            request_timeout_secs: env_parse(
                "TRUSTPLANE_STORE_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            )?,
            default_lease_ttl_secs: env_parse(
                "TRUSTPLANE_STORE_LEASE_TTL_SECS",
                defaults.default_lease_ttl_secs,
            )?,
            renewal_safety_buffer_secs: env_parse(
                "TRUSTPLANE_STORE_RENEWAL_BUFFER_SECS",
                defaults.renewal_safety_buffer_secs,
            )?,
        })
    }

    /// Per-call timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Behavior when a single field fails to encrypt during object-level
/// encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldFailurePolicy {
    /// Store the field in cleartext and log a warning; the rest of the
    /// object still encrypts.
    #[default]
    Degrade,
    /// Abort the whole object encryption on the first field failure.
    Abort,
}

/// Argon2id parameters for password-based key derivation.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct KdfConfig {
    /// Passes over memory.
    #[validate(range(min = 1))]
    pub time_cost: u32,

    /// Memory cost in KiB.
    #[validate(range(min = 1))]
    pub memory_kib: u32,

    /// Degree of parallelism.
    #[validate(range(min = 1, max = 64))]
    pub parallelism: u32,
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self { time_cost: 3, memory_kib: 65_536, parallelism: 4 }
    }
}

/// Encryption engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EncryptionConfig {
    /// Key-derivation parameters; floors enforced by
    /// [`AppConfig::validate`].
    #[validate(nested)]
    pub kdf: KdfConfig,

    /// TTL for key handles held in the in-memory cache, seconds.
    #[validate(range(min = 1))]
    pub key_cache_ttl_secs: u64,

    /// Logical key id used when callers do not name one.
    #[validate(length(min = 1))]
    pub default_key_id: String,

    /// Logical id of the reserved break-glass emergency key.
    #[validate(length(min = 1))]
    pub emergency_key_id: String,

    /// Per-field failure policy for object-level encryption.
    pub on_field_failure: FieldFailurePolicy,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            kdf: KdfConfig::default(),
            key_cache_ttl_secs: 900,
            default_key_id: "app-data".to_string(),
            emergency_key_id: "emergency-access".to_string(),
            on_field_failure: FieldFailurePolicy::Degrade,
        }
    }
}

impl EncryptionConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            kdf: KdfConfig {
                time_cost: env_parse("TRUSTPLANE_KDF_TIME_COST", defaults.kdf.time_cost)?,
                memory_kib: env_parse("TRUSTPLANE_KDF_MEMORY_KIB", defaults.kdf.memory_kib)?,
                parallelism: env_parse("TRUSTPLANE_KDF_PARALLELISM", defaults.kdf.parallelism)?,
            },
            key_cache_ttl_secs: env_parse(
                "TRUSTPLANE_KEY_CACHE_TTL_SECS",
                defaults.key_cache_ttl_secs,
            )?,
            default_key_id: env_or("TRUSTPLANE_DEFAULT_KEY_ID", &defaults.default_key_id),
            emergency_key_id: env_or("TRUSTPLANE_EMERGENCY_KEY_ID", &defaults.emergency_key_id),
            on_field_failure: defaults.on_field_failure,
        })
    }

    pub fn key_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.key_cache_ttl_secs)
    }
}

/// Mutual-TLS manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TlsConfig {
    /// Emit an expiry warning once remaining validity drops below this many
    /// days.
    #[validate(range(min = 1, max = 365))]
    pub expiry_warning_days: i64,

    /// Interval between expiry-watcher sweeps, seconds.
    #[validate(range(min = 1))]
    pub watch_interval_secs: u64,

    /// Requested certificate TTL in hours for rotation-issued certificates.
    #[validate(range(min = 1, max = 8760))]
    pub certificate_ttl_hours: u32,

    /// PKI role used when this manager requests issuance.
    #[validate(length(min = 1))]
    pub issuance_role: String,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            expiry_warning_days: 30,
            watch_interval_secs: 3600,
            certificate_ttl_hours: 720,
            issuance_role: "service".to_string(),
        }
    }
}

impl TlsConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            expiry_warning_days: env_parse(
                "TRUSTPLANE_TLS_EXPIRY_WARNING_DAYS",
                defaults.expiry_warning_days,
            )?,
            watch_interval_secs: env_parse(
                "TRUSTPLANE_TLS_WATCH_INTERVAL_SECS",
                defaults.watch_interval_secs,
            )?,
            certificate_ttl_hours: env_parse(
                "TRUSTPLANE_TLS_CERT_TTL_HOURS",
                defaults.certificate_ttl_hours,
            )?,
            issuance_role: env_or("TRUSTPLANE_TLS_ISSUANCE_ROLE", &defaults.issuance_role),
        })
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.watch_interval_secs)
    }
}

/// Rotation scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RotationConfig {
    /// A job running longer than this is flagged for operator attention.
    #[validate(range(min = 60))]
    pub stuck_job_threshold_secs: u64,

    /// Interval between stuck-job sweeps, seconds.
    #[validate(range(min = 1))]
    pub sweep_interval_secs: u64,

    /// Jobs retained in per-path history.
    #[validate(range(min = 1, max = 100))]
    pub history_limit: usize,

    /// Default grace period for blue-green and gradual strategies, seconds.
    #[validate(range(min = 1))]
    pub default_grace_secs: u64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            stuck_job_threshold_secs: 3600,
            sweep_interval_secs: 60,
            history_limit: 10,
            default_grace_secs: 86_400,
        }
    }
}

impl RotationConfig {
    pub fn stuck_job_threshold(&self) -> Duration {
        Duration::from_secs(self.stuck_job_threshold_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn default_grace(&self) -> Duration {
        Duration::from_secs(self.default_grace_secs)
    }
}

/// Break-glass controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BreakGlassConfig {
    /// Interval between session-timeout monitor sweeps, seconds.
    #[validate(range(min = 1))]
    pub monitor_interval_secs: u64,

    /// Sessions retained in history.
    #[validate(range(min = 1, max = 1000))]
    pub history_limit: usize,
}

impl Default for BreakGlassConfig {
    fn default() -> Self {
        Self { monitor_interval_secs: 10, history_limit: 100 }
    }
}

impl BreakGlassConfig {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Service name attached to log output.
    #[validate(length(min = 1))]
    pub service_name: String,

    /// Default log level when `RUST_LOG` is not set.
    #[validate(length(min = 1))]
    pub log_level: String,

    /// Emit JSON-formatted logs.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "trustplane".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl ObservabilityConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            service_name: env_or("TRUSTPLANE_SERVICE_NAME", &defaults.service_name),
            log_level: env_or("TRUSTPLANE_LOG_LEVEL", &defaults.log_level),
            json_logs: std::env::var("TRUSTPLANE_JSON_LOGS")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(defaults.json_logs),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| Error::validation(format!("Invalid value for {}: {}", key, e))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn kdf_time_cost_floor_enforced() {
        let mut config = AppConfig::default();
        config.encryption.kdf.time_cost = 2;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("time cost"));
    }

    #[test]
    fn kdf_memory_floor_enforced() {
        let mut config = AppConfig::default();
        config.encryption.kdf.memory_kib = 512;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("memory cost"));
    }

    #[test]
    fn renewal_buffer_must_fit_inside_lease() {
        let mut config = AppConfig::default();
        config.store.renewal_safety_buffer_secs = config.store.default_lease_ttl_secs;
        assert!(config.validate().is_err());
    }

    #[test]
    fn store_config_from_env_overrides() {
        std::env::set_var("TRUSTPLANE_STORE_ADDR", "https://vault.internal:8200");
        std::env::set_var("TRUSTPLANE_STORE_TIMEOUT_SECS", "30");

        let config = StoreConfig::from_env().unwrap();
        assert_eq!(config.address, "https://vault.internal:8200");
        assert_eq!(config.request_timeout_secs, 30);

        std::env::remove_var("TRUSTPLANE_STORE_ADDR");
        std::env::remove_var("TRUSTPLANE_STORE_TIMEOUT_SECS");
    }

    #[test]
    fn invalid_env_value_is_rejected() {
        std::env::set_var("TRUSTPLANE_KDF_TIME_COST", "not-a-number");
        assert!(EncryptionConfig::from_env().is_err());
        std::env::remove_var("TRUSTPLANE_KDF_TIME_COST");
    }

    #[test]
    fn field_failure_policy_defaults_to_degrade() {
        assert_eq!(EncryptionConfig::default().on_field_failure, FieldFailurePolicy::Degrade);
    }
}
