//! # Trustplane
//!
//! Trustplane is the trust-infrastructure core for a distributed
//! application: secure storage and sessions against an external secret-store
//! backend, field/data encryption, mutual-TLS context management, automated
//! rotation with zero-downtime transition strategies, and a supervised
//! "break glass" emergency-access workflow.
//!
//! ## Architecture
//!
//! ```text
//! Application callers → SecretsFacade → {SecretStore, EncryptionEngine}
//!                                            ↑
//!        RotationScheduler ── drives ────────┤
//!        MutualTlsManager ── certificates ───┤
//!        BreakGlassController ── audited elevated path
//!
//!        EventBus ← lifecycle events from every component
//! ```
//!
//! ## Core Components
//!
//! - [`secrets`]: the [`SecretStore`] trait with Vault-backed and in-memory
//!   implementations: versioned KV, dynamic database credentials,
//!   transit-style cryptography, PKI issuance, renewable sessions
//! - [`crypto`]: the [`EncryptionEngine`]: AES-256-GCM envelopes with
//!   context binding, Argon2id key derivation with enforced cost floors,
//!   declarative field-level object encryption, pluggable [`KeyProvider`]s
//! - [`tls`]: the [`MutualTlsManager`]: named TLS contexts, client-auth
//!   policies, peer validation, certificate rotation, expiry watching
//! - [`rotation`]: the [`RotationScheduler`]: recurring and on-demand
//!   rotation with immediate, blue-green, and gradual strategies
//! - [`breakglass`]: the [`BreakGlassController`]: approval-gated,
//!   time-boxed, fully audited emergency access
//! - [`facade`]: the [`SecretsFacade`] SDK surface for application callers
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use trustplane::config::AppConfig;
//! use trustplane::crypto::{EncryptionEngine, LocalKeyProvider};
//! use trustplane::events::EventBus;
//! use trustplane::facade::{GetOptions, SecretsFacade};
//! use trustplane::secrets::MemorySecretStore;
//!
//! #[tokio::main]
//! async fn main() -> trustplane::Result<()> {
//!     let config = AppConfig::from_env()?;
//!     trustplane::observability::init_tracing(&config.observability)?;
//!
//!     let events = EventBus::new();
//!     let store = Arc::new(MemorySecretStore::new(events.clone()));
//!     let engine = EncryptionEngine::initialize(
//!         Arc::new(LocalKeyProvider::new()),
//!         config.encryption.clone(),
//!         events.clone(),
//!     )
//!     .await?;
//!
//!     let facade = SecretsFacade::new(store, engine, events, Duration::from_secs(300));
//!     let secret = facade.get_secret("app/database/primary", GetOptions::default()).await?;
//!     println!("found: {}", secret.is_some());
//!     Ok(())
//! }
//! ```

pub mod breakglass;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod events;
pub mod facade;
pub mod observability;
pub mod rotation;
pub mod secrets;
pub mod tls;

// Re-export commonly used types and traits
pub use breakglass::BreakGlassController;
pub use config::AppConfig;
pub use crypto::{EncryptionEngine, KeyProvider};
pub use errors::{Error, Result};
pub use events::{EventBus, TrustEvent, TrustEventKind};
pub use facade::SecretsFacade;
pub use rotation::RotationScheduler;
pub use secrets::SecretStore;
pub use tls::MutualTlsManager;

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_available() {
        assert!(!VERSION.is_empty());
        assert_eq!(APP_NAME, "trustplane");
    }
}
