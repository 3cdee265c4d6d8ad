//! Mutual-TLS context management.
//!
//! The [`MutualTlsManager`] builds and maintains named TLS contexts (server
//! and/or client) from certificate material obtained through the
//! [`SecretStore`], validates peer certificates and chains, rotates
//! certificates through the store's PKI issuance, and watches expiry.
//!
//! Rotation swaps a context's active certificate atomically: in-flight
//! connections keep the TLS session state they negotiated, new connections
//! pick up the fresh certificate immediately. No connection draining is
//! required.
//!
//! [`SecretStore`]: crate::secrets::SecretStore

pub mod manager;
pub mod validation;
pub mod verifier;
pub mod watcher;

pub use manager::{ClientAuthPolicy, MutualTlsManager, TlsContextSummary};
pub use validation::{validate_certificate, CertificateValidation};
pub use watcher::ExpiryWatcher;
