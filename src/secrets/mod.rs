//! Secret-store client/session layer.
//!
//! This module is the crate's connection to the external system of record
//! for versioned secrets, dynamic credentials, and cryptographic transit/PKI
//! operations. It is built around the [`SecretStore`] trait:
//!
//! - **KV surface**: versioned CRUD on hierarchical paths. Reads of a
//!   missing path return `Ok(None)`, never an error.
//! - **Dynamic credentials**: short-lived database credentials with their
//!   own lease.
//! - **Transit operations**: encrypt/decrypt/sign/verify performed by the
//!   backend so raw key material never leaves its trust boundary.
//! - **PKI**: certificate issuance and revocation.
//! - **Sessions**: renewable authenticated sessions; renewal happens
//!   proactively before expiry, and a failed renewal falls back to full
//!   re-authentication.
//!
//! Two implementations ship with the crate: [`VaultSecretStore`] for
//! HashiCorp Vault (or an API-compatible backend such as OpenBao) and
//! [`MemorySecretStore`], a fully-functional in-memory backend for
//! development and tests.
//!
//! # Security Considerations
//!
//! - Secret values are never logged or embedded in error messages
//! - Every state-changing call publishes a lifecycle event for audit
//!   consumers
//! - Key material and credentials are wrapped in [`SecretString`] /
//!   [`SecretBytes`] so they redact in Debug output and zero on drop

pub mod memory;
pub mod record;
pub mod store;
pub mod types;
pub mod vault;

pub use memory::MemorySecretStore;
pub use record::{
    validate_secret_path, CertificateAsset, CertificateParamsSpec, CertificateState,
    DatabaseCredentials, SecretClassification, SecretRecord, SecretRecordMetadata, SessionLease,
};
pub use store::{AuthMethod, SecretStore};
pub use types::{SecretBytes, SecretString};
pub use vault::{VaultAuth, VaultSecretStore};
