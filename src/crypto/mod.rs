//! Local cryptographic primitives.
//!
//! The [`EncryptionEngine`] provides symmetric authenticated encryption
//! (AES-256-GCM envelopes with optional context binding), password-based key
//! derivation (Argon2id with enforced cost floors), and declarative
//! field-level object encryption.
//!
//! Key material reaches the engine only through the [`KeyProvider`]
//! capability trait. Two implementations ship with the crate:
//! [`TransitKeyProvider`] wraps per-purpose data keys with the backend's
//! transit engine (the master key never leaves the backend), and
//! [`LocalKeyProvider`] holds keys in process memory, standing at the HSM
//! boundary for deployments that source keys from a hardware module. The
//! engine falls back from transit to local keys when no backend is
//! available.

pub mod engine;
pub mod fields;
pub mod kdf;
pub mod provider;

pub use engine::{EncryptedEnvelope, EncryptionEngine};
pub use fields::FieldRule;
pub use kdf::{derive_key, validate_costs, DerivedKey};
pub use provider::{KeyHandle, KeyProvider, LocalKeyProvider, TransitKeyProvider};
