//! # Configuration Management
//!
//! Configuration for every component of the trust core. Structures are
//! serde-deserializable, validated with the `validator` crate plus custom
//! checks (key-derivation cost floors, timeout sanity), and constructible
//! from `TRUSTPLANE_*` environment variables with sensible defaults.

mod settings;

pub use settings::{
    AppConfig, BreakGlassConfig, EncryptionConfig, FieldFailurePolicy, KdfConfig,
    ObservabilityConfig, RotationConfig, StoreConfig, TlsConfig, MIN_KDF_MEMORY_KIB,
    MIN_KDF_TIME_COST,
};
