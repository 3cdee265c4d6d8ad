//! Error types for trust-infrastructure operations.
//!
//! A single crate-wide taxonomy so callers can distinguish "not found" from
//! "access denied" from "backend unavailable" from "integrity violation".
//! Only connection and timeout failures are retryable; integrity and
//! authorization failures propagate immediately.

use thiserror::Error;

/// Result type for trustplane operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur across the trust-infrastructure core.
#[derive(Error, Debug)]
pub enum Error {
    /// Authentication or session failure against the secret-store backend.
    /// Fatal for the client until re-authenticated.
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    /// A resource that must exist does not. Read paths return `Ok(None)`
    /// instead of this variant; it is reserved for operations that require
    /// the resource (rotation targets, TLS contexts, sessions, jobs).
    #[error("{resource} not found: {id}")]
    NotFound { resource: String, id: String },

    /// The secrets backend is unreachable or returned a transport-level
    /// failure. The only class (with [`Error::Timeout`]) a caller may retry.
    #[error("Backend connection failed: {message}")]
    Connection { message: String },

    /// A backend call exceeded its deadline.
    #[error("Operation timed out: {operation} after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },

    /// Authenticated-encryption failure: tag or context binding mismatch.
    /// Never retried, never ignored.
    #[error("Integrity violation: {message}")]
    Integrity { message: String },

    /// The caller is not permitted to perform the operation (distinct from
    /// not-found). Break-glass gating failures use this variant.
    #[error("Access denied: {message}")]
    Unauthorized { message: String },

    /// Malformed configuration or input, rejected fail-fast.
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// A rotation job failed; the old material remains authoritative.
    #[error("Rotation failed for '{path}': {reason}")]
    Rotation { path: String, reason: String },

    /// Backend-specific error that is not a transport failure.
    #[error("Backend error: {message}")]
    Backend { message: String },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Create an authentication error.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth { message: message.into() }
    }

    /// Create a not-found error.
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound { resource: resource.into(), id: id.into() }
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into() }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, duration_ms: u64) -> Self {
        Self::Timeout { operation: operation.into(), duration_ms }
    }

    /// Create an integrity error.
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity { message: message.into() }
    }

    /// Create an access-denied error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized { message: message.into() }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    /// Create a rotation error.
    pub fn rotation(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rotation { path: path.into(), reason: reason.into() }
    }

    /// Create a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend { message: message.into() }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Whether a caller may retry the failed operation. Only transport-level
    /// failures qualify; everything else is terminal for that attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }

    /// Whether this failure is security-relevant and must also be surfaced
    /// on the event stream.
    pub fn is_security_relevant(&self) -> bool {
        matches!(
            self,
            Self::Auth { .. }
                | Self::Integrity { .. }
                | Self::Unauthorized { .. }
                | Self::Rotation { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_map_to_variants() {
        assert!(matches!(Error::auth("bad token"), Error::Auth { .. }));
        assert!(matches!(Error::not_found("secret", "db/creds"), Error::NotFound { .. }));
        assert!(matches!(Error::integrity("tag mismatch"), Error::Integrity { .. }));
        assert!(matches!(Error::rotation("a/b", "boom"), Error::Rotation { .. }));
    }

    #[test]
    fn retryable_is_limited_to_transport() {
        assert!(Error::connection("down").is_retryable());
        assert!(Error::timeout("kv.get", 5_000).is_retryable());
        assert!(!Error::auth("expired").is_retryable());
        assert!(!Error::integrity("tampered").is_retryable());
        assert!(!Error::unauthorized("nope").is_retryable());
    }

    #[test]
    fn security_relevant_classes() {
        assert!(Error::auth("x").is_security_relevant());
        assert!(Error::integrity("x").is_security_relevant());
        assert!(!Error::connection("x").is_security_relevant());
    }

    #[test]
    fn display_includes_context() {
        let err = Error::rotation("services/payments/api-key", "generation failed");
        assert!(err.to_string().contains("services/payments/api-key"));
        assert!(err.to_string().contains("generation failed"));
    }
}
