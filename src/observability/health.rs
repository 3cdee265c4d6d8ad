//! # Health Checking
//!
//! Component health registry used by the facade's `health_check` surface.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status for a component.
#[derive(Debug, Clone, PartialEq)]
pub enum HealthStatus {
    /// Component is healthy and operational.
    Healthy,
    /// Component is degraded but still functional.
    Degraded { message: String },
    /// Component is unhealthy and not functional.
    Unhealthy { message: String },
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    /// Healthy or degraded.
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded { .. })
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            HealthStatus::Healthy => None,
            HealthStatus::Degraded { message } | HealthStatus::Unhealthy { message } => {
                Some(message)
            }
        }
    }
}

/// Health check result for a single component.
#[derive(Debug, Clone)]
pub struct HealthCheck {
    pub component: String,
    pub status: HealthStatus,
    pub last_check: chrono::DateTime<chrono::Utc>,
}

impl HealthCheck {
    pub fn new(component: impl Into<String>, status: HealthStatus) -> Self {
        Self { component: component.into(), status, last_check: chrono::Utc::now() }
    }

    pub fn healthy(component: impl Into<String>) -> Self {
        Self::new(component, HealthStatus::Healthy)
    }

    pub fn degraded(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(component, HealthStatus::Degraded { message: message.into() })
    }

    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(component, HealthStatus::Unhealthy { message: message.into() })
    }
}

/// Registry of per-component health, shared across the core's components.
#[derive(Clone, Default)]
pub struct HealthChecker {
    checks: Arc<RwLock<HashMap<String, HealthCheck>>>,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest health result for a component.
    pub async fn report(&self, check: HealthCheck) {
        let mut checks = self.checks.write().await;
        checks.insert(check.component.clone(), check);
    }

    /// Snapshot of all component health results.
    pub async fn snapshot(&self) -> Vec<HealthCheck> {
        let checks = self.checks.read().await;
        checks.values().cloned().collect()
    }

    /// Overall status: unhealthy if any component is unhealthy, degraded if
    /// any is degraded, healthy otherwise.
    pub async fn overall(&self) -> HealthStatus {
        let checks = self.checks.read().await;
        let mut degraded: Option<String> = None;
        for check in checks.values() {
            match &check.status {
                HealthStatus::Unhealthy { message } => {
                    return HealthStatus::Unhealthy {
                        message: format!("{}: {}", check.component, message),
                    };
                }
                HealthStatus::Degraded { message } => {
                    degraded = Some(format!("{}: {}", check.component, message));
                }
                HealthStatus::Healthy => {}
            }
        }
        match degraded {
            Some(message) => HealthStatus::Degraded { message },
            None => HealthStatus::Healthy,
        }
    }
}
