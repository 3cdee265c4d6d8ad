//! Break-glass procedures: named bundles of allowed actions, approval
//! requirements, and time limits.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Kinds of emergency actions a procedure may allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyActionKind {
    /// Reveal a secret's value.
    RevealSecret,
    /// Decrypt a ciphertext envelope under the reserved emergency key.
    EmergencyDecrypt,
    /// Grant a principal temporary access to a resource.
    GrantTemporaryAccess,
    /// Bypass a named policy.
    BypassPolicy,
    /// Suspend rotation for a resource.
    SuspendRotation,
    /// Override an expiration.
    OverrideExpiration,
}

impl EmergencyActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RevealSecret => "reveal_secret",
            Self::EmergencyDecrypt => "emergency_decrypt",
            Self::GrantTemporaryAccess => "grant_temporary_access",
            Self::BypassPolicy => "bypass_policy",
            Self::SuspendRotation => "suspend_rotation",
            Self::OverrideExpiration => "override_expiration",
        }
    }
}

impl fmt::Display for EmergencyActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Urgency declared at initiation; carried through notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// One allow-list entry: an action kind plus a resource pattern (exact path
/// or `*`-suffixed prefix; bare `*` matches everything).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AllowedAction {
    pub kind: EmergencyActionKind,
    pub resource_pattern: String,
}

impl AllowedAction {
    pub fn new(kind: EmergencyActionKind, resource_pattern: impl Into<String>) -> Self {
        Self { kind, resource_pattern: resource_pattern.into() }
    }

    /// Whether this entry permits an action on a resource.
    pub fn permits(&self, kind: EmergencyActionKind, resource: &str) -> bool {
        if self.kind != kind {
            return false;
        }
        match self.resource_pattern.strip_suffix('*') {
            Some(prefix) => resource.starts_with(prefix),
            None => self.resource_pattern == resource,
        }
    }
}

/// A named emergency-access procedure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakGlassProcedure {
    pub id: String,
    pub name: String,
    pub allowed_actions: Vec<AllowedAction>,
    /// Approvals required before activation. Zero auto-activates at
    /// initiation.
    pub required_approvals: usize,
    /// Active-session time limit in seconds.
    pub time_limit_secs: u64,
}

impl BreakGlassProcedure {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        required_approvals: usize,
        time_limit: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            allowed_actions: Vec::new(),
            required_approvals,
            time_limit_secs: time_limit.as_secs(),
        }
    }

    pub fn allow(mut self, kind: EmergencyActionKind, resource_pattern: impl Into<String>) -> Self {
        self.allowed_actions.push(AllowedAction::new(kind, resource_pattern));
        self
    }

    pub fn time_limit(&self) -> Duration {
        Duration::from_secs(self.time_limit_secs)
    }

    /// Whether the procedure's allow-list permits an action/resource pair.
    pub fn permits(&self, kind: EmergencyActionKind, resource: &str) -> bool {
        self.allowed_actions.iter().any(|entry| entry.permits(kind, resource))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_list_exact_and_prefix_patterns() {
        let entry = AllowedAction::new(EmergencyActionKind::RevealSecret, "app/db/*");
        assert!(entry.permits(EmergencyActionKind::RevealSecret, "app/db/primary"));
        assert!(!entry.permits(EmergencyActionKind::RevealSecret, "app/cache/primary"));
        assert!(!entry.permits(EmergencyActionKind::EmergencyDecrypt, "app/db/primary"));

        let wildcard = AllowedAction::new(EmergencyActionKind::SuspendRotation, "*");
        assert!(wildcard.permits(EmergencyActionKind::SuspendRotation, "anything/at/all"));
    }

    #[test]
    fn procedure_permits_through_any_entry() {
        let procedure = BreakGlassProcedure::new(
            "db-outage",
            "Database outage recovery",
            2,
            Duration::from_secs(900),
        )
        .allow(EmergencyActionKind::RevealSecret, "app/db/*")
        .allow(EmergencyActionKind::SuspendRotation, "app/db/*");

        assert!(procedure.permits(EmergencyActionKind::RevealSecret, "app/db/primary"));
        assert!(procedure.permits(EmergencyActionKind::SuspendRotation, "app/db/primary"));
        assert!(!procedure.permits(EmergencyActionKind::BypassPolicy, "app/db/primary"));
        assert_eq!(procedure.time_limit(), Duration::from_secs(900));
    }

    #[test]
    fn procedure_serialization_round_trips() {
        let procedure =
            BreakGlassProcedure::new("p", "Procedure", 1, Duration::from_secs(60))
                .allow(EmergencyActionKind::EmergencyDecrypt, "*");
        let json = serde_json::to_string(&procedure).unwrap();
        let back: BreakGlassProcedure = serde_json::from_str(&json).unwrap();
        assert_eq!(back.allowed_actions, procedure.allowed_actions);
        assert_eq!(back.required_approvals, 1);
    }
}
