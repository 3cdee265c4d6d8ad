//! Rotation job and policy types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// What kind of material a rotation target holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretType {
    DatabaseCredential,
    ApiKey,
    Certificate,
    EncryptionKey,
    SigningSecret,
}

impl SecretType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DatabaseCredential => "database_credential",
            Self::ApiKey => "api_key",
            Self::Certificate => "certificate",
            Self::EncryptionKey => "encryption_key",
            Self::SigningSecret => "signing_secret",
        }
    }
}

impl fmt::Display for SecretType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SecretType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "database_credential" => Ok(Self::DatabaseCredential),
            "api_key" => Ok(Self::ApiKey),
            "certificate" => Ok(Self::Certificate),
            "encryption_key" => Ok(Self::EncryptionKey),
            "signing_secret" => Ok(Self::SigningSecret),
            _ => Err(format!("Unknown secret type: {}", s)),
        }
    }
}

/// Zero-downtime transition strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RotationStrategy {
    /// Overwrite in one step. Acceptable only when callers tolerate a
    /// momentary switch of the old value.
    Immediate,
    /// Provision alongside the old value, verify, then switch.
    #[default]
    BlueGreen,
    /// Retain the previous value inside the record for the grace window.
    Gradual,
}

impl RotationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::BlueGreen => "blue_green",
            Self::Gradual => "gradual",
        }
    }
}

impl fmt::Display for RotationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse recurrence bucket. The contract is "fires no more often than the
/// interval, skips do not compound": not wall-clock cron semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationInterval {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
}

impl RotationInterval {
    pub fn duration(&self) -> Duration {
        const DAY: u64 = 24 * 60 * 60;
        match self {
            Self::Daily => Duration::from_secs(DAY),
            Self::Weekly => Duration::from_secs(7 * DAY),
            Self::Monthly => Duration::from_secs(30 * DAY),
            Self::Quarterly => Duration::from_secs(91 * DAY),
        }
    }
}

/// Policy attached to a scheduled rotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationPolicy {
    pub interval: RotationInterval,

    /// Grace period for blue-green staging copies and gradual previous
    /// values; the scheduler default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_secs: Option<u64>,

    #[serde(default)]
    pub strategy: RotationStrategy,

    /// Carried in job metadata for callers that gate rotations on an
    /// external approval step; the scheduler itself does not enforce it.
    #[serde(default)]
    pub requires_approval: bool,
}

impl RotationPolicy {
    pub fn new(interval: RotationInterval) -> Self {
        Self { interval, grace_secs: None, strategy: RotationStrategy::default(), requires_approval: false }
    }

    pub fn with_strategy(mut self, strategy: RotationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace_secs = Some(grace.as_secs());
        self
    }
}

/// Job state machine: `Scheduled → Running → {Completed | Failed}`;
/// `Scheduled → Cancelled`. `RolledBack` is reserved: no executor path sets
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Scheduled,
    Running,
    Completed,
    Failed,
    Cancelled,
    RolledBack,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::RolledBack => "rolled_back",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled | Self::RolledBack)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A rotation job: either a recurring registration or a single run.
///
/// `Completed` is only ever set after the new material has been durably
/// stored and read back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationJob {
    pub id: String,
    pub path: String,
    pub secret_type: SecretType,
    pub policy: RotationPolicy,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Version that was current before the rotation.
    pub old_version: Option<u64>,
    /// Version the rotation produced.
    pub new_version: Option<u64>,
    pub error: Option<String>,
    /// Set by the stuck-job sweep; operator attention required.
    #[serde(default)]
    pub stuck: bool,
}

impl RotationJob {
    pub fn new(path: impl Into<String>, secret_type: SecretType, policy: RotationPolicy) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            path: path.into(),
            secret_type,
            policy,
            status: JobStatus::Scheduled,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            old_version: None,
            new_version: None,
            error: None,
            stuck: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_type_round_trips() {
        for t in [
            SecretType::DatabaseCredential,
            SecretType::ApiKey,
            SecretType::Certificate,
            SecretType::EncryptionKey,
            SecretType::SigningSecret,
        ] {
            assert_eq!(t.as_str().parse::<SecretType>().unwrap(), t);
        }
        assert!("totp".parse::<SecretType>().is_err());
    }

    #[test]
    fn interval_buckets_are_ordered() {
        assert!(RotationInterval::Daily.duration() < RotationInterval::Weekly.duration());
        assert!(RotationInterval::Weekly.duration() < RotationInterval::Monthly.duration());
        assert!(RotationInterval::Monthly.duration() < RotationInterval::Quarterly.duration());
    }

    #[test]
    fn terminal_states() {
        assert!(!JobStatus::Scheduled.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn new_job_is_scheduled() {
        let job = RotationJob::new(
            "app/api-key",
            SecretType::ApiKey,
            RotationPolicy::new(RotationInterval::Weekly),
        );
        assert_eq!(job.status, JobStatus::Scheduled);
        assert!(job.started_at.is_none());
        assert!(!job.stuck);
    }

    #[test]
    fn policy_serialization_defaults() {
        let json = r#"{"interval":"weekly"}"#;
        let policy: RotationPolicy = serde_json::from_str(json).unwrap();
        assert_eq!(policy.strategy, RotationStrategy::BlueGreen);
        assert!(!policy.requires_approval);
        assert!(policy.grace_secs.is_none());
    }
}
