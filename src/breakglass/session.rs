//! Break-glass session state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::breakglass::procedure::{EmergencyActionKind, Urgency};

/// Session state machine: `Pending → Active → {Expired | Revoked}`;
/// `Pending → Revoked` on denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Active,
    Expired,
    Revoked,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Expired | Self::Revoked)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A recorded approval or denial vote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalVote {
    pub approver: String,
    pub approved: bool,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// One executed (or attempted) emergency action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub kind: EmergencyActionKind,
    pub resource: String,
    pub actor: String,
    pub success: bool,
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A supervised emergency-access session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakGlassSession {
    pub id: String,
    pub initiator: String,
    pub procedure_id: String,
    pub justification: String,
    pub urgency: Urgency,
    pub status: SessionStatus,
    /// Votes in the order they were cast.
    pub approvals: Vec<ApprovalVote>,
    pub created_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    /// Hard deadline once active.
    pub expires_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Ordered log of executed actions.
    pub action_log: Vec<ActionLogEntry>,
    /// Append-only audit trail.
    pub audit_trail: Vec<String>,
}

impl BreakGlassSession {
    pub fn new(
        initiator: impl Into<String>,
        procedure_id: impl Into<String>,
        justification: impl Into<String>,
        urgency: Urgency,
    ) -> Self {
        let mut session = Self {
            id: Uuid::new_v4().to_string(),
            initiator: initiator.into(),
            procedure_id: procedure_id.into(),
            justification: justification.into(),
            urgency,
            status: SessionStatus::Pending,
            approvals: Vec::new(),
            created_at: Utc::now(),
            activated_at: None,
            expires_at: None,
            ended_at: None,
            action_log: Vec::new(),
            audit_trail: Vec::new(),
        };
        session.audit(format!(
            "initiated by {} under procedure {}",
            session.initiator, session.procedure_id
        ));
        session
    }

    /// Append a timestamped line to the audit trail. The trail is
    /// append-only: nothing else mutates it.
    pub fn audit(&mut self, entry: impl AsRef<str>) {
        self.audit_trail.push(format!("{} {}", Utc::now().to_rfc3339(), entry.as_ref()));
    }

    /// Count of affirmative votes.
    pub fn approval_count(&self) -> usize {
        self.approvals.iter().filter(|vote| vote.approved).count()
    }

    /// Whether `approver` has already voted.
    pub fn has_voted(&self, approver: &str) -> bool {
        self.approvals.iter().any(|vote| vote.approver == approver)
    }

    /// Active and within the time limit at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Active
            && self.expires_at.map(|deadline| now < deadline).unwrap_or(false)
    }

    /// Past its deadline while still marked active.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Active
            && self.expires_at.map(|deadline| now >= deadline).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_pending_with_audit_entry() {
        let session =
            BreakGlassSession::new("oncall", "db-outage", "primary down", Urgency::Critical);
        assert_eq!(session.status, SessionStatus::Pending);
        assert_eq!(session.audit_trail.len(), 1);
        assert!(session.audit_trail[0].contains("initiated by oncall"));
        assert!(session.action_log.is_empty());
    }

    #[test]
    fn approval_counting_ignores_denials() {
        let mut session = BreakGlassSession::new("a", "p", "j", Urgency::Low);
        session.approvals.push(ApprovalVote {
            approver: "x".into(),
            approved: true,
            reason: None,
            timestamp: Utc::now(),
        });
        session.approvals.push(ApprovalVote {
            approver: "y".into(),
            approved: false,
            reason: Some("no".into()),
            timestamp: Utc::now(),
        });
        assert_eq!(session.approval_count(), 1);
        assert!(session.has_voted("x"));
        assert!(session.has_voted("y"));
        assert!(!session.has_voted("z"));
    }

    #[test]
    fn active_window_is_bounded_by_deadline() {
        let mut session = BreakGlassSession::new("a", "p", "j", Urgency::High);
        let now = Utc::now();
        session.status = SessionStatus::Active;
        session.expires_at = Some(now + chrono::Duration::minutes(5));

        assert!(session.is_active(now));
        assert!(!session.is_overdue(now));

        let later = now + chrono::Duration::minutes(6);
        assert!(!session.is_active(later));
        assert!(session.is_overdue(later));
    }

    #[test]
    fn terminal_states() {
        assert!(SessionStatus::Expired.is_terminal());
        assert!(SessionStatus::Revoked.is_terminal());
        assert!(!SessionStatus::Pending.is_terminal());
        assert!(!SessionStatus::Active.is_terminal());
    }
}
