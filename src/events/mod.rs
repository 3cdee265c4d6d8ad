//! Typed lifecycle events for audit and observability consumers.
//!
//! Components publish [`TrustEvent`]s to an [`EventBus`]; audit and
//! notification consumers subscribe. Events for the same subject are observed
//! in the order they were published. The bus is a broadcast channel: a slow
//! or absent subscriber never blocks a publisher (observers may lose events
//! under backpressure; the append-only audit trail kept inside break-glass
//! sessions is the non-lossy record for emergency access).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Default capacity of the broadcast channel backing an [`EventBus`].
const DEFAULT_CAPACITY: usize = 1024;

/// Kinds of lifecycle events emitted by the trust core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustEventKind {
    SecretStored,
    SecretRead,
    SecretDeleted,
    KeyCreated,
    KeyRotated,
    CertificateIssued,
    CertificateRevoked,
    CertificateExpiring,
    RotationScheduled,
    RotationStarted,
    RotationCompleted,
    RotationFailed,
    RotationCancelled,
    RotationStuck,
    BreakGlassInitiated,
    BreakGlassApproved,
    BreakGlassDenied,
    BreakGlassActivated,
    BreakGlassExpired,
    BreakGlassRevoked,
    BreakGlassActionExecuted,
    SessionAuthenticated,
    SessionRenewed,
    SessionRenewalFailed,
}

impl TrustEventKind {
    /// Stable string form used in structured logs and event metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SecretStored => "secret.stored",
            Self::SecretRead => "secret.read",
            Self::SecretDeleted => "secret.deleted",
            Self::KeyCreated => "key.created",
            Self::KeyRotated => "key.rotated",
            Self::CertificateIssued => "certificate.issued",
            Self::CertificateRevoked => "certificate.revoked",
            Self::CertificateExpiring => "certificate.expiring",
            Self::RotationScheduled => "rotation.scheduled",
            Self::RotationStarted => "rotation.started",
            Self::RotationCompleted => "rotation.completed",
            Self::RotationFailed => "rotation.failed",
            Self::RotationCancelled => "rotation.cancelled",
            Self::RotationStuck => "rotation.stuck",
            Self::BreakGlassInitiated => "break_glass.initiated",
            Self::BreakGlassApproved => "break_glass.approved",
            Self::BreakGlassDenied => "break_glass.denied",
            Self::BreakGlassActivated => "break_glass.activated",
            Self::BreakGlassExpired => "break_glass.expired",
            Self::BreakGlassRevoked => "break_glass.revoked",
            Self::BreakGlassActionExecuted => "break_glass.action_executed",
            Self::SessionAuthenticated => "session.authenticated",
            Self::SessionRenewed => "session.renewed",
            Self::SessionRenewalFailed => "session.renewal_failed",
        }
    }

    /// Break-glass transitions additionally fire emergency-contact
    /// notifications.
    pub fn is_emergency(&self) -> bool {
        matches!(
            self,
            Self::BreakGlassInitiated
                | Self::BreakGlassApproved
                | Self::BreakGlassDenied
                | Self::BreakGlassActivated
                | Self::BreakGlassExpired
                | Self::BreakGlassRevoked
                | Self::BreakGlassActionExecuted
        )
    }
}

impl std::fmt::Display for TrustEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single lifecycle event.
///
/// Secret values never appear in events; `subject` is the resource id (secret
/// path, key id, context id, job id, session id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustEvent {
    /// Unique event id.
    pub id: Uuid,

    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,

    /// What happened.
    pub kind: TrustEventKind,

    /// Resource the event is about.
    pub subject: String,

    /// Caller identity responsible for the operation.
    pub actor: String,

    /// Component that emitted the event.
    pub component: String,

    /// Whether the underlying operation succeeded.
    pub success: bool,

    /// Error description for failed operations.
    pub error: Option<String>,

    /// Optional structured metadata (never secret material).
    pub metadata: Option<serde_json::Value>,
}

impl TrustEvent {
    /// Build a successful event.
    pub fn success(
        kind: TrustEventKind,
        subject: impl Into<String>,
        actor: impl Into<String>,
        component: &'static str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
            subject: subject.into(),
            actor: actor.into(),
            component: component.to_string(),
            success: true,
            error: None,
            metadata: None,
        }
    }

    /// Build a failed event carrying the error description.
    pub fn failure(
        kind: TrustEventKind,
        subject: impl Into<String>,
        actor: impl Into<String>,
        component: &'static str,
        error: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
            subject: subject.into(),
            actor: actor.into(),
            component: component.to_string(),
            success: false,
            error: Some(error.into()),
            metadata: None,
        }
    }

    /// Attach structured metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Broadcast channel for [`TrustEvent`]s.
///
/// Cloning is cheap; all clones publish into the same channel. Subscribers
/// receive events published after they subscribe.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<TrustEvent>,
}

impl EventBus {
    /// Create a bus with the default buffer capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus with an explicit buffer capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event. Publishing never fails: with no subscribers the
    /// event is dropped after being logged.
    pub fn publish(&self, event: TrustEvent) {
        tracing::debug!(
            kind = %event.kind,
            subject = %event.subject,
            actor = %event.actor,
            success = event.success,
            "Lifecycle event"
        );
        let _ = self.sender.send(event);
    }

    /// Subscribe to all subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<TrustEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").field("subscribers", &self.subscriber_count()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscriber_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(TrustEvent::success(
            TrustEventKind::SecretStored,
            "app/db",
            "svc-payments",
            "secrets",
        ));
        bus.publish(TrustEvent::success(
            TrustEventKind::SecretRead,
            "app/db",
            "svc-payments",
            "secrets",
        ));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.kind, TrustEventKind::SecretStored);
        assert_eq!(second.kind, TrustEventKind::SecretRead);
        assert_eq!(first.subject, "app/db");
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let bus = EventBus::new();
        // Must not panic or block.
        bus.publish(TrustEvent::success(
            TrustEventKind::KeyRotated,
            "transit/app",
            "scheduler",
            "rotation",
        ));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn failure_event_carries_error() {
        let event = TrustEvent::failure(
            TrustEventKind::RotationFailed,
            "app/api-key",
            "scheduler",
            "rotation",
            "backend unreachable",
        );
        assert!(!event.success);
        assert_eq!(event.error.as_deref(), Some("backend unreachable"));
    }

    #[test]
    fn emergency_kinds_flagged() {
        assert!(TrustEventKind::BreakGlassActivated.is_emergency());
        assert!(TrustEventKind::BreakGlassActionExecuted.is_emergency());
        assert!(!TrustEventKind::SecretRead.is_emergency());
    }

    #[test]
    fn kind_strings_are_namespaced() {
        assert_eq!(TrustEventKind::SecretStored.as_str(), "secret.stored");
        assert_eq!(TrustEventKind::BreakGlassDenied.as_str(), "break_glass.denied");
    }
}
