//! End-to-end break-glass lifecycle over the in-memory backend: approval
//! gating, emergency actions against live collaborators, automatic expiry
//! through the monitor task, and audit completeness.

use std::sync::Arc;
use std::time::Duration;

use trustplane::breakglass::{
    BreakGlassController, BreakGlassProcedure, BreakGlassRequest, EmergencyActionKind,
    SessionStatus, Urgency,
};
use trustplane::config::{BreakGlassConfig, EncryptionConfig, RotationConfig};
use trustplane::crypto::{EncryptionEngine, LocalKeyProvider};
use trustplane::errors::Error;
use trustplane::events::{EventBus, TrustEventKind};
use trustplane::rotation::{RotationExecutor, RotationScheduler, SecretType};
use trustplane::secrets::{MemorySecretStore, SecretStore};

struct Harness {
    store: Arc<MemorySecretStore>,
    engine: Arc<EncryptionEngine>,
    scheduler: RotationScheduler,
    controller: Arc<BreakGlassController>,
    events: EventBus,
}

async fn harness(procedure: BreakGlassProcedure, monitor_interval_secs: u64) -> Harness {
    let events = EventBus::new();
    let store = Arc::new(MemorySecretStore::new(events.clone()));
    let engine = EncryptionEngine::initialize(
        Arc::new(LocalKeyProvider::new()),
        EncryptionConfig::default(),
        events.clone(),
    )
    .await
    .unwrap();
    let scheduler = RotationScheduler::new(
        RotationExecutor::new(store.clone(), Duration::from_millis(20))
            .with_engine(engine.clone()),
        RotationConfig::default(),
        events.clone(),
    );
    let controller = BreakGlassController::with_collaborators(
        store.clone(),
        engine.clone(),
        scheduler.clone(),
        BreakGlassConfig { monitor_interval_secs, history_limit: 50 },
        events.clone(),
    );
    controller.register_procedure(procedure).await;
    Harness { store, engine, scheduler, controller, events }
}

fn incident_procedure(approvals: usize, time_limit: Duration) -> BreakGlassProcedure {
    BreakGlassProcedure::new("incident", "Production incident response", approvals, time_limit)
        .allow(EmergencyActionKind::RevealSecret, "app/*")
        .allow(EmergencyActionKind::EmergencyDecrypt, "*")
        .allow(EmergencyActionKind::SuspendRotation, "app/*")
        .allow(EmergencyActionKind::BypassPolicy, "policies/*")
}

fn request() -> BreakGlassRequest {
    BreakGlassRequest {
        procedure_id: "incident".to_string(),
        initiator: "oncall-engineer".to_string(),
        justification: "database outage, need primary credentials".to_string(),
        urgency: Urgency::Critical,
    }
}

#[tokio::test]
async fn full_lifecycle_with_two_approvers() {
    let h = harness(incident_procedure(2, Duration::from_secs(300)), 3600).await;
    h.store
        .put("app/db/primary", serde_json::json!({"password": "s3cr3t"}), None)
        .await
        .unwrap();

    let session_id = h.controller.initiate(request()).await.unwrap();
    assert_eq!(h.controller.session(&session_id).await.unwrap().status, SessionStatus::Pending);

    // N approvals, exactly: the first leaves the session pending.
    let status = h.controller.approve(&session_id, "security-lead", true, None).await.unwrap();
    assert_eq!(status, SessionStatus::Pending);
    let status = h
        .controller
        .approve(&session_id, "platform-lead", true, Some("confirmed outage"))
        .await
        .unwrap();
    assert_eq!(status, SessionStatus::Active);

    // Allow-listed reveal returns the secret value.
    let result = h
        .controller
        .execute_action(&session_id, EmergencyActionKind::RevealSecret, "app/db/primary", None)
        .await
        .unwrap();
    assert_eq!(result.value["password"], "s3cr3t");

    // Emergency decrypt of an engine-produced envelope.
    let envelope = h.engine.encrypt(b"emergency-payload", None, None).await.unwrap();
    let result = h
        .controller
        .execute_action(
            &session_id,
            EmergencyActionKind::EmergencyDecrypt,
            "ciphertext",
            Some(serde_json::json!({ "envelope": envelope })),
        )
        .await
        .unwrap();
    let plaintext = base64::Engine::decode(
        &base64::engine::general_purpose::STANDARD,
        result.value["plaintext_base64"].as_str().unwrap(),
    )
    .unwrap();
    assert_eq!(plaintext, b"emergency-payload");

    // Suspend rotation through the live scheduler.
    h.controller
        .execute_action(&session_id, EmergencyActionKind::SuspendRotation, "app/db/primary", None)
        .await
        .unwrap();
    let err = h
        .scheduler
        .rotate_now("app/db/primary", SecretType::ApiKey, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("suspended"));

    // Revoke and verify the gate closes.
    h.controller.revoke(&session_id, "security-lead", Some("incident resolved")).await.unwrap();
    let err = h
        .controller
        .execute_action(&session_id, EmergencyActionKind::RevealSecret, "app/db/primary", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unauthorized { .. }));

    // Audit trail captured the whole story in order.
    let session = h.controller.session(&session_id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Revoked);
    assert_eq!(session.action_log.len(), 3);
    assert!(session.action_log.iter().all(|entry| entry.success));
    let trail = session.audit_trail.join("\n");
    assert!(trail.contains("initiated by oncall-engineer"));
    assert!(trail.contains("approved by security-lead"));
    assert!(trail.contains("activated with 2 approvals"));
    assert!(trail.contains("revoked by security-lead"));

    h.controller.close().await;
    h.scheduler.close().await;
}

#[tokio::test]
async fn denial_revokes_and_notifies() {
    let h = harness(incident_procedure(2, Duration::from_secs(300)), 3600).await;
    let mut rx = h.events.subscribe();

    let session_id = h.controller.initiate(request()).await.unwrap();
    h.controller.approve(&session_id, "security-lead", true, None).await.unwrap();
    let status = h
        .controller
        .approve(&session_id, "ciso", false, Some("use the standby replica instead"))
        .await
        .unwrap();
    assert_eq!(status, SessionStatus::Revoked);

    let mut saw_denied = false;
    while let Ok(event) = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await {
        if event.unwrap().kind == TrustEventKind::BreakGlassDenied {
            saw_denied = true;
        }
    }
    assert!(saw_denied, "denial must fire an emergency notification");

    // The denied session lands in history.
    let history = h.controller.session_history(Some(10)).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, SessionStatus::Revoked);

    h.controller.close().await;
    h.scheduler.close().await;
}

#[tokio::test]
async fn monitor_expires_session_without_further_input() {
    // 1-second monitor interval, sub-second session time limit.
    let h = harness(incident_procedure(0, Duration::from_millis(200)), 1).await;

    let session_id = h.controller.initiate(request()).await.unwrap();
    assert_eq!(h.controller.session(&session_id).await.unwrap().status, SessionStatus::Active);

    // Wait past the limit plus one monitor interval; no explicit sweep call.
    tokio::time::sleep(Duration::from_millis(1600)).await;

    let session = h.controller.session(&session_id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Expired);
    assert!(h.controller.active_sessions().await.is_empty());

    let err = h
        .controller
        .execute_action(&session_id, EmergencyActionKind::RevealSecret, "app/x", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unauthorized { .. }));

    h.controller.close().await;
    h.scheduler.close().await;
}

#[tokio::test]
async fn every_action_lands_in_audit_stream_regardless_of_outcome() {
    let h = harness(incident_procedure(0, Duration::from_secs(300)), 3600).await;
    h.store.put("app/ok", serde_json::json!("v"), None).await.unwrap();
    let mut rx = h.events.subscribe();

    let session_id = h.controller.initiate(request()).await.unwrap();

    // One success, one failure (missing secret), one allow-list denial.
    h.controller
        .execute_action(&session_id, EmergencyActionKind::RevealSecret, "app/ok", None)
        .await
        .unwrap();
    h.controller
        .execute_action(&session_id, EmergencyActionKind::RevealSecret, "app/missing", None)
        .await
        .unwrap_err();
    h.controller
        .execute_action(&session_id, EmergencyActionKind::OverrideExpiration, "app/ok", None)
        .await
        .unwrap_err();

    let mut executed = Vec::new();
    while let Ok(event) = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await {
        let event = event.unwrap();
        if event.kind == TrustEventKind::BreakGlassActionExecuted {
            executed.push(event);
        }
    }
    assert_eq!(executed.len(), 3);
    assert_eq!(executed.iter().filter(|e| e.success).count(), 1);
    assert_eq!(executed.iter().filter(|e| !e.success).count(), 2);
    // Attribution: every entry carries the initiator and a timestamp.
    assert!(executed.iter().all(|e| e.actor == "oncall-engineer"));

    let session = h.controller.session(&session_id).await.unwrap();
    assert_eq!(session.action_log.len(), 3);

    h.controller.close().await;
    h.scheduler.close().await;
}
