//! Break-glass controller: initiation, approval, execution, revocation, and
//! timeout monitoring.

use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::breakglass::procedure::{BreakGlassProcedure, EmergencyActionKind, Urgency};
use crate::breakglass::session::{
    ActionLogEntry, ApprovalVote, BreakGlassSession, SessionStatus,
};
use crate::config::BreakGlassConfig;
use crate::crypto::engine::{EncryptedEnvelope, EncryptionEngine};
use crate::errors::{Error, Result};
use crate::events::{EventBus, TrustEvent, TrustEventKind};
use crate::rotation::scheduler::RotationScheduler;
use crate::secrets::store::SecretStore;

const COMPONENT: &str = "breakglass.controller";

fn time_limit_delta(procedure: &BreakGlassProcedure) -> chrono::Duration {
    chrono::Duration::from_std(procedure.time_limit())
        .unwrap_or_else(|_| chrono::Duration::seconds(procedure.time_limit_secs as i64))
}

/// Request to open an emergency-access session.
#[derive(Debug, Clone)]
pub struct BreakGlassRequest {
    pub procedure_id: String,
    pub initiator: String,
    pub justification: String,
    pub urgency: Urgency,
}

/// Result of an executed emergency action.
#[derive(Debug, Clone)]
pub struct ActionResult {
    /// Action payload: the revealed value, decrypted plaintext (base64), or
    /// an acknowledgment.
    pub value: serde_json::Value,
}

/// Emergency-access state machine over registered procedures.
///
/// Sessions and history are in-memory and non-durable: a restart loses
/// in-flight sessions, which then have to be re-initiated.
pub struct BreakGlassController {
    store: Arc<dyn SecretStore>,
    engine: Option<Arc<EncryptionEngine>>,
    scheduler: Option<RotationScheduler>,
    config: BreakGlassConfig,
    events: EventBus,
    procedures: RwLock<HashMap<String, BreakGlassProcedure>>,
    sessions: RwLock<HashMap<String, BreakGlassSession>>,
    history: RwLock<VecDeque<BreakGlassSession>>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl BreakGlassController {
    pub fn new(
        store: Arc<dyn SecretStore>,
        config: BreakGlassConfig,
        events: EventBus,
    ) -> Arc<Self> {
        let controller = Arc::new(Self {
            store,
            engine: None,
            scheduler: None,
            config,
            events,
            procedures: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::new()),
            monitor: Mutex::new(None),
        });
        controller.spawn_monitor();
        controller
    }

    /// Full-capability controller: decryption and rotation-suspension
    /// actions need the engine and scheduler.
    pub fn with_collaborators(
        store: Arc<dyn SecretStore>,
        engine: Arc<EncryptionEngine>,
        scheduler: RotationScheduler,
        config: BreakGlassConfig,
        events: EventBus,
    ) -> Arc<Self> {
        let controller = Arc::new(Self {
            store,
            engine: Some(engine),
            scheduler: Some(scheduler),
            config,
            events,
            procedures: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::new()),
            monitor: Mutex::new(None),
        });
        controller.spawn_monitor();
        controller
    }

    fn spawn_monitor(self: &Arc<Self>) {
        let controller = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(controller.config.monitor_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                controller.expire_overdue_sessions().await;
            }
        });
        if let Ok(mut monitor) = self.monitor.try_lock() {
            *monitor = Some(handle);
        }
    }

    /// One monitor sweep: any active session past its limit transitions to
    /// `Expired` without further input.
    pub async fn expire_overdue_sessions(&self) {
        let now = Utc::now();
        let mut expired = Vec::new();
        {
            let mut sessions = self.sessions.write().await;
            for session in sessions.values_mut() {
                if session.is_overdue(now) {
                    session.status = SessionStatus::Expired;
                    session.ended_at = Some(now);
                    session.audit("expired: time limit reached");
                    expired.push(session.clone());
                }
            }
        }
        for session in expired {
            tracing::warn!(session_id = %session.id, initiator = %session.initiator, "Break-glass session expired");
            self.notify(TrustEvent::success(
                TrustEventKind::BreakGlassExpired,
                session.id.clone(),
                session.initiator.clone(),
                COMPONENT,
            ));
            self.archive(session).await;
        }
    }

    /// Emergency-contact notification: every break-glass transition is
    /// published; consumers subscribed to the bus deliver pages/mail.
    fn notify(&self, event: TrustEvent) {
        debug_assert!(event.kind.is_emergency());
        self.events.publish(event);
    }

    async fn archive(&self, session: BreakGlassSession) {
        let mut history = self.history.write().await;
        history.push_back(session);
        while history.len() > self.config.history_limit {
            history.pop_front();
        }
    }

    /// Register (or replace) a procedure.
    pub async fn register_procedure(&self, procedure: BreakGlassProcedure) {
        tracing::info!(
            procedure_id = %procedure.id,
            required_approvals = procedure.required_approvals,
            time_limit_secs = procedure.time_limit_secs,
            "Registered break-glass procedure"
        );
        self.procedures.write().await.insert(procedure.id.clone(), procedure);
    }

    /// Open a session. Procedures requiring no approvals activate
    /// immediately; otherwise the session is `Pending` until the required
    /// approvals arrive.
    pub async fn initiate(&self, request: BreakGlassRequest) -> Result<String> {
        if request.justification.trim().is_empty() {
            return Err(Error::validation("A justification is required to break glass"));
        }

        let procedure = self
            .procedures
            .read()
            .await
            .get(&request.procedure_id)
            .cloned()
            .ok_or_else(|| Error::not_found("break-glass procedure", &request.procedure_id))?;

        let mut session = BreakGlassSession::new(
            &request.initiator,
            &request.procedure_id,
            &request.justification,
            request.urgency,
        );

        if procedure.required_approvals == 0 {
            let now = Utc::now();
            session.status = SessionStatus::Active;
            session.activated_at = Some(now);
            session.expires_at = Some(now + time_limit_delta(&procedure));
            session.audit("auto-activated: procedure requires no approvals");
        }

        let session_id = session.id.clone();
        let status = session.status;
        tracing::warn!(
            session_id = %session_id,
            initiator = %request.initiator,
            procedure_id = %request.procedure_id,
            urgency = ?request.urgency,
            status = %status,
            "Break-glass session initiated"
        );

        self.notify(
            TrustEvent::success(
                TrustEventKind::BreakGlassInitiated,
                session_id.clone(),
                request.initiator.clone(),
                COMPONENT,
            )
            .with_metadata(serde_json::json!({
                "procedure_id": request.procedure_id,
                "urgency": request.urgency,
                "justification": request.justification,
            })),
        );
        if status == SessionStatus::Active {
            self.notify(TrustEvent::success(
                TrustEventKind::BreakGlassActivated,
                session_id.clone(),
                request.initiator.clone(),
                COMPONENT,
            ));
        }

        self.sessions.write().await.insert(session_id.clone(), session);
        Ok(session_id)
    }

    /// Record an approval or denial vote. A single denial revokes the
    /// session immediately; reaching the procedure's required count
    /// activates it and starts the time limit.
    pub async fn approve(
        &self,
        session_id: &str,
        approver: &str,
        approved: bool,
        reason: Option<&str>,
    ) -> Result<SessionStatus> {
        let procedure_id = {
            let sessions = self.sessions.read().await;
            let session = sessions
                .get(session_id)
                .ok_or_else(|| Error::not_found("break-glass session", session_id))?;
            session.procedure_id.clone()
        };
        let procedure = self
            .procedures
            .read()
            .await
            .get(&procedure_id)
            .cloned()
            .ok_or_else(|| Error::not_found("break-glass procedure", &procedure_id))?;

        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::not_found("break-glass session", session_id))?;

        if session.status != SessionStatus::Pending {
            return Err(Error::validation(format!(
                "Votes are only accepted while pending (session is {})",
                session.status
            )));
        }
        if session.has_voted(approver) {
            return Err(Error::validation(format!("'{}' has already voted", approver)));
        }

        session.approvals.push(ApprovalVote {
            approver: approver.to_string(),
            approved,
            reason: reason.map(str::to_string),
            timestamp: Utc::now(),
        });
        session.audit(format!(
            "{} by {}{}",
            if approved { "approved" } else { "denied" },
            approver,
            reason.map(|r| format!(": {}", r)).unwrap_or_default()
        ));

        let (status, archived) = if !approved {
            session.status = SessionStatus::Revoked;
            session.ended_at = Some(Utc::now());
            session.audit("revoked: denied");
            (SessionStatus::Revoked, Some(session.clone()))
        } else if session.approval_count() >= procedure.required_approvals {
            let now = Utc::now();
            let deadline = now + time_limit_delta(&procedure);
            session.status = SessionStatus::Active;
            session.activated_at = Some(now);
            session.expires_at = Some(deadline);
            session.audit(format!(
                "activated with {} approvals, expires at {}",
                session.approval_count(),
                deadline
            ));
            (SessionStatus::Active, None)
        } else {
            (SessionStatus::Pending, None)
        };
        let initiator = session.initiator.clone();
        drop(sessions);

        let kind = if approved {
            TrustEventKind::BreakGlassApproved
        } else {
            TrustEventKind::BreakGlassDenied
        };
        self.notify(
            TrustEvent::success(kind, session_id, approver, COMPONENT)
                .with_metadata(serde_json::json!({ "resulting_status": status })),
        );
        if status == SessionStatus::Active {
            self.notify(TrustEvent::success(
                TrustEventKind::BreakGlassActivated,
                session_id,
                initiator,
                COMPONENT,
            ));
        }
        if let Some(session) = archived {
            self.archive(session).await;
        }

        Ok(status)
    }

    /// Execute an allow-listed action under an active session. The outcome
    /// lands in the session's action log and the audit stream regardless of
    /// success; a failed action does not terminate the session.
    pub async fn execute_action(
        &self,
        session_id: &str,
        kind: EmergencyActionKind,
        resource: &str,
        params: Option<serde_json::Value>,
    ) -> Result<ActionResult> {
        let now = Utc::now();
        let (gate, initiator, procedure_id) = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(session_id)
                .ok_or_else(|| Error::not_found("break-glass session", session_id))?;

            // The deadline is enforced inline as well as by the monitor.
            let mut inline_expired = None;
            if session.is_overdue(now) {
                session.status = SessionStatus::Expired;
                session.ended_at = Some(now);
                session.audit("expired: time limit reached");
                inline_expired = Some(session.clone());
            }
            let gate = if session.is_active(now) {
                Ok(())
            } else {
                Err((
                    Error::unauthorized(format!(
                        "Session is {}: actions require an active session",
                        session.status
                    )),
                    inline_expired,
                ))
            };
            (gate, session.initiator.clone(), session.procedure_id.clone())
        };

        if let Err((denied, inline_expired)) = gate {
            if let Some(expired) = inline_expired {
                tracing::warn!(session_id = %expired.id, "Break-glass session expired");
                self.notify(TrustEvent::success(
                    TrustEventKind::BreakGlassExpired,
                    expired.id.clone(),
                    expired.initiator.clone(),
                    COMPONENT,
                ));
                self.archive(expired).await;
            }
            return Err(denied);
        }

        let procedure = self
            .procedures
            .read()
            .await
            .get(&procedure_id)
            .cloned()
            .ok_or_else(|| Error::not_found("break-glass procedure", &procedure_id))?;

        if !procedure.permits(kind, resource) {
            let denial = Error::unauthorized(format!(
                "Action {} on '{}' is not in the procedure's allow-list",
                kind, resource
            ));
            self.record_action(session_id, kind, resource, &initiator, Err(&denial)).await;
            return Err(denial);
        }

        let result = self.run_action(kind, resource, params, &initiator).await;
        self.record_action(session_id, kind, resource, &initiator, result.as_ref()).await;
        result
    }

    async fn run_action(
        &self,
        kind: EmergencyActionKind,
        resource: &str,
        params: Option<serde_json::Value>,
        actor: &str,
    ) -> Result<ActionResult> {
        match kind {
            EmergencyActionKind::RevealSecret => {
                let record = self
                    .store
                    .get(resource)
                    .await?
                    .ok_or_else(|| Error::not_found("secret", resource))?;
                tracing::warn!(actor = %actor, path = %resource, "Secret revealed under break-glass");
                Ok(ActionResult { value: record.value })
            }
            EmergencyActionKind::EmergencyDecrypt => {
                let engine = self.engine.as_ref().ok_or_else(|| {
                    Error::validation("Emergency decryption requires an encryption engine")
                })?;
                let envelope_value = params
                    .as_ref()
                    .and_then(|p| p.get("envelope"))
                    .cloned()
                    .ok_or_else(|| Error::validation("Missing 'envelope' parameter"))?;
                let envelope: EncryptedEnvelope = serde_json::from_value(envelope_value)?;
                let context = params
                    .as_ref()
                    .and_then(|p| p.get("context"))
                    .and_then(|c| c.as_str())
                    .map(|c| c.as_bytes().to_vec());
                let plaintext = engine.decrypt(&envelope, context.as_deref()).await?;
                tracing::warn!(actor = %actor, key_id = %envelope.key_id, "Emergency decryption performed");
                Ok(ActionResult {
                    value: serde_json::json!({
                        "plaintext_base64":
                            base64::Engine::encode(
                                &base64::engine::general_purpose::STANDARD,
                                plaintext,
                            ),
                    }),
                })
            }
            EmergencyActionKind::SuspendRotation => {
                let scheduler = self.scheduler.as_ref().ok_or_else(|| {
                    Error::validation("Rotation suspension requires a scheduler")
                })?;
                scheduler.suspend(resource).await;
                Ok(ActionResult {
                    value: serde_json::json!({ "suspended": resource }),
                })
            }
            // Grants, bypasses, and expiry overrides are decisions consumed
            // by external enforcement points; the controller records and
            // broadcasts them.
            EmergencyActionKind::GrantTemporaryAccess
            | EmergencyActionKind::BypassPolicy
            | EmergencyActionKind::OverrideExpiration => Ok(ActionResult {
                value: serde_json::json!({
                    "acknowledged": kind.as_str(),
                    "resource": resource,
                    "params": params,
                }),
            }),
        }
    }

    async fn record_action(
        &self,
        session_id: &str,
        kind: EmergencyActionKind,
        resource: &str,
        actor: &str,
        outcome: std::result::Result<&ActionResult, &Error>,
    ) {
        let (success, detail) = match outcome {
            Ok(_) => (true, None),
            Err(e) => (false, Some(e.to_string())),
        };

        {
            let mut sessions = self.sessions.write().await;
            if let Some(session) = sessions.get_mut(session_id) {
                session.action_log.push(ActionLogEntry {
                    kind,
                    resource: resource.to_string(),
                    actor: actor.to_string(),
                    success,
                    detail: detail.clone(),
                    timestamp: Utc::now(),
                });
                session.audit(format!(
                    "action {} on {} by {}: {}",
                    kind,
                    resource,
                    actor,
                    if success { "ok" } else { "failed" }
                ));
            }
        }

        let event = if success {
            TrustEvent::success(
                TrustEventKind::BreakGlassActionExecuted,
                session_id,
                actor,
                COMPONENT,
            )
        } else {
            TrustEvent::failure(
                TrustEventKind::BreakGlassActionExecuted,
                session_id,
                actor,
                COMPONENT,
                detail.unwrap_or_default(),
            )
        };
        self.notify(event.with_metadata(serde_json::json!({
            "action": kind,
            "resource": resource,
        })));
    }

    /// Revoke a session at any point up to and including `Active`.
    /// Subsequent `execute_action` calls fail immediately.
    pub async fn revoke(&self, session_id: &str, revoker: &str, reason: Option<&str>) -> Result<()> {
        let archived = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(session_id)
                .ok_or_else(|| Error::not_found("break-glass session", session_id))?;

            if session.status.is_terminal() {
                return Err(Error::validation(format!(
                    "Session is already {}",
                    session.status
                )));
            }
            session.status = SessionStatus::Revoked;
            session.ended_at = Some(Utc::now());
            session.audit(format!(
                "revoked by {}{}",
                revoker,
                reason.map(|r| format!(": {}", r)).unwrap_or_default()
            ));
            session.clone()
        };

        tracing::warn!(session_id = %session_id, revoker = %revoker, "Break-glass session revoked");
        self.notify(
            TrustEvent::success(
                TrustEventKind::BreakGlassRevoked,
                session_id,
                revoker,
                COMPONENT,
            )
            .with_metadata(serde_json::json!({ "reason": reason })),
        );
        self.archive(archived).await;
        Ok(())
    }

    /// Sessions currently pending or active.
    pub async fn active_sessions(&self) -> Vec<BreakGlassSession> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|session| !session.status.is_terminal())
            .cloned()
            .collect()
    }

    /// Snapshot of a session by id.
    pub async fn session(&self, session_id: &str) -> Result<BreakGlassSession> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::not_found("break-glass session", session_id))
    }

    /// Terminal sessions, most recent last.
    pub async fn session_history(&self, limit: Option<usize>) -> Vec<BreakGlassSession> {
        let history = self.history.read().await;
        let take = limit.unwrap_or(history.len()).min(history.len());
        history.iter().skip(history.len() - take).cloned().collect()
    }

    /// Stop the monitor task.
    pub async fn close(&self) {
        if let Some(handle) = self.monitor.lock().await.take() {
            handle.abort();
        }
        tracing::info!("Closed break-glass controller");
    }
}
