//! Rotation scheduling and job-state bookkeeping.

use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::RotationConfig;
use crate::errors::{Error, Result};
use crate::events::{EventBus, TrustEvent, TrustEventKind};
use crate::rotation::executor::RotationExecutor;
use crate::rotation::job::{JobStatus, RotationJob, RotationPolicy, RotationStrategy, SecretType};
use crate::secrets::record::validate_secret_path;

const COMPONENT: &str = "rotation.scheduler";
const SCHEDULER_ACTOR: &str = "rotation-scheduler";

struct SchedulerInner {
    executor: RotationExecutor,
    config: RotationConfig,
    events: EventBus,
    /// Every job this scheduler knows about (registrations and runs).
    jobs: RwLock<HashMap<String, RotationJob>>,
    /// Last-N runs per path.
    history: RwLock<HashMap<String, VecDeque<RotationJob>>>,
    /// Paths with a rotation currently in flight.
    in_flight: Mutex<HashSet<String>>,
    /// Paths whose rotation is suspended (break-glass override).
    suspended: RwLock<HashSet<String>>,
    /// Recurring timers by registration job id.
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

/// Schedules recurring rotations, runs on-demand ones, and tracks job state
/// and history.
///
/// State machine per job: `Scheduled → Running → {Completed | Failed}`,
/// `Scheduled → Cancelled`. At most one job is `Running` per path at any
/// time; different paths rotate independently.
#[derive(Clone)]
pub struct RotationScheduler {
    inner: Arc<SchedulerInner>,
}

impl RotationScheduler {
    pub fn new(executor: RotationExecutor, config: RotationConfig, events: EventBus) -> Self {
        let scheduler = Self {
            inner: Arc::new(SchedulerInner {
                executor,
                config,
                events,
                jobs: RwLock::new(HashMap::new()),
                history: RwLock::new(HashMap::new()),
                in_flight: Mutex::new(HashSet::new()),
                suspended: RwLock::new(HashSet::new()),
                timers: Mutex::new(HashMap::new()),
                sweeper: Mutex::new(None),
            }),
        };
        scheduler.spawn_stuck_sweep();
        scheduler
    }

    fn spawn_stuck_sweep(&self) {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.config.sweep_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let threshold =
                    chrono::Duration::from_std(inner.config.stuck_job_threshold())
                        .unwrap_or_else(|_| chrono::Duration::hours(1));
                let now = Utc::now();

                let mut jobs = inner.jobs.write().await;
                for job in jobs.values_mut() {
                    if job.status == JobStatus::Running && !job.stuck {
                        if let Some(started_at) = job.started_at {
                            if now - started_at > threshold {
                                job.stuck = true;
                                tracing::warn!(
                                    job_id = %job.id,
                                    path = %job.path,
                                    started_at = %started_at,
                                    "Rotation job running beyond stuck threshold, flagging for operator attention"
                                );
                                inner.events.publish(
                                    TrustEvent::success(
                                        TrustEventKind::RotationStuck,
                                        job.path.clone(),
                                        SCHEDULER_ACTOR,
                                        COMPONENT,
                                    )
                                    .with_metadata(serde_json::json!({
                                        "job_id": job.id,
                                        "started_at": started_at,
                                    })),
                                );
                            }
                        }
                    }
                }
            }
        });
        // Only reachable from `new`, before the lock is shared.
        if let Ok(mut sweeper) = self.inner.sweeper.try_lock() {
            *sweeper = Some(handle);
        }
    }

    /// Register a recurring rotation. Returns the registration job id,
    /// usable with [`RotationScheduler::cancel`] while it is `Scheduled`.
    pub async fn schedule(
        &self,
        path: &str,
        secret_type: SecretType,
        policy: RotationPolicy,
    ) -> Result<String> {
        validate_secret_path(path)?;

        let registration = RotationJob::new(path, secret_type, policy.clone());
        let job_id = registration.id.clone();

        self.inner.jobs.write().await.insert(job_id.clone(), registration);

        let inner = Arc::clone(&self.inner);
        let timer_path = path.to_string();
        let timer_id = job_id.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(policy.interval.duration());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // interval() fires immediately; the first rotation belongs a
            // full interval out.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let scheduler = RotationScheduler { inner: Arc::clone(&inner) };
                match scheduler
                    .run_once(&timer_path, secret_type, policy.strategy, policy.clone())
                    .await
                {
                    Ok(job) => {
                        tracing::debug!(
                            registration = %timer_id,
                            run = %job.id,
                            status = %job.status,
                            "Scheduled rotation fired"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            registration = %timer_id,
                            path = %timer_path,
                            error = %e,
                            "Scheduled rotation skipped"
                        );
                    }
                }
            }
        });
        self.inner.timers.lock().await.insert(job_id.clone(), handle);

        self.inner.events.publish(
            TrustEvent::success(
                TrustEventKind::RotationScheduled,
                path,
                SCHEDULER_ACTOR,
                COMPONENT,
            )
            .with_metadata(serde_json::json!({ "job_id": job_id, "type": secret_type })),
        );
        tracing::info!(job_id = %job_id, path = %path, secret_type = %secret_type, "Scheduled rotation");
        Ok(job_id)
    }

    /// Rotate immediately, bypassing the timer. Returns the finished run.
    pub async fn rotate_now(
        &self,
        path: &str,
        secret_type: SecretType,
        strategy: Option<RotationStrategy>,
    ) -> Result<RotationJob> {
        validate_secret_path(path)?;
        let policy = RotationPolicy::new(crate::rotation::job::RotationInterval::Daily)
            .with_strategy(strategy.unwrap_or_default());
        let job = self.run_once(path, secret_type, policy.strategy, policy).await?;
        match job.status {
            JobStatus::Completed => Ok(job),
            _ => Err(Error::rotation(
                path,
                job.error.clone().unwrap_or_else(|| "Rotation did not complete".to_string()),
            )),
        }
    }

    /// Run a single rotation with per-path mutual exclusion. The returned
    /// job is terminal (`Completed` or `Failed`).
    async fn run_once(
        &self,
        path: &str,
        secret_type: SecretType,
        strategy: RotationStrategy,
        policy: RotationPolicy,
    ) -> Result<RotationJob> {
        if self.inner.suspended.read().await.contains(path) {
            return Err(Error::rotation(path, "Rotation is suspended for this path"));
        }

        // At-most-one-in-flight per path.
        {
            let mut in_flight = self.inner.in_flight.lock().await;
            if !in_flight.insert(path.to_string()) {
                return Err(Error::rotation(path, "A rotation is already running for this path"));
            }
        }

        let mut job = RotationJob::new(path, secret_type, policy.with_strategy(strategy));
        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        self.inner.jobs.write().await.insert(job.id.clone(), job.clone());

        self.inner.events.publish(
            TrustEvent::success(TrustEventKind::RotationStarted, path, SCHEDULER_ACTOR, COMPONENT)
                .with_metadata(serde_json::json!({ "job_id": job.id, "strategy": strategy })),
        );

        // Once running, the job completes or fails; there is no mid-flight
        // abort.
        let result = self.inner.executor.execute(&job).await;

        job.completed_at = Some(Utc::now());
        match result {
            Ok(outcome) => {
                job.status = JobStatus::Completed;
                job.old_version = outcome.old_version;
                job.new_version = Some(outcome.new_version);
                tracing::info!(
                    job_id = %job.id,
                    path = %path,
                    old_version = ?outcome.old_version,
                    new_version = outcome.new_version,
                    "Rotation completed"
                );
                self.inner.events.publish(
                    TrustEvent::success(
                        TrustEventKind::RotationCompleted,
                        path,
                        SCHEDULER_ACTOR,
                        COMPONENT,
                    )
                    .with_metadata(serde_json::json!({
                        "job_id": job.id,
                        "new_version": outcome.new_version,
                    })),
                );
            }
            Err(e) => {
                job.status = JobStatus::Failed;
                job.error = Some(e.to_string());
                tracing::error!(job_id = %job.id, path = %path, error = %e, "Rotation failed, old material remains authoritative");
                self.inner.events.publish(TrustEvent::failure(
                    TrustEventKind::RotationFailed,
                    path,
                    SCHEDULER_ACTOR,
                    COMPONENT,
                    e.to_string(),
                ));
            }
        }

        self.inner.jobs.write().await.insert(job.id.clone(), job.clone());
        {
            let mut history = self.inner.history.write().await;
            let entry = history.entry(path.to_string()).or_default();
            entry.push_back(job.clone());
            while entry.len() > self.inner.config.history_limit {
                entry.pop_front();
            }
        }

        self.inner.in_flight.lock().await.remove(path);
        Ok(job)
    }

    /// Cancel a registration. Only `Scheduled` jobs can be cancelled; a
    /// `Running` job runs to completion or failure.
    pub async fn cancel(&self, job_id: &str) -> Result<()> {
        let mut jobs = self.inner.jobs.write().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| Error::not_found("rotation job", job_id))?;

        if job.status != JobStatus::Scheduled {
            return Err(Error::validation(format!(
                "Only scheduled jobs can be cancelled (job is {})",
                job.status
            )));
        }
        job.status = JobStatus::Cancelled;
        job.completed_at = Some(Utc::now());
        let path = job.path.clone();
        drop(jobs);

        if let Some(handle) = self.inner.timers.lock().await.remove(job_id) {
            handle.abort();
        }

        self.inner.events.publish(
            TrustEvent::success(
                TrustEventKind::RotationCancelled,
                path.clone(),
                SCHEDULER_ACTOR,
                COMPONENT,
            )
            .with_metadata(serde_json::json!({ "job_id": job_id })),
        );
        tracing::info!(job_id = %job_id, path = %path, "Cancelled scheduled rotation");
        Ok(())
    }

    /// Current state of a job (registration or run).
    pub async fn status(&self, job_id: &str) -> Result<RotationJob> {
        self.inner
            .jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| Error::not_found("rotation job", job_id))
    }

    /// Last runs for a path, oldest first.
    pub async fn history(&self, path: &str) -> Vec<RotationJob> {
        self.inner
            .history
            .read()
            .await
            .get(path)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Suspend rotations for a path (break-glass override). Scheduled
    /// firings and `rotate_now` both refuse while suspended.
    pub async fn suspend(&self, path: &str) {
        self.inner.suspended.write().await.insert(path.to_string());
        tracing::warn!(path = %path, "Rotation suspended");
    }

    /// Lift a suspension.
    pub async fn resume(&self, path: &str) {
        self.inner.suspended.write().await.remove(path);
        tracing::info!(path = %path, "Rotation resumed");
    }

    /// Abort timers and sweeps. In-memory job state is discarded with the
    /// scheduler; it is non-durable by design.
    pub async fn close(&self) {
        for (_, handle) in self.inner.timers.lock().await.drain() {
            handle.abort();
        }
        if let Some(handle) = self.inner.sweeper.lock().await.take() {
            handle.abort();
        }
        tracing::info!("Closed rotation scheduler");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::rotation::job::RotationInterval;
    use crate::secrets::memory::MemorySecretStore;
    use crate::secrets::store::SecretStore;
    use std::time::Duration;

    fn fast_config() -> RotationConfig {
        RotationConfig {
            stuck_job_threshold_secs: 3600,
            sweep_interval_secs: 1,
            history_limit: 3,
            default_grace_secs: 1,
        }
    }

    async fn setup() -> (Arc<MemorySecretStore>, RotationScheduler, EventBus) {
        let events = EventBus::new();
        let store = Arc::new(MemorySecretStore::new(events.clone()));
        let executor =
            RotationExecutor::new(store.clone() as Arc<dyn SecretStore>, Duration::from_millis(20));
        let scheduler = RotationScheduler::new(executor, fast_config(), events.clone());
        (store, scheduler, events)
    }

    #[tokio::test]
    async fn rotate_now_completes_and_records_history() {
        let (store, scheduler, _) = setup().await;
        store.put("app/api-key", serde_json::json!({"value": "old"}), None).await.unwrap();

        let job = scheduler
            .rotate_now("app/api-key", SecretType::ApiKey, Some(RotationStrategy::Immediate))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.old_version, Some(1));
        assert_eq!(job.new_version, Some(2));

        let history = scheduler.history("app/api-key").await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, job.id);

        let status = scheduler.status(&job.id).await.unwrap();
        assert_eq!(status.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn failed_rotation_is_recorded_and_old_material_stays() {
        let (store, scheduler, events) = setup().await;
        store.put("app/api-key", serde_json::json!({"value": "old"}), None).await.unwrap();
        let mut rx = events.subscribe();

        store.set_fail_writes(true);
        let err = scheduler
            .rotate_now("app/api-key", SecretType::ApiKey, Some(RotationStrategy::Immediate))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Rotation { .. }));
        store.set_fail_writes(false);

        let history = scheduler.history("app/api-key").await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, JobStatus::Failed);
        assert!(history[0].error.is_some());

        let current = store.get("app/api-key").await.unwrap().unwrap();
        assert_eq!(current.value["value"], "old");

        // RotationFailed reached the event stream.
        let failed = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                let event = rx.recv().await.unwrap();
                if event.kind == TrustEventKind::RotationFailed {
                    return event;
                }
            }
        })
        .await
        .unwrap();
        assert!(!failed.success);
    }

    #[tokio::test]
    async fn cancel_only_while_scheduled() {
        let (_, scheduler, _) = setup().await;
        let policy = RotationPolicy::new(RotationInterval::Daily);
        let job_id =
            scheduler.schedule("app/api-key", SecretType::ApiKey, policy).await.unwrap();

        scheduler.cancel(&job_id).await.unwrap();
        let job = scheduler.status(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);

        // A second cancel is rejected: the job is no longer scheduled.
        assert!(scheduler.cancel(&job_id).await.is_err());
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let (store, scheduler, _) = setup().await;
        store.put("app/api-key", serde_json::json!({"value": "v"}), None).await.unwrap();

        for _ in 0..5 {
            scheduler
                .rotate_now("app/api-key", SecretType::ApiKey, Some(RotationStrategy::Immediate))
                .await
                .unwrap();
        }
        // fast_config caps history at 3.
        assert_eq!(scheduler.history("app/api-key").await.len(), 3);
    }

    #[tokio::test]
    async fn suspended_path_refuses_rotation() {
        let (store, scheduler, _) = setup().await;
        store.put("app/api-key", serde_json::json!({"value": "v"}), None).await.unwrap();

        scheduler.suspend("app/api-key").await;
        let err = scheduler
            .rotate_now("app/api-key", SecretType::ApiKey, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("suspended"));

        scheduler.resume("app/api-key").await;
        assert!(scheduler
            .rotate_now("app/api-key", SecretType::ApiKey, None)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn unknown_job_status_is_not_found() {
        let (_, scheduler, _) = setup().await;
        assert!(matches!(
            scheduler.status("missing").await.unwrap_err(),
            Error::NotFound { .. }
        ));
    }
}
