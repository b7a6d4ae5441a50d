//! # Sync Scheduler
//!
//! Periodic fan-out of one sync job per active user, plus the manual trigger.
//! Time and the job queue are injected so ticks can be driven from tests
//! without waiting on the wall clock.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use tokio::time::{Duration as TokioDuration, Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::models::SyncTrigger;
use crate::models::sync_job::Model as SyncJobModel;
use crate::repositories::{SyncJobRepository, UserRepository};
use crate::telemetry::metric_names::{SYNC_ENQUEUE_FAILURES, SYNC_JOBS_ENQUEUED};

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Destination for sync jobs
#[async_trait]
pub trait JobEnqueuer: Send + Sync {
    async fn enqueue(
        &self,
        user_id: Uuid,
        trigger: SyncTrigger,
        scheduled_at: DateTime<Utc>,
    ) -> Result<SyncJobModel>;
}

#[async_trait]
impl JobEnqueuer for SyncJobRepository {
    async fn enqueue(
        &self,
        user_id: Uuid,
        trigger: SyncTrigger,
        scheduled_at: DateTime<Utc>,
    ) -> Result<SyncJobModel> {
        Ok(SyncJobRepository::enqueue(self, user_id, trigger, scheduled_at).await?)
    }
}

/// Users the periodic trigger fans out over
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn active_user_ids(&self) -> Result<Vec<Uuid>>;
}

#[async_trait]
impl UserDirectory for UserRepository {
    async fn active_user_ids(&self) -> Result<Vec<Uuid>> {
        Ok(self.list_active_ids().await?)
    }
}

/// Outcome of one periodic tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub enqueued: Vec<Uuid>,
    pub failed: Vec<Uuid>,
}

#[derive(Clone)]
pub struct SyncScheduler {
    clock: Arc<dyn Clock>,
    enqueuer: Arc<dyn JobEnqueuer>,
    users: Arc<dyn UserDirectory>,
    interval: TokioDuration,
}

impl SyncScheduler {
    pub fn new(
        clock: Arc<dyn Clock>,
        enqueuer: Arc<dyn JobEnqueuer>,
        users: Arc<dyn UserDirectory>,
        interval_seconds: u64,
    ) -> Self {
        Self {
            clock,
            enqueuer,
            users,
            interval: TokioDuration::from_secs(interval_seconds.max(1)),
        }
    }

    /// Run the periodic loop until the shutdown token fires.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_seconds = self.interval.as_secs(), "Starting sync scheduler");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Sync scheduler shutdown requested");
                    break;
                }
                _ = sleep(self.interval) => {
                    let tick_started = Instant::now();
                    if let Err(err) = self.tick().await {
                        error!(error = ?err, "Scheduler tick failed");
                    }
                    histogram!("sync_scheduler_tick_duration_ms")
                        .record(tick_started.elapsed().as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Sync scheduler stopped");
    }

    /// Enqueues one periodic job per active user.
    ///
    /// An enqueue failure is logged against that user and the fan-out carries
    /// on. Only failing to list users fails the tick.
    pub async fn tick(&self) -> Result<TickReport> {
        let now = self.clock.now();
        let user_ids = self.users.active_user_ids().await?;
        let mut report = TickReport::default();

        for user_id in user_ids {
            match self
                .enqueuer
                .enqueue(user_id, SyncTrigger::Periodic, now)
                .await
            {
                Ok(_) => {
                    counter!(SYNC_JOBS_ENQUEUED, "trigger" => "periodic").increment(1);
                    report.enqueued.push(user_id);
                }
                Err(err) => {
                    counter!(SYNC_ENQUEUE_FAILURES).increment(1);
                    warn!(user_id = %user_id, error = ?err, "Failed to enqueue periodic sync");
                    report.failed.push(user_id);
                }
            }
        }

        debug!(
            enqueued = report.enqueued.len(),
            failed = report.failed.len(),
            "Scheduler tick completed"
        );

        Ok(report)
    }

    /// Enqueues a job for one user and returns it without waiting for the run
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn trigger_manual(&self, user_id: Uuid) -> Result<SyncJobModel> {
        let job = self
            .enqueuer
            .enqueue(user_id, SyncTrigger::Manual, self.clock.now())
            .await?;
        counter!(SYNC_JOBS_ENQUEUED, "trigger" => "manual").increment(1);
        Ok(job)
    }
}
