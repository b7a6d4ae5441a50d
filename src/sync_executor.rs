//! Sync Executor
//!
//! Worker pool that claims queued sync jobs, runs every registered connector
//! for the job's user, stores the new activity and then runs the suggestion
//! engine. Connector failures are recorded on the job and never abort the run.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use metrics::{counter, gauge, histogram};
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::connectors::{ConnectorError, Registry};
use crate::models::SyncJobStatus;
use crate::models::sync_job::Model as SyncJobModel;
use crate::repositories::{ActivityRepository, JobCompletion, ProviderFailure, SyncJobRepository};
use crate::suggestions::SuggestionEngine;
use crate::telemetry::metric_names::{
    ACTIVITIES_INGESTED, SYNC_JOB_DURATION, SYNC_JOBS_COMPLETED, SYNC_JOBS_IN_FLIGHT,
    SYNC_PROVIDER_FAILURES,
};

/// Configuration for the sync executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Seconds between queue polls
    pub poll_seconds: u64,
    /// Maximum number of concurrent jobs
    pub concurrency: usize,
    /// Wall-clock budget per job
    pub job_timeout_seconds: u64,
    /// How far back connectors look for activity
    pub lookback_days: i64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_seconds: 5,
            concurrency: 4,
            job_timeout_seconds: 600,
            lookback_days: 7,
        }
    }
}

impl From<&SchedulerConfig> for ExecutorConfig {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            poll_seconds: config.worker_poll_seconds,
            concurrency: config.worker_concurrency,
            job_timeout_seconds: config.job_timeout_seconds,
            lookback_days: config.lookback_days,
        }
    }
}

#[derive(Clone)]
pub struct SyncExecutor {
    registry: Arc<Registry>,
    activities: ActivityRepository,
    engine: SuggestionEngine,
    jobs: SyncJobRepository,
    config: ExecutorConfig,
}

impl SyncExecutor {
    pub fn new(
        registry: Arc<Registry>,
        activities: ActivityRepository,
        engine: SuggestionEngine,
        jobs: SyncJobRepository,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            registry,
            activities,
            engine,
            jobs,
            config,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Poll the queue until shutdown, running up to `concurrency` jobs at once.
    ///
    /// Jobs left `running` by a previous process are abandoned on startup.
    /// In-flight jobs are awaited before returning.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) {
        info!(config = ?self.config, "Starting sync executor");

        let stale_cutoff =
            Utc::now() - chrono::Duration::seconds(self.config.job_timeout_seconds as i64);
        match self.jobs.abandon_stale(stale_cutoff).await {
            Ok(0) => {}
            Ok(swept) => warn!(swept, "Abandoned sync jobs left running by a previous process"),
            Err(err) => error!(error = ?err, "Failed to sweep stale sync jobs"),
        }

        let concurrency = self.config.concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let poll = Duration::from_secs(self.config.poll_seconds.max(1));

        loop {
            self.claim_available(&semaphore).await;

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Sync executor shutdown requested");
                    break;
                }
                _ = sleep(poll) => {}
            }
        }

        let _ = semaphore.acquire_many(concurrency as u32).await;
        info!("Sync executor stopped");
    }

    /// Claims jobs while permits remain, spawning each onto its own task
    async fn claim_available(&self, semaphore: &Arc<Semaphore>) {
        while let Ok(permit) = semaphore.clone().try_acquire_owned() {
            match self.jobs.claim_next(Utc::now()).await {
                Ok(Some(job)) => {
                    let executor = self.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        if let Err(err) = executor.run_job(job).await {
                            error!(error = ?err, "Sync job bookkeeping failed");
                        }
                    });
                }
                Ok(None) => break,
                Err(err) => {
                    error!(error = ?err, "Failed to claim sync job");
                    break;
                }
            }
        }
    }

    /// Enqueues and runs a manual job for `user_id` on the current task
    pub async fn run_inline(&self, user_id: Uuid) -> Result<SyncJobModel> {
        let queued = self
            .jobs
            .enqueue(user_id, crate::models::SyncTrigger::Manual, Utc::now())
            .await?;
        let job = self
            .jobs
            .start(queued.id, Utc::now())
            .await?
            .with_context(|| format!("sync job {} was claimed by another worker", queued.id))?;
        self.run_job(job).await
    }

    /// Runs a claimed job within its wall-clock budget and records the outcome
    #[instrument(skip(self, job), fields(job_id = %job.id, user_id = %job.user_id))]
    pub async fn run_job(&self, job: SyncJobModel) -> Result<SyncJobModel> {
        let started = std::time::Instant::now();
        let budget = Duration::from_secs(self.config.job_timeout_seconds);
        gauge!(SYNC_JOBS_IN_FLIGHT).increment(1.0);

        let outcome = timeout(budget, self.execute(job.user_id)).await;
        gauge!(SYNC_JOBS_IN_FLIGHT).decrement(1.0);
        histogram!(SYNC_JOB_DURATION).record(started.elapsed().as_secs_f64());

        let status = match outcome {
            Ok(Ok(completion)) => {
                self.jobs.finish(job.id, &completion).await?;
                info!(
                    status = completion.status.as_str(),
                    failed_providers = ?completion.failed_providers,
                    activities = completion.activities_ingested,
                    suggestions = completion.suggestions_created,
                    "Sync job finished"
                );
                completion.status
            }
            Ok(Err(err)) => {
                error!(error = ?err, "Sync job failed");
                self.jobs.mark_abandoned(job.id, &format!("{err:#}")).await?;
                SyncJobStatus::Abandoned
            }
            Err(_) => {
                warn!(budget_seconds = budget.as_secs(), "Sync job exceeded its time budget");
                self.jobs
                    .mark_abandoned(
                        job.id,
                        &format!("exceeded wall-clock budget of {}s", budget.as_secs()),
                    )
                    .await?;
                SyncJobStatus::Abandoned
            }
        };

        counter!(SYNC_JOBS_COMPLETED, "status" => status.as_str()).increment(1);

        self.jobs
            .find(job.id)
            .await?
            .with_context(|| format!("sync job {} disappeared", job.id))
    }

    /// One sync pass for a user: every connector, then the suggestion engine.
    ///
    /// `NotConnected` providers are skipped without counting as failures and
    /// listed separately on the job.
    pub async fn execute(&self, user_id: Uuid) -> Result<JobCompletion> {
        let since = Utc::now() - chrono::Duration::days(self.config.lookback_days);
        let mut failed_providers = Vec::new();
        let mut skipped_providers = Vec::new();
        let mut errors = BTreeMap::new();
        let mut activities_ingested = 0;

        for connector in self.registry.connectors() {
            let provider = connector.provider();
            let span = info_span!("connector_fetch", provider = provider.slug());

            let fetched = connector
                .fetch_recent(user_id, since)
                .instrument(span.clone())
                .await;

            let failure = match fetched {
                Ok(events) => match self.activities.upsert_all(&events).await {
                    Ok(written) => {
                        activities_ingested += written;
                        counter!(ACTIVITIES_INGESTED, "provider" => provider.slug())
                            .increment(written);
                        span.in_scope(|| {
                            debug!(fetched = events.len(), written, "Stored provider activity")
                        });
                        None
                    }
                    Err(err) => Some(ProviderFailure {
                        kind: "database".to_string(),
                        message: err.to_string(),
                    }),
                },
                Err(ConnectorError::NotConnected { .. }) => {
                    span.in_scope(|| debug!("Provider not connected; skipping"));
                    skipped_providers.push(provider);
                    None
                }
                Err(err) => Some(ProviderFailure {
                    kind: err.kind().to_string(),
                    message: err.to_string(),
                }),
            };

            if let Some(failure) = failure {
                counter!(
                    SYNC_PROVIDER_FAILURES,
                    "provider" => provider.slug(),
                    "kind" => failure.kind.clone()
                )
                .increment(1);
                span.in_scope(|| {
                    warn!(kind = %failure.kind, error = %failure.message, "Connector failed")
                });
                failed_providers.push(provider);
                errors.insert(provider, failure);
            }
        }

        let report = self.engine.process_user(user_id).await?;

        let status = if failed_providers.is_empty() {
            SyncJobStatus::Succeeded
        } else {
            SyncJobStatus::PartiallyFailed
        };

        Ok(JobCompletion {
            status,
            failed_providers,
            errors,
            skipped_providers,
            activities_ingested,
            suggestions_created: report.created,
        })
    }
}
