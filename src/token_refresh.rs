//! # Token Refresh Service
//!
//! Background task that periodically refreshes stored credentials nearing
//! expiry, so a sync run rarely has to refresh on demand.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, histogram};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{Duration as TokioDuration, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::TokenRefreshConfig;
use crate::telemetry::metric_names::TOKEN_REFRESH;
use crate::vault::{TokenVault, VaultError};

/// Counts from one refresh sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// Background token refresh service
#[derive(Clone)]
pub struct TokenRefreshService {
    vault: Arc<TokenVault>,
    config: TokenRefreshConfig,
}

impl TokenRefreshService {
    pub fn new(vault: Arc<TokenVault>, config: TokenRefreshConfig) -> Self {
        Self { vault, config }
    }

    /// Run the token refresh loop until the provided shutdown token fires
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) {
        info!("Starting token refresh service");
        let tick_interval = TokioDuration::from_secs(self.config.tick_seconds.max(1));

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Token refresh service shutdown requested");
                    break;
                }
                _ = sleep(tick_interval) => {
                    let tick_started = std::time::Instant::now();
                    if let Err(err) = self.tick(Utc::now()).await {
                        error!(error = ?err, "Token refresh tick failed");
                    }
                    histogram!("token_refresh_tick_duration_ms")
                        .record(tick_started.elapsed().as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Token refresh service stopped");
    }

    /// Refreshes every credential expiring within the lead time.
    ///
    /// A failed refresh is logged and counted; the credential stays as it was
    /// and is retried on the next tick.
    #[instrument(skip_all)]
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<RefreshStats, VaultError> {
        let deadline = now + Duration::seconds(self.config.lead_time_seconds as i64);
        let due = self.vault.expiring_before(deadline).await?;

        if due.is_empty() {
            debug!("No credentials due for refresh");
            return Ok(RefreshStats::default());
        }

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for (user_id, provider) in due {
            let semaphore = semaphore.clone();
            let vault = self.vault.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = vault.refresh(user_id, provider).await;
                (user_id, provider, result)
            });
        }

        let mut stats = RefreshStats::default();
        while let Some(joined) = tasks.join_next().await {
            stats.attempted += 1;
            match joined {
                Ok((_, _, Ok(()))) => {
                    stats.succeeded += 1;
                    counter!(TOKEN_REFRESH, "result" => "success").increment(1);
                }
                Ok((user_id, provider, Err(err))) => {
                    stats.failed += 1;
                    counter!(TOKEN_REFRESH, "result" => err.kind()).increment(1);
                    warn!(%user_id, provider = %provider, error = %err, "Token refresh failed");
                }
                Err(err) => {
                    stats.failed += 1;
                    counter!(TOKEN_REFRESH, "result" => "panicked").increment(1);
                    error!(error = ?err, "Refresh task panicked or was cancelled");
                }
            }
        }

        info!(
            attempted = stats.attempted,
            succeeded = stats.succeeded,
            failed = stats.failed,
            "Token refresh tick completed"
        );

        Ok(stats)
    }
}
