//! Periodic jobs driven by the scheduler binary
//!
//! Every job runs in its own task on its own interval, so a long wallet batch
//! never holds back a market or popularity tick. A job error cancels the
//! shared token and stops every other loop.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::discovery::{plan_wallet_run, DiscoveryQueue};
use crate::core::market_sync::MarketSyncPipeline;
use crate::core::popularity::PopularityRanker;
use crate::core::wallet_sync::WalletSyncPipeline;
use crate::models::config::PipelineConfig;
use crate::models::errors::AppResult;
use crate::storage::RelationalStore;
use crate::utils::cache::TtlCache;
use crate::utils::constants::STALE_WALLET_BATCH;
use crate::utils::telemetry::SyncTelemetry;

#[async_trait]
pub trait ScheduledJob: Send + 'static {
    fn name(&self) -> &'static str;

    /// One tick of work. An error stops the whole scheduler.
    async fn run_once(&mut self) -> AppResult<()>;
}

/// Run `job` every `period` until `cancel` fires or the job fails
pub async fn run_every<J: ScheduledJob>(
    mut job: J,
    period: Duration,
    cancel: CancellationToken,
) -> AppResult<()> {
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("{} loop stopped", job.name());
                return Ok(());
            }
            _ = tick.tick() => {}
        }

        if let Err(e) = job.run_once().await {
            error!("❌ {} loop failed: {}", job.name(), e);
            cancel.cancel();
            return Err(e);
        }
    }
}

pub fn spawn_job<J: ScheduledJob>(
    job: J,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<AppResult<()>> {
    info!("⏱️ {} every {}s", job.name(), period.as_secs());
    tokio::spawn(run_every(job, period, cancel))
}

/// Seeds, then counterparties found last run, then stale rows
pub struct WalletJob {
    pipeline: WalletSyncPipeline,
    relational: Arc<dyn RelationalStore>,
    cache: Arc<TtlCache>,
    telemetry: Arc<SyncTelemetry>,
    seeds: Vec<String>,
    refresh_threshold: chrono::Duration,
    discovery: DiscoveryQueue,
    cancel: CancellationToken,
}

impl WalletJob {
    pub fn new(
        pipeline: WalletSyncPipeline,
        relational: Arc<dyn RelationalStore>,
        cache: Arc<TtlCache>,
        telemetry: Arc<SyncTelemetry>,
        config: &PipelineConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            pipeline,
            relational,
            cache,
            telemetry,
            seeds: config.seed_wallets.clone(),
            refresh_threshold: config.refresh_threshold(),
            discovery: DiscoveryQueue::new(config.discovery_queue_limit),
            cancel,
        }
    }
}

#[async_trait]
impl ScheduledJob for WalletJob {
    fn name(&self) -> &'static str {
        "wallet sync"
    }

    async fn run_once(&mut self) -> AppResult<()> {
        let older_than = Utc::now() - self.refresh_threshold;
        let stale = match self
            .relational
            .list_stale_wallets(older_than, STALE_WALLET_BATCH)
            .await
        {
            Ok(stale) => stale,
            Err(e) => {
                warn!("⚠️ Could not list stale wallets: {}", e);
                Vec::new()
            }
        };

        let plan = plan_wallet_run(&self.seeds, self.discovery.drain(), stale);
        if plan.is_empty() {
            debug!("💤 Nothing to sync this cycle");
            return Ok(());
        }

        let results = self.pipeline.sync_batch(&plan, &self.cancel).await;
        let queued = self.discovery.extend_from_results(&results);
        if queued > 0 {
            info!("🧭 Queued {} counterparties for the next run", queued);
        }

        let evicted = self.cache.cleanup_expired();
        if evicted > 0 {
            debug!("🧹 Evicted {} expired cache entries", evicted);
        }
        self.telemetry.log_summary();

        match self.pipeline.escalation() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

pub struct MarketJob(pub MarketSyncPipeline);

#[async_trait]
impl ScheduledJob for MarketJob {
    fn name(&self) -> &'static str {
        "market sync"
    }

    async fn run_once(&mut self) -> AppResult<()> {
        self.0.sync_market_data().await;
        Ok(())
    }
}

pub struct PopularityJob(pub PopularityRanker);

#[async_trait]
impl ScheduledJob for PopularityJob {
    fn name(&self) -> &'static str {
        "popularity ranking"
    }

    async fn run_once(&mut self) -> AppResult<()> {
        if let Err(e) = self.0.discover_popular().await {
            warn!("⚠️ Popularity ranking failed: {}", e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::errors::{AppError, ErrorCode};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingJob {
        runs: Arc<AtomicUsize>,
        work: Duration,
        fail_on: Option<usize>,
    }

    impl CountingJob {
        fn new(work: Duration) -> (Self, Arc<AtomicUsize>) {
            let runs = Arc::new(AtomicUsize::new(0));
            let job = Self {
                runs: runs.clone(),
                work,
                fail_on: None,
            };
            (job, runs)
        }
    }

    #[async_trait]
    impl ScheduledJob for CountingJob {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run_once(&mut self) -> AppResult<()> {
            tokio::time::sleep(self.work).await;
            let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on == Some(run) {
                return Err(AppError::store_unavailable("relational store keeps failing"));
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_job_does_not_hold_back_other_loops() {
        let cancel = CancellationToken::new();
        let (slow, slow_runs) = CountingJob::new(Duration::from_secs(10 * 60));
        let (fast, fast_runs) = CountingJob::new(Duration::ZERO);

        let slow_task = spawn_job(slow, Duration::from_secs(60), cancel.clone());
        let fast_task = spawn_job(fast, Duration::from_secs(60), cancel.clone());

        tokio::time::sleep(Duration::from_secs(9 * 60 + 30)).await;
        assert_eq!(slow_runs.load(Ordering::SeqCst), 0);
        assert!(fast_runs.load(Ordering::SeqCst) >= 9);

        cancel.cancel();
        assert!(slow_task.await.unwrap().is_ok());
        assert!(fast_task.await.unwrap().is_ok());
        // the in-flight slow run still completes
        assert_eq!(slow_runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_error_cancels_every_loop() {
        let cancel = CancellationToken::new();
        let (mut failing, failing_runs) = CountingJob::new(Duration::ZERO);
        failing.fail_on = Some(2);
        let (other, _) = CountingJob::new(Duration::ZERO);

        let failing_task = spawn_job(failing, Duration::from_secs(1), cancel.clone());
        let other_task = spawn_job(other, Duration::from_secs(5), cancel.clone());

        let err = failing_task.await.unwrap().unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigStoreUnavailable);
        assert_eq!(failing_runs.load(Ordering::SeqCst), 2);
        assert!(cancel.is_cancelled());
        assert!(other_task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_before_first_tick_runs_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (job, runs) = CountingJob::new(Duration::ZERO);
        assert!(run_every(job, Duration::from_secs(1), cancel).await.is_ok());
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
