//! Wallet Sync Pipeline
//!
//! normalize → staleness → fetch → score → persist, one wallet at a time,
//! many wallets through a bounded worker pool. Every item ends in a
//! `SyncResult`; nothing escapes the batch.

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::core::scoring::{build_edges, counterparties, HeuristicScoring, ScoringStrategy};
use crate::core::staleness::StalenessPolicy;
use crate::models::config::PipelineConfig;
use crate::models::errors::{AppError, AppResult};
use crate::models::types::{GraphEdge, SyncResult, SyncState, WalletDetail, WalletRecord};
use crate::providers::WalletDataSource;
use crate::storage::MultiStoreWriter;
use crate::utils::address::normalize_address;
use crate::utils::telemetry::SyncTelemetry;

pub struct WalletSyncPipeline {
    source: Arc<dyn WalletDataSource>,
    scoring: Arc<dyn ScoringStrategy>,
    staleness: StalenessPolicy,
    writer: Arc<MultiStoreWriter>,
    telemetry: Arc<SyncTelemetry>,
    sample_size: usize,
    fetch_timeout: Duration,
    store_timeout: Duration,
    max_concurrent: usize,
    max_store_failures: u64,
}

impl WalletSyncPipeline {
    pub fn new(
        source: Arc<dyn WalletDataSource>,
        writer: Arc<MultiStoreWriter>,
        telemetry: Arc<SyncTelemetry>,
        config: &PipelineConfig,
    ) -> Self {
        let staleness = StalenessPolicy::new(
            writer.relational(),
            config.refresh_threshold(),
            config.store_timeout,
        );
        Self {
            source,
            scoring: Arc::new(HeuristicScoring),
            staleness,
            writer,
            telemetry,
            sample_size: config.transaction_sample_size.max(1),
            fetch_timeout: config.fetch_timeout,
            store_timeout: config.store_timeout,
            max_concurrent: config.max_concurrent_syncs.max(1),
            max_store_failures: config.max_consecutive_store_failures,
        }
    }

    pub fn with_scoring(mut self, scoring: Arc<dyn ScoringStrategy>) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn staleness(&self) -> &StalenessPolicy {
        &self.staleness
    }

    /// Sync one wallet; failures are classified into the result
    pub async fn sync_wallet(&self, address: &str) -> SyncResult {
        let result = self.run(address).await;
        self.telemetry.record_sync(&result);
        result
    }

    /// Sync every address with at most `max_concurrent_syncs` in flight.
    ///
    /// Results come back in input order. Once `cancel` fires, items that have
    /// not started yet fail with `SYNC_CANCELLED`; in-flight items finish.
    pub async fn sync_batch(
        &self,
        addresses: &[String],
        cancel: &CancellationToken,
    ) -> Vec<SyncResult> {
        let run_id = Uuid::new_v4();
        let span = info_span!("sync_batch", %run_id, size = addresses.len());

        async move {
            info!(
                "🚀 Wallet batch started ({} addresses, {} workers)",
                addresses.len(),
                self.max_concurrent
            );

            let results: Vec<SyncResult> = stream::iter(addresses.iter().cloned())
                .map(|address: String| async move {
                    if cancel.is_cancelled() {
                        return SyncResult::failed(address, &AppError::cancelled());
                    }
                    self.sync_wallet(&address).await
                })
                .buffered(self.max_concurrent)
                .collect()
                .await;

            let synced = results.iter().filter(|r| r.ok && !r.skipped).count();
            let skipped = results.iter().filter(|r| r.skipped).count();
            let failed = results.len() - synced - skipped;
            info!(
                "🏁 Wallet batch done | synced: {} | skipped: {} | failed: {}",
                synced, skipped, failed
            );
            results
        }
        .instrument(span)
        .await
    }

    /// Error for the scheduler once relational writes keep failing
    pub fn escalation(&self) -> Option<AppError> {
        self.telemetry.escalation(self.max_store_failures)
    }

    async fn run(&self, raw: &str) -> SyncResult {
        let mut state = SyncState::Pending;

        let address = match normalize_address(raw) {
            Ok(address) => address,
            Err(e) => {
                warn!("❌ Rejected address {:?}: {}", raw, e);
                transition(raw, &mut state, SyncState::Failed);
                return SyncResult::failed(raw.trim().to_string(), &e);
            }
        };

        if !self.staleness.needs_refresh(&address).await {
            transition(&address, &mut state, SyncState::Skipped);
            return SyncResult::skipped(address);
        }

        transition(&address, &mut state, SyncState::Fetching);
        let detail = match self.fetch(&address).await {
            Ok(detail) => detail,
            Err(e) => return self.fail(&address, &mut state, e),
        };

        transition(&address, &mut state, SyncState::Scoring);
        let stored_first_seen = self.stored_first_seen(&address).await;
        let (record, edges) = self.score(&address, &detail, stored_first_seen);

        transition(&address, &mut state, SyncState::Persisting);
        match self.writer.upsert_wallet(&record, &edges).await {
            Ok(outcome) => {
                self.writer
                    .cache_transactions(&address, &detail.transactions)
                    .await;
                transition(&address, &mut state, SyncState::Succeeded);
                SyncResult::succeeded(outcome.record, counterparties(&address, &detail.transactions))
            }
            Err(e) => self.fail(&address, &mut state, e),
        }
    }

    async fn fetch(&self, address: &str) -> AppResult<WalletDetail> {
        let mut detail = tokio::time::timeout(
            self.fetch_timeout,
            self.source.fetch_wallet(address, self.sample_size),
        )
        .await
        .map_err(|_| {
            AppError::external_timeout(format!(
                "wallet fetch exceeded {}ms",
                self.fetch_timeout.as_millis()
            ))
        })??;

        // Stores are keyed by the normalized address, whatever the source echoes
        detail.address = address.to_string();
        detail.transactions.truncate(self.sample_size);
        Ok(detail)
    }

    /// `first_seen` of the existing row; `None` when absent or unreadable.
    /// Wallet age is the earlier of this and the sample's oldest transaction.
    async fn stored_first_seen(&self, address: &str) -> Option<DateTime<Utc>> {
        let read = tokio::time::timeout(
            self.store_timeout,
            self.writer.relational().get_wallet(address),
        )
        .await;
        match read {
            Ok(Ok(row)) => row.and_then(|r| r.first_seen),
            Ok(Err(e)) => {
                warn!("⚠️ Prior record read failed for {}: {}", address, e);
                None
            }
            Err(_) => {
                warn!("⚠️ Prior record read timed out for {}", address);
                None
            }
        }
    }

    fn score(
        &self,
        address: &str,
        detail: &WalletDetail,
        stored_first_seen: Option<DateTime<Utc>>,
    ) -> (WalletRecord, Vec<GraphEdge>) {
        let now = Utc::now();
        let mut metrics = self.scoring.activity_metrics(&detail.transactions);
        metrics.first_seen = [stored_first_seen, metrics.first_seen]
            .into_iter()
            .flatten()
            .min();
        let tags = self.scoring.tags(detail, &metrics);
        let risk_score = self.scoring.risk_score(detail, &metrics, now).min(100);
        let record = WalletRecord::from_parts(detail, &metrics, tags, risk_score, now);
        (record, build_edges(address, &detail.transactions))
    }

    fn fail(&self, address: &str, state: &mut SyncState, err: AppError) -> SyncResult {
        warn!("❌ Sync failed for {} during {}: {}", address, state.as_str(), err);
        transition(address, state, SyncState::Failed);
        SyncResult::failed(address.to_string(), &err)
    }
}

fn transition(address: &str, state: &mut SyncState, next: SyncState) {
    debug!("{} {} → {}", address, state.as_str(), next.as_str());
    *state = next;
}
