//! Popular wallet ranking, derived purely from relational state

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::info;

use crate::core::scoring::{HeuristicScoring, ScoringStrategy};
use crate::models::errors::{AppError, AppResult};
use crate::models::types::PopularWallet;
use crate::storage::{MultiStoreWriter, RelationalStore};
use crate::utils::constants::{
    POPULAR_ACTIVE_WINDOW_DAYS, POPULAR_LIMIT, POPULAR_MIN_TX_COUNT, POPULAR_WALLETS_KEY,
    POPULAR_WALLETS_TTL,
};
use crate::utils::telemetry::SyncTelemetry;

pub struct PopularityRanker {
    relational: Arc<dyn RelationalStore>,
    writer: Arc<MultiStoreWriter>,
    scoring: Arc<dyn ScoringStrategy>,
    telemetry: Arc<SyncTelemetry>,
    read_timeout: std::time::Duration,
}

impl PopularityRanker {
    pub fn new(
        writer: Arc<MultiStoreWriter>,
        telemetry: Arc<SyncTelemetry>,
        read_timeout: std::time::Duration,
    ) -> Self {
        Self {
            relational: writer.relational(),
            writer,
            scoring: Arc::new(HeuristicScoring),
            telemetry,
            read_timeout,
        }
    }

    pub fn with_scoring(mut self, scoring: Arc<dyn ScoringStrategy>) -> Self {
        self.scoring = scoring;
        self
    }

    pub async fn discover_popular(&self) -> AppResult<Vec<PopularWallet>> {
        self.discover_popular_at(Utc::now()).await
    }

    /// Rank wallets active within the window as of `now` and cache the list
    pub async fn discover_popular_at(&self, now: DateTime<Utc>) -> AppResult<Vec<PopularWallet>> {
        let active_since = now - Duration::days(POPULAR_ACTIVE_WINDOW_DAYS);
        let rows = tokio::time::timeout(
            self.read_timeout,
            self.relational
                .query_popular(POPULAR_MIN_TX_COUNT, active_since, POPULAR_LIMIT),
        )
        .await
        .map_err(|_| AppError::store_timeout("popular wallets query timed out"))??;

        let popular: Vec<PopularWallet> = rows
            .into_iter()
            .enumerate()
            .map(|(idx, record)| PopularWallet {
                rank: idx + 1,
                popularity_score: self.scoring.popularity_score(&record, now),
                address: record.address,
                balance: record.balance,
                balance_usd: record.balance_usd,
                transaction_count: record.transaction_count,
                tags: record.tags,
                risk_score: record.risk_score,
                last_activity: record.last_activity,
            })
            .collect();

        // Cache failure is logged by the writer and does not fail the run
        let _ = self
            .writer
            .cache_value(POPULAR_WALLETS_KEY, &popular, POPULAR_WALLETS_TTL)
            .await;

        self.telemetry.record_popularity_run();
        info!("⭐ Popular wallets ranked: {}", popular.len());
        Ok(popular)
    }
}
