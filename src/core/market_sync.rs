//! Market Sync Pipeline
//!
//! Price, gas and network stats are fetched concurrently. A failed source is
//! replaced by its default and reported, it never aborts the run. The
//! snapshot goes to the cache and one rounded row to `market_history`.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::models::errors::{AppError, AppResult};
use crate::models::types::{
    EthereumMarket, GasTracker, MarketHistoryRow, MarketSnapshot, MarketSyncResult, NetworkStats,
    SourceOutcome,
};
use crate::providers::{GasOracle, NetworkStatsSource, PriceSource};
use crate::storage::MultiStoreWriter;
use crate::utils::constants::{
    COINGECKO_ETHEREUM_ID, GAS_TRACKER_TTL, MARKET_ETHEREUM_KEY, MARKET_GAS_KEY,
    MARKET_LATEST_KEY, MARKET_NETWORK_KEY, MARKET_SNAPSHOT_TTL,
};
use crate::utils::telemetry::SyncTelemetry;

pub const SOURCE_PRICE: &str = "price";
pub const SOURCE_GAS: &str = "gas_oracle";
pub const SOURCE_NETWORK: &str = "network_stats";

pub struct MarketSyncPipeline {
    prices: Arc<dyn PriceSource>,
    gas: Arc<dyn GasOracle>,
    network: Arc<dyn NetworkStatsSource>,
    writer: Arc<MultiStoreWriter>,
    telemetry: Arc<SyncTelemetry>,
    fetch_timeout: Duration,
}

impl MarketSyncPipeline {
    pub fn new(
        prices: Arc<dyn PriceSource>,
        gas: Arc<dyn GasOracle>,
        network: Arc<dyn NetworkStatsSource>,
        writer: Arc<MultiStoreWriter>,
        telemetry: Arc<SyncTelemetry>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            prices,
            gas,
            network,
            writer,
            telemetry,
            fetch_timeout,
        }
    }

    pub async fn sync_market_data(&self) -> MarketSyncResult {
        let result = self.run(Utc::now()).await;
        self.telemetry.record_market_sync(&result);
        result
    }

    async fn run(&self, now: DateTime<Utc>) -> MarketSyncResult {
        let (ethereum, gas_tracker, network_stats) = tokio::join!(
            fetch_or_default(
                SOURCE_PRICE,
                self.fetch_timeout,
                self.prices.fetch_market(COINGECKO_ETHEREUM_ID),
                EthereumMarket::zeroed(now),
            ),
            fetch_or_default(
                SOURCE_GAS,
                self.fetch_timeout,
                self.gas.fetch_gas(),
                GasTracker::fallback(now),
            ),
            fetch_or_default(
                SOURCE_NETWORK,
                self.fetch_timeout,
                self.network.fetch_network_stats(),
                NetworkStats::estimated(now),
            ),
        );

        let snapshot = MarketSnapshot {
            ethereum: ethereum.0,
            gas_tracker: gas_tracker.0,
            network_stats: network_stats.0,
            last_updated: now,
        };
        let mut result = MarketSyncResult {
            snapshot,
            sources: vec![ethereum.1, gas_tracker.1, network_stats.1],
            cache_written: false,
            history_written: false,
            error: None,
        };

        // Rounding happens before anything is written
        let row = match MarketHistoryRow::from_snapshot(&result.snapshot) {
            Ok(row) => row,
            Err(e) => {
                error!("❌ Market snapshot rejected: {}", e);
                result.error = Some(e.to_string());
                return result;
            }
        };

        result.cache_written = self.write_cache(&result.snapshot).await;

        match self.writer.append_market_history(&row).await {
            Ok(()) => result.history_written = true,
            Err(e) => {
                error!("❌ Market history append failed: {}", e);
                result.error = Some(e.to_string());
            }
        }

        info!(
            "📈 Market sync | ETH ${:.2} | gas {}/{}/{}/{} gwei | block {} | fallbacks: {}",
            result.snapshot.ethereum.price,
            result.snapshot.gas_tracker.slow,
            result.snapshot.gas_tracker.standard,
            result.snapshot.gas_tracker.fast,
            result.snapshot.gas_tracker.instant,
            result.snapshot.network_stats.block_number,
            result.fallback_count()
        );
        result
    }

    async fn write_cache(&self, snapshot: &MarketSnapshot) -> bool {
        let writes = [
            self.writer
                .cache_value(MARKET_LATEST_KEY, snapshot, MARKET_SNAPSHOT_TTL)
                .await,
            self.writer
                .cache_value(MARKET_ETHEREUM_KEY, &snapshot.ethereum, MARKET_SNAPSHOT_TTL)
                .await,
            self.writer
                .cache_value(MARKET_GAS_KEY, &snapshot.gas_tracker, GAS_TRACKER_TTL)
                .await,
            self.writer
                .cache_value(MARKET_NETWORK_KEY, &snapshot.network_stats, MARKET_SNAPSHOT_TTL)
                .await,
        ];
        writes.iter().all(|w| w.is_ok())
    }
}

/// Await one source under `timeout`, substituting `fallback` on any failure
async fn fetch_or_default<T, F>(
    name: &str,
    timeout: Duration,
    fut: F,
    fallback: T,
) -> (T, SourceOutcome)
where
    F: Future<Output = AppResult<T>>,
{
    let outcome = match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(AppError::external_timeout(format!(
            "{} exceeded {}ms",
            name,
            timeout.as_millis()
        ))),
    };

    match outcome {
        Ok(value) => (
            value,
            SourceOutcome {
                source: name.to_string(),
                ok: true,
                error: None,
            },
        ),
        Err(e) => {
            warn!("⚠️ {} unavailable, using defaults: {}", name, e);
            (
                fallback,
                SourceOutcome {
                    source: name.to_string(),
                    ok: false,
                    error: Some(e.to_string()),
                },
            )
        }
    }
}
