//! Type definitions for the wallet pipelines
//! Records persisted to the stores plus the per-crawl working set

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::models::errors::{AppError, AppResult};
use crate::utils::fixed_point::round_to_i64;

// ============================================
// WALLET
// ============================================

/// One transaction from the bounded per-crawl sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSample {
    pub hash: String,
    pub from: String,
    /// Empty for contract creations
    pub to: String,
    /// Value in native units (ether)
    pub value: f64,
    /// Unix seconds
    pub timestamp: i64,
    pub block_number: u64,
}

/// Raw wallet data as returned by the balance/history provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletDetail {
    pub address: String,
    /// Exact decimal string in native units
    pub balance: String,
    pub balance_usd: f64,
    pub transaction_count: u64,
    pub is_contract: bool,
    pub contract_type: Option<String>,
    pub transactions: Vec<TransactionSample>,
}

impl WalletDetail {
    /// Balance as a float for threshold comparisons
    pub fn balance_native(&self) -> f64 {
        self.balance.parse::<f64>().unwrap_or(0.0)
    }
}

/// Metrics derived from a transaction sample
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityMetrics {
    pub first_seen: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
    pub avg_transaction_value: f64,
    pub unique_counterparties: usize,
}

/// Canonical wallet record, identical shape in the relational row and the
/// `wallet_details:<address>` cache blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletRecord {
    pub address: String,
    pub balance: String,
    #[serde(rename = "balanceUSD")]
    pub balance_usd: f64,
    pub transaction_count: u64,
    pub is_contract: bool,
    pub contract_type: Option<String>,
    pub tags: BTreeSet<String>,
    pub risk_score: u8,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl WalletRecord {
    /// Assemble a record from provider data and scoring output
    pub fn from_parts(
        detail: &WalletDetail,
        metrics: &ActivityMetrics,
        tags: BTreeSet<String>,
        risk_score: u8,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            address: detail.address.clone(),
            balance: detail.balance.clone(),
            balance_usd: detail.balance_usd,
            transaction_count: detail.transaction_count,
            is_contract: detail.is_contract,
            contract_type: detail.contract_type.clone(),
            tags,
            risk_score: risk_score.min(100),
            first_seen: metrics.first_seen,
            last_activity: metrics.last_activity,
            updated_at: now,
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// Lifecycle of one wallet sync attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    Pending,
    Fetching,
    Scoring,
    Persisting,
    Skipped,
    Succeeded,
    Failed,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Pending => "PENDING",
            SyncState::Fetching => "FETCHING",
            SyncState::Scoring => "SCORING",
            SyncState::Persisting => "PERSISTING",
            SyncState::Skipped => "SKIPPED",
            SyncState::Succeeded => "SUCCEEDED",
            SyncState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncState::Skipped | SyncState::Succeeded | SyncState::Failed
        )
    }
}

/// Per-item outcome of a wallet sync
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    /// Normalized when valid, otherwise the raw input
    pub address: String,
    pub ok: bool,
    /// True when the staleness check short-circuited the sync
    pub skipped: bool,
    pub state: SyncState,
    pub wallet_record: Option<WalletRecord>,
    pub error: Option<String>,
    pub error_code: Option<String>,
    /// Counterparties seen in the sample, queued for the next cycle
    pub counterparties: Vec<String>,
}

impl SyncResult {
    pub fn succeeded(record: WalletRecord, counterparties: Vec<String>) -> Self {
        Self {
            address: record.address.clone(),
            ok: true,
            skipped: false,
            state: SyncState::Succeeded,
            wallet_record: Some(record),
            error: None,
            error_code: None,
            counterparties,
        }
    }

    pub fn skipped(address: String) -> Self {
        Self {
            address,
            ok: true,
            skipped: true,
            state: SyncState::Skipped,
            wallet_record: None,
            error: None,
            error_code: None,
            counterparties: Vec::new(),
        }
    }

    pub fn failed(address: String, err: &AppError) -> Self {
        Self {
            address,
            ok: false,
            skipped: false,
            state: SyncState::Failed,
            wallet_record: None,
            error: Some(err.to_string()),
            error_code: Some(err.code_str().to_string()),
            counterparties: Vec::new(),
        }
    }
}

// ============================================
// GRAPH
// ============================================

/// Graph node mirroring the identity fields needed for visualization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphWalletNode {
    pub address: String,
    pub balance: String,
    #[serde(rename = "balanceUSD")]
    pub balance_usd: f64,
    pub transaction_count: u64,
    pub is_contract: bool,
    pub risk_score: u8,
    pub tags: BTreeSet<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&WalletRecord> for GraphWalletNode {
    fn from(record: &WalletRecord) -> Self {
        Self {
            address: record.address.clone(),
            balance: record.balance.clone(),
            balance_usd: record.balance_usd,
            transaction_count: record.transaction_count,
            is_contract: record.is_contract,
            risk_score: record.risk_score,
            tags: record.tags.clone(),
            updated_at: record.updated_at,
        }
    }
}

/// Observed counterparty relationship, keyed by (source, target)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub strength: f64,
    pub transaction_count: u64,
    pub total_value: f64,
    pub first_interaction: DateTime<Utc>,
    pub last_interaction: DateTime<Utc>,
}

// ============================================
// MARKET
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthereumMarket {
    pub price: f64,
    pub market_cap: f64,
    pub volume_24h: f64,
    pub price_change_24h: f64,
    pub last_updated: DateTime<Utc>,
}

impl EthereumMarket {
    /// Fallback when the price provider fails
    pub fn zeroed(now: DateTime<Utc>) -> Self {
        Self {
            price: 0.0,
            market_cap: 0.0,
            volume_24h: 0.0,
            price_change_24h: 0.0,
            last_updated: now,
        }
    }
}

/// Gas tiers in gwei
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasTracker {
    pub slow: f64,
    pub standard: f64,
    pub fast: f64,
    pub instant: f64,
    pub last_updated: DateTime<Utc>,
}

impl GasTracker {
    /// Fixed fallback ladder
    pub fn fallback(now: DateTime<Utc>) -> Self {
        let [slow, standard, fast, instant] = crate::utils::constants::DEFAULT_GAS_LADDER;
        Self {
            slow,
            standard,
            fast,
            instant,
            last_updated: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStats {
    pub block_number: u64,
    /// Seconds between the last two blocks
    pub block_time: f64,
    pub difficulty: f64,
    pub hash_rate: f64,
    pub last_updated: DateTime<Utc>,
}

impl NetworkStats {
    /// Zeroed counters with the nominal block time
    pub fn estimated(now: DateTime<Utc>) -> Self {
        Self {
            block_number: 0,
            block_time: crate::utils::constants::DEFAULT_BLOCK_TIME_SECS,
            difficulty: 0.0,
            hash_rate: 0.0,
            last_updated: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    pub ethereum: EthereumMarket,
    pub gas_tracker: GasTracker,
    pub network_stats: NetworkStats,
    pub last_updated: DateTime<Utc>,
}

/// Immutable history row; money and gas stored as rounded integers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketHistoryRow {
    pub price_usd_cents: i64,
    pub market_cap_usd: i64,
    pub volume_24h_usd: i64,
    pub price_change_24h: f64,
    pub gas_slow: i64,
    pub gas_standard: i64,
    pub gas_fast: i64,
    pub gas_instant: i64,
    pub block_number: i64,
    pub recorded_at: DateTime<Utc>,
}

impl MarketHistoryRow {
    /// Round every fixed-point column before the row can exist.
    ///
    /// Fails with `NumericRangeViolation` on NaN/infinite/out-of-range values.
    pub fn from_snapshot(snapshot: &MarketSnapshot) -> AppResult<Self> {
        let eth = &snapshot.ethereum;
        let gas = &snapshot.gas_tracker;
        let price_change_24h = if eth.price_change_24h.is_finite() {
            eth.price_change_24h
        } else {
            return Err(AppError::numeric_range(
                "price_change_24h",
                eth.price_change_24h,
            ));
        };

        Ok(Self {
            price_usd_cents: round_to_i64("price_usd_cents", eth.price * 100.0)?,
            market_cap_usd: round_to_i64("market_cap_usd", eth.market_cap)?,
            volume_24h_usd: round_to_i64("volume_24h_usd", eth.volume_24h)?,
            price_change_24h,
            gas_slow: round_to_i64("gas_slow", gas.slow)?,
            gas_standard: round_to_i64("gas_standard", gas.standard)?,
            gas_fast: round_to_i64("gas_fast", gas.fast)?,
            gas_instant: round_to_i64("gas_instant", gas.instant)?,
            block_number: i64::try_from(snapshot.network_stats.block_number).map_err(|_| {
                AppError::numeric_range("block_number", snapshot.network_stats.block_number as f64)
            })?,
            recorded_at: snapshot.last_updated,
        })
    }
}

/// Per-source outcome of a market sync
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceOutcome {
    pub source: String,
    pub ok: bool,
    pub error: Option<String>,
}

/// Complete accounting of one market sync run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSyncResult {
    pub snapshot: MarketSnapshot,
    pub sources: Vec<SourceOutcome>,
    pub cache_written: bool,
    pub history_written: bool,
    pub error: Option<String>,
}

impl MarketSyncResult {
    pub fn fallback_count(&self) -> usize {
        self.sources.iter().filter(|s| !s.ok).count()
    }
}

// ============================================
// POPULARITY
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopularWallet {
    pub rank: usize,
    pub address: String,
    pub balance: String,
    #[serde(rename = "balanceUSD")]
    pub balance_usd: f64,
    pub transaction_count: u64,
    pub tags: BTreeSet<String>,
    pub risk_score: u8,
    pub last_activity: Option<DateTime<Utc>>,
    pub popularity_score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(market_cap: f64, volume: f64) -> MarketSnapshot {
        let now = Utc::now();
        MarketSnapshot {
            ethereum: EthereumMarket {
                price: 2612.35,
                market_cap,
                volume_24h: volume,
                price_change_24h: -1.25,
                last_updated: now,
            },
            gas_tracker: GasTracker::fallback(now),
            network_stats: NetworkStats::estimated(now),
            last_updated: now,
        }
    }

    #[test]
    fn test_history_row_rounds_money() {
        let row = MarketHistoryRow::from_snapshot(&snapshot(314063280714.3017, 17664185611.142204))
            .unwrap();
        assert_eq!(row.market_cap_usd, 314063280714);
        assert_eq!(row.volume_24h_usd, 17664185611);
        assert_eq!(row.price_usd_cents, 261235);
        assert_eq!(row.gas_standard, 25);
    }

    #[test]
    fn test_history_row_rounds_up_not_truncates() {
        let row = MarketHistoryRow::from_snapshot(&snapshot(100.5, 99.7)).unwrap();
        assert_eq!(row.market_cap_usd, 101);
        assert_eq!(row.volume_24h_usd, 100);
    }

    #[test]
    fn test_history_row_rejects_non_finite() {
        let err = MarketHistoryRow::from_snapshot(&snapshot(f64::INFINITY, 1.0)).unwrap_err();
        assert_eq!(err.code, crate::models::errors::ErrorCode::NumericRangeViolation);
    }

    #[test]
    fn test_wallet_record_serializes_camel_case() {
        let record = WalletRecord {
            address: "0xabc".to_string(),
            balance: "1.5".to_string(),
            balance_usd: 3000.0,
            transaction_count: 3,
            is_contract: false,
            contract_type: None,
            tags: BTreeSet::new(),
            risk_score: 0,
            first_seen: None,
            last_activity: None,
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"balanceUSD\""));
        assert!(json.contains("\"transactionCount\""));
        assert!(json.contains("\"riskScore\""));
    }

    #[test]
    fn test_sync_state_terminal() {
        assert!(SyncState::Skipped.is_terminal());
        assert!(SyncState::Failed.is_terminal());
        assert!(!SyncState::Persisting.is_terminal());
    }
}
