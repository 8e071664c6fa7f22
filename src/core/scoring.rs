//! Scoring Module
//! Activity metrics, tags, a 0-100 risk score and the popularity score.
//!
//! The thresholds are additive heuristics, not a calibrated model. They sit
//! behind `ScoringStrategy` so a different strategy can be swapped in without
//! touching the pipelines.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::models::types::{ActivityMetrics, GraphEdge, TransactionSample, WalletDetail, WalletRecord};
use crate::utils::constants::{
    HIGH_ACTIVITY_TX_COUNT, HIGH_BALANCE_THRESHOLD, HIGH_VALUE_TX_THRESHOLD,
    HUB_COUNTERPARTY_THRESHOLD, RISK_CONTRACT_CREDIT, RISK_NEW_HYPERACTIVE_PENALTY,
    RISK_NEW_WALLET_DAYS, RISK_NEW_WALLET_MIN_TX, RISK_VERY_HIGH_TX_COUNT,
    RISK_VERY_HIGH_TX_PENALTY,
};

pub const TAG_CONTRACT: &str = "contract";
pub const TAG_HIGH_BALANCE: &str = "high-balance";
pub const TAG_HIGH_ACTIVITY: &str = "high-activity";
pub const TAG_HUB: &str = "hub";
pub const TAG_HIGH_VALUE_TXS: &str = "high-value-txs";

/// Pluggable scoring used by the wallet and popularity pipelines
pub trait ScoringStrategy: Send + Sync {
    fn activity_metrics(&self, txs: &[TransactionSample]) -> ActivityMetrics;

    fn tags(&self, detail: &WalletDetail, metrics: &ActivityMetrics) -> BTreeSet<String>;

    /// Always within 0..=100
    fn risk_score(&self, detail: &WalletDetail, metrics: &ActivityMetrics, now: DateTime<Utc>)
        -> u8;

    fn popularity_score(&self, record: &WalletRecord, now: DateTime<Utc>) -> f64;
}

/// Default rule set
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicScoring;

impl ScoringStrategy for HeuristicScoring {
    fn activity_metrics(&self, txs: &[TransactionSample]) -> ActivityMetrics {
        compute_activity_metrics(txs)
    }

    fn tags(&self, detail: &WalletDetail, metrics: &ActivityMetrics) -> BTreeSet<String> {
        generate_tags(detail, metrics)
    }

    fn risk_score(
        &self,
        detail: &WalletDetail,
        metrics: &ActivityMetrics,
        now: DateTime<Utc>,
    ) -> u8 {
        compute_risk_score(detail, metrics, now)
    }

    fn popularity_score(&self, record: &WalletRecord, now: DateTime<Utc>) -> f64 {
        compute_popularity_score(record, now)
    }
}

/// Min/max timestamps, mean value and distinct from/to addresses of a sample
pub fn compute_activity_metrics(txs: &[TransactionSample]) -> ActivityMetrics {
    if txs.is_empty() {
        return ActivityMetrics::default();
    }

    let first = txs.iter().map(|tx| tx.timestamp).min();
    let last = txs.iter().map(|tx| tx.timestamp).max();
    let total: f64 = txs.iter().map(|tx| tx.value).sum();

    let counterparties: HashSet<&str> = txs
        .iter()
        .flat_map(|tx| [tx.from.as_str(), tx.to.as_str()])
        .filter(|addr| !addr.is_empty())
        .collect();

    ActivityMetrics {
        first_seen: first.and_then(|ts| DateTime::from_timestamp(ts, 0)),
        last_activity: last.and_then(|ts| DateTime::from_timestamp(ts, 0)),
        avg_transaction_value: total / txs.len() as f64,
        unique_counterparties: counterparties.len(),
    }
}

pub fn generate_tags(detail: &WalletDetail, metrics: &ActivityMetrics) -> BTreeSet<String> {
    let mut tags = BTreeSet::new();

    if detail.is_contract {
        tags.insert(TAG_CONTRACT.to_string());
        if let Some(kind) = detail.contract_type.as_deref().filter(|k| !k.is_empty()) {
            tags.insert(kind.to_string());
        }
    }
    if detail.balance_native() > HIGH_BALANCE_THRESHOLD {
        tags.insert(TAG_HIGH_BALANCE.to_string());
    }
    if detail.transaction_count > HIGH_ACTIVITY_TX_COUNT {
        tags.insert(TAG_HIGH_ACTIVITY.to_string());
    }
    if metrics.unique_counterparties > HUB_COUNTERPARTY_THRESHOLD {
        tags.insert(TAG_HUB.to_string());
    }
    if metrics.avg_transaction_value > HIGH_VALUE_TX_THRESHOLD {
        tags.insert(TAG_HIGH_VALUE_TXS.to_string());
    }

    tags
}

/// 0 base; +20 very high tx count; +30 new (< 7 days) and hyperactive;
/// -10 for contracts; clamped to 0..=100.
///
/// Wallet age comes from `first_seen`; with no sample the wallet is not
/// considered new.
pub fn compute_risk_score(detail: &WalletDetail, metrics: &ActivityMetrics, now: DateTime<Utc>) -> u8 {
    let mut score: i32 = 0;

    if detail.transaction_count > RISK_VERY_HIGH_TX_COUNT {
        score += RISK_VERY_HIGH_TX_PENALTY;
    }

    let is_new = metrics
        .first_seen
        .map(|first| now - first < Duration::days(RISK_NEW_WALLET_DAYS))
        .unwrap_or(false);
    if is_new && detail.transaction_count > RISK_NEW_WALLET_MIN_TX {
        score += RISK_NEW_HYPERACTIVE_PENALTY;
    }

    if detail.is_contract {
        score += RISK_CONTRACT_CREDIT;
    }

    score.clamp(0, 100) as u8
}

/// Step function over time since last activity
pub fn recency_weight(last_activity: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(last) = last_activity else {
        return 0.0;
    };
    let age = now - last;
    if age < Duration::days(1) {
        50.0
    } else if age < Duration::days(7) {
        30.0
    } else if age < Duration::days(30) {
        10.0
    } else {
        0.0
    }
}

/// `ln(tx+1)*10 + ln(usd+1)*5 + recency`
pub fn compute_popularity_score(record: &WalletRecord, now: DateTime<Utc>) -> f64 {
    let tx = (record.transaction_count as f64 + 1.0).ln() * 10.0;
    let usd = (record.balance_usd.max(0.0) + 1.0).ln() * 5.0;
    tx + usd + recency_weight(record.last_activity, now)
}

/// Aggregate the sample into one edge per counterparty, directed from the
/// synced wallet. Self-transfers and contract creations are skipped.
pub fn build_edges(address: &str, txs: &[TransactionSample]) -> Vec<GraphEdge> {
    struct Acc {
        count: u64,
        total: f64,
        first: i64,
        last: i64,
    }

    let mut per_peer: BTreeMap<&str, Acc> = BTreeMap::new();
    for tx in txs {
        let peer = if tx.from == address {
            tx.to.as_str()
        } else if tx.to == address {
            tx.from.as_str()
        } else {
            continue;
        };
        if peer.is_empty() || peer == address {
            continue;
        }

        let acc = per_peer.entry(peer).or_insert(Acc {
            count: 0,
            total: 0.0,
            first: tx.timestamp,
            last: tx.timestamp,
        });
        acc.count += 1;
        acc.total += tx.value;
        acc.first = acc.first.min(tx.timestamp);
        acc.last = acc.last.max(tx.timestamp);
    }

    per_peer
        .into_iter()
        .map(|(peer, acc)| GraphEdge {
            source: address.to_string(),
            target: peer.to_string(),
            strength: (acc.count as f64 + 1.0).ln() + (acc.total.max(0.0) + 1.0).ln(),
            transaction_count: acc.count,
            total_value: acc.total,
            first_interaction: DateTime::from_timestamp(acc.first, 0).unwrap_or_default(),
            last_interaction: DateTime::from_timestamp(acc.last, 0).unwrap_or_default(),
        })
        .collect()
}

/// Distinct counterparties of `address` in sample order
pub fn counterparties(address: &str, txs: &[TransactionSample]) -> Vec<String> {
    let mut seen = HashSet::new();
    txs.iter()
        .flat_map(|tx| [tx.from.as_str(), tx.to.as_str()])
        .filter(|peer| !peer.is_empty() && *peer != address)
        .filter(|peer| seen.insert(*peer))
        .map(String::from)
        .collect()
}
