//! Storage Module - Relational, Graph and Cache Bindings
//!
//! Each store sits behind an async trait so the pipelines only ever see
//! `Arc<dyn ...>` handles. Constructors either return a working binding or
//! fail with `CFG_STORE_UNAVAILABLE`.
//!
//! Tables written (SQLite):
//! - `wallets` - UPSERT on address (canonical wallet record)
//! - `market_history` - INSERT (append-only snapshots)

pub mod graph;
pub mod sqlite;
pub mod writer;

pub use graph::*;
pub use sqlite::*;
pub use writer::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::models::errors::AppResult;
use crate::models::types::{GraphEdge, GraphWalletNode, MarketHistoryRow, WalletRecord};

/// Relational store holding the canonical wallet record and market history
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Insert or update keyed on address; `first_seen` and `created_at` are
    /// write-once. Returns the row as stored.
    async fn upsert_wallet(&self, record: &WalletRecord) -> AppResult<WalletRecord>;

    async fn get_wallet(&self, address: &str) -> AppResult<Option<WalletRecord>>;

    /// `updated_at` of the stored row, `None` when the wallet was never synced
    async fn wallet_updated_at(&self, address: &str) -> AppResult<Option<DateTime<Utc>>>;

    /// Append one immutable history row
    async fn insert_market_history(&self, row: &MarketHistoryRow) -> AppResult<()>;

    /// Wallets with `transaction_count > min_tx_count` active since
    /// `active_since`, ordered by transaction count then USD balance
    async fn query_popular(
        &self,
        min_tx_count: u64,
        active_since: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<WalletRecord>>;

    /// Page through wallets by address
    async fn list_wallets(&self, limit: usize, offset: usize) -> AppResult<Vec<WalletRecord>>;

    /// Addresses whose `updated_at` is older than `older_than`, oldest first
    async fn list_stale_wallets(
        &self,
        older_than: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<String>>;

    async fn count_market_history(&self) -> AppResult<u64>;

    /// Most recently appended history row
    async fn latest_market_history(&self) -> AppResult<Option<MarketHistoryRow>>;
}

/// Graph store: create-or-update by key, never read back by the pipelines
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Create the node if absent, else refresh its mirrored attributes
    async fn upsert_node(&self, node: &GraphWalletNode) -> AppResult<()>;

    /// Create or update the edge keyed by (source, target)
    async fn upsert_edge(&self, edge: &GraphEdge) -> AppResult<()>;
}

/// Key/value cache with per-entry TTL
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn set_json(&self, key: &str, value: serde_json::Value, ttl: Duration) -> AppResult<()>;

    async fn get_json(&self, key: &str) -> AppResult<Option<serde_json::Value>>;
}
