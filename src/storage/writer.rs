//! Multi-store writer
//!
//! Fans one wallet out to the relational store, the graph and the cache.
//! The relational row is authoritative: its failure fails the item. Graph and
//! cache writes are best-effort and converge on the next sync.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::models::errors::{AppError, AppResult};
use crate::models::types::{
    GraphEdge, GraphWalletNode, MarketHistoryRow, TransactionSample, WalletRecord,
};
use crate::storage::{CacheStore, GraphStore, RelationalStore};
use crate::utils::constants::{
    wallet_details_key, wallet_transactions_key, WALLET_DETAILS_TTL, WALLET_TRANSACTIONS_TTL,
};
use crate::utils::telemetry::SyncTelemetry;

/// What reached each store for one wallet
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    /// Row as stored (write-once fields resolved)
    pub record: WalletRecord,
    pub graph_node_written: bool,
    pub edges_written: usize,
    pub edges_failed: usize,
    pub cache_written: bool,
    pub graph_error: Option<String>,
    pub cache_error: Option<String>,
}

pub struct MultiStoreWriter {
    relational: Arc<dyn RelationalStore>,
    graph: Arc<dyn GraphStore>,
    cache: Arc<dyn CacheStore>,
    store_timeout: Duration,
    telemetry: Arc<SyncTelemetry>,
}

impl MultiStoreWriter {
    pub fn new(
        relational: Arc<dyn RelationalStore>,
        graph: Arc<dyn GraphStore>,
        cache: Arc<dyn CacheStore>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            relational,
            graph,
            cache,
            store_timeout,
            telemetry: Arc::new(SyncTelemetry::new()),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<SyncTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn relational(&self) -> Arc<dyn RelationalStore> {
        self.relational.clone()
    }

    /// Upsert one wallet into every store.
    ///
    /// Returns `Err` only when the relational write fails or times out.
    pub async fn upsert_wallet(
        &self,
        record: &WalletRecord,
        edges: &[GraphEdge],
    ) -> AppResult<WriteOutcome> {
        let stored = self
            .timed("relational upsert", self.relational.upsert_wallet(record))
            .await?;

        let mut outcome = WriteOutcome {
            record: stored,
            graph_node_written: false,
            edges_written: 0,
            edges_failed: 0,
            cache_written: false,
            graph_error: None,
            cache_error: None,
        };

        let node = GraphWalletNode::from(&outcome.record);
        match self.timed("graph node", self.graph.upsert_node(&node)).await {
            Ok(()) => outcome.graph_node_written = true,
            Err(e) => {
                warn!("⚠️ Graph node write failed for {}: {}", node.address, e);
                self.telemetry.record_graph_failure();
                outcome.graph_error = Some(e.to_string());
            }
        }

        for edge in edges {
            match self.timed("graph edge", self.graph.upsert_edge(edge)).await {
                Ok(()) => outcome.edges_written += 1,
                Err(e) => {
                    warn!(
                        "⚠️ Graph edge write failed {} -> {}: {}",
                        edge.source, edge.target, e
                    );
                    self.telemetry.record_graph_failure();
                    outcome.edges_failed += 1;
                    outcome.graph_error.get_or_insert_with(|| e.to_string());
                }
            }
        }

        let key = wallet_details_key(&outcome.record.address);
        match self
            .cache_value(&key, &outcome.record, WALLET_DETAILS_TTL)
            .await
        {
            Ok(()) => outcome.cache_written = true,
            Err(e) => outcome.cache_error = Some(e.to_string()),
        }

        debug!(
            "💾 Stored {} | graph node: {} | edges: {}/{} | cache: {}",
            outcome.record.address,
            outcome.graph_node_written,
            outcome.edges_written,
            edges.len(),
            outcome.cache_written
        );
        Ok(outcome)
    }

    /// Cache the bounded sample under `wallet_transactions:<address>`
    pub async fn cache_transactions(&self, address: &str, txs: &[TransactionSample]) -> bool {
        self.cache_value(&wallet_transactions_key(address), &txs, WALLET_TRANSACTIONS_TTL)
            .await
            .is_ok()
    }

    /// Serialize and cache any value; failures are logged and counted
    pub async fn cache_value<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> AppResult<()> {
        let result = match serde_json::to_value(value) {
            Ok(json) => self.timed("cache set", self.cache.set_json(key, json, ttl)).await,
            Err(e) => Err(AppError::cache_write(format!("encode {}: {}", key, e))),
        };
        if let Err(ref e) = result {
            warn!("⚠️ Cache write failed for {}: {}", key, e);
            self.telemetry.record_cache_failure();
        }
        result
    }

    /// Append one market history row under the store timeout
    pub async fn append_market_history(&self, row: &MarketHistoryRow) -> AppResult<()> {
        self.timed(
            "market history insert",
            self.relational.insert_market_history(row),
        )
        .await
    }

    async fn timed<T, F>(&self, what: &str, fut: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(AppError::store_timeout(format!(
                "{} exceeded {}ms",
                what,
                self.store_timeout.as_millis()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryGraphStore, SqliteStore};
    use crate::utils::cache::TtlCache;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeSet;

    struct BrokenGraph;

    #[async_trait]
    impl GraphStore for BrokenGraph {
        async fn upsert_node(&self, _node: &GraphWalletNode) -> AppResult<()> {
            Err(AppError::graph_write("connection refused"))
        }
        async fn upsert_edge(&self, _edge: &GraphEdge) -> AppResult<()> {
            Err(AppError::graph_write("connection refused"))
        }
    }

    fn record() -> WalletRecord {
        WalletRecord {
            address: "0x00000000000000000000000000000000000000aa".to_string(),
            balance: "2".to_string(),
            balance_usd: 5000.0,
            transaction_count: 12,
            is_contract: false,
            contract_type: None,
            tags: BTreeSet::new(),
            risk_score: 0,
            first_seen: Some(Utc.timestamp_opt(1_600_000_000, 0).unwrap()),
            last_activity: Some(Utc.timestamp_opt(1_650_000_000, 0).unwrap()),
            updated_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_graph_failure_does_not_fail_item() {
        let cache = TtlCache::new();
        let telemetry = Arc::new(SyncTelemetry::new());
        let writer = MultiStoreWriter::new(
            Arc::new(SqliteStore::open_in_memory().unwrap()),
            Arc::new(BrokenGraph),
            Arc::new(cache.clone()),
            Duration::from_secs(1),
        )
        .with_telemetry(telemetry.clone());

        let outcome = writer.upsert_wallet(&record(), &[]).await.unwrap();
        assert!(!outcome.graph_node_written);
        assert!(outcome.graph_error.is_some());
        assert!(outcome.cache_written);
        assert!(cache.get(&wallet_details_key(&record().address)).is_some());
        assert_eq!(telemetry.get_stats().graph_write_failures, 1);
    }

    #[tokio::test]
    async fn test_cache_blob_matches_stored_row() {
        let cache = TtlCache::new();
        let graph = MemoryGraphStore::new();
        let writer = MultiStoreWriter::new(
            Arc::new(SqliteStore::open_in_memory().unwrap()),
            Arc::new(graph.clone()),
            Arc::new(cache.clone()),
            Duration::from_secs(1),
        );

        let outcome = writer.upsert_wallet(&record(), &[]).await.unwrap();
        let blob = cache.get(&wallet_details_key(&record().address)).unwrap();
        let cached: WalletRecord = serde_json::from_value(blob).unwrap();
        assert_eq!(cached, outcome.record);
        assert_eq!(graph.node(&record().address).unwrap().balance_usd, 5000.0);
    }

    #[tokio::test]
    async fn test_transactions_cached_with_key() {
        let cache = TtlCache::new();
        let writer = MultiStoreWriter::new(
            Arc::new(SqliteStore::open_in_memory().unwrap()),
            Arc::new(MemoryGraphStore::new()),
            Arc::new(cache.clone()),
            Duration::from_secs(1),
        );
        assert!(writer.cache_transactions("0xabc", &[]).await);
        assert_eq!(
            cache.get("wallet_transactions:0xabc"),
            Some(serde_json::json!([]))
        );
    }
}
