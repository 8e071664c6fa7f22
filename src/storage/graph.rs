//! Graph store bindings
//!
//! Nodes are keyed by wallet address and edges by (source, target), so a
//! repeated write replaces instead of duplicating.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

use crate::models::config::GraphBackend;
use crate::models::errors::{AppError, AppResult};
use crate::models::types::{GraphEdge, GraphWalletNode};
use crate::storage::GraphStore;

/// Build the configured graph binding; fails instead of handing back a dead store
pub async fn connect_graph(backend: &GraphBackend) -> AppResult<Arc<dyn GraphStore>> {
    match backend {
        GraphBackend::Memory => {
            info!("🕸️ Graph store: in-memory");
            Ok(Arc::new(MemoryGraphStore::new()))
        }
        #[cfg(feature = "neo4j")]
        GraphBackend::Neo4j {
            uri,
            user,
            password,
        } => {
            let store = neo4j::Neo4jGraphStore::connect(uri, user, password).await?;
            info!("🕸️ Graph store: neo4j at {}", uri);
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "neo4j"))]
        GraphBackend::Neo4j { .. } => Err(AppError::store_unavailable(
            "GRAPH_BACKEND=neo4j but this build lacks the `neo4j` feature",
        )),
    }
}

/// Process-local graph. Read accessors exist for tests and diagnostics only.
#[derive(Clone, Default)]
pub struct MemoryGraphStore {
    nodes: Arc<DashMap<String, GraphWalletNode>>,
    edges: Arc<DashMap<(String, String), GraphEdge>>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, address: &str) -> Option<GraphWalletNode> {
        self.nodes.get(address).map(|n| n.clone())
    }

    pub fn edge(&self, source: &str, target: &str) -> Option<GraphEdge> {
        self.edges
            .get(&(source.to_string(), target.to_string()))
            .map(|e| e.clone())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn upsert_node(&self, node: &GraphWalletNode) -> AppResult<()> {
        self.nodes.insert(node.address.clone(), node.clone());
        Ok(())
    }

    async fn upsert_edge(&self, edge: &GraphEdge) -> AppResult<()> {
        if edge.source == edge.target {
            return Err(AppError::graph_write(format!(
                "self edge rejected for {}",
                edge.source
            )));
        }
        self.edges
            .insert((edge.source.clone(), edge.target.clone()), edge.clone());
        Ok(())
    }
}

#[cfg(feature = "neo4j")]
pub mod neo4j {
    use super::*;
    use neo4rs::{query, Graph};

    /// Neo4j over Bolt. `MERGE` on `Wallet.address` keeps nodes unique.
    pub struct Neo4jGraphStore {
        graph: Arc<Graph>,
    }

    impl Neo4jGraphStore {
        pub async fn connect(uri: &str, user: &str, password: &str) -> AppResult<Self> {
            let graph = Graph::new(uri, user, password).await.map_err(|e| {
                AppError::store_unavailable(format!("neo4j connect to {} failed: {}", uri, e))
            })?;
            graph
                .run(query(
                    "CREATE CONSTRAINT wallet_address IF NOT EXISTS \
                     FOR (w:Wallet) REQUIRE w.address IS UNIQUE",
                ))
                .await
                .map_err(|e| AppError::store_unavailable(format!("neo4j constraint setup: {}", e)))?;
            Ok(Self {
                graph: Arc::new(graph),
            })
        }
    }

    #[async_trait]
    impl GraphStore for Neo4jGraphStore {
        async fn upsert_node(&self, node: &GraphWalletNode) -> AppResult<()> {
            let q = query(
                "MERGE (w:Wallet {address: $address})
                 SET w.balance = $balance,
                     w.balanceUSD = $balance_usd,
                     w.transactionCount = $transaction_count,
                     w.isContract = $is_contract,
                     w.riskScore = $risk_score,
                     w.tags = $tags,
                     w.updatedAt = $updated_at",
            )
            .param("address", node.address.clone())
            .param("balance", node.balance.clone())
            .param("balance_usd", node.balance_usd)
            .param("transaction_count", node.transaction_count as i64)
            .param("is_contract", node.is_contract)
            .param("risk_score", node.risk_score as i64)
            .param("tags", node.tags.iter().cloned().collect::<Vec<String>>())
            .param("updated_at", node.updated_at.timestamp_millis());

            self.graph
                .run(q)
                .await
                .map_err(|e| AppError::graph_write(format!("node {}: {}", node.address, e)))
        }

        async fn upsert_edge(&self, edge: &GraphEdge) -> AppResult<()> {
            let q = query(
                "MERGE (s:Wallet {address: $source})
                 MERGE (t:Wallet {address: $target})
                 MERGE (s)-[r:TRANSACTED_WITH]->(t)
                 SET r.strength = $strength,
                     r.transactionCount = $transaction_count,
                     r.totalValue = $total_value,
                     r.firstInteraction = $first_interaction,
                     r.lastInteraction = $last_interaction",
            )
            .param("source", edge.source.clone())
            .param("target", edge.target.clone())
            .param("strength", edge.strength)
            .param("transaction_count", edge.transaction_count as i64)
            .param("total_value", edge.total_value)
            .param("first_interaction", edge.first_interaction.timestamp_millis())
            .param("last_interaction", edge.last_interaction.timestamp_millis());

            self.graph.run(q).await.map_err(|e| {
                AppError::graph_write(format!("edge {} -> {}: {}", edge.source, edge.target, e))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn node(address: &str, risk: u8) -> GraphWalletNode {
        GraphWalletNode {
            address: address.to_string(),
            balance: "0".to_string(),
            balance_usd: 0.0,
            transaction_count: 1,
            is_contract: false,
            risk_score: risk,
            tags: BTreeSet::new(),
            updated_at: Utc::now(),
        }
    }

    fn edge(source: &str, target: &str, count: u64) -> GraphEdge {
        let now = Utc::now();
        GraphEdge {
            source: source.to_string(),
            target: target.to_string(),
            strength: 1.0,
            transaction_count: count,
            total_value: 1.0,
            first_interaction: now,
            last_interaction: now,
        }
    }

    #[tokio::test]
    async fn test_node_upsert_never_duplicates() {
        let store = MemoryGraphStore::new();
        store.upsert_node(&node("0xa", 10)).await.unwrap();
        store.upsert_node(&node("0xa", 40)).await.unwrap();
        assert_eq!(store.node_count(), 1);
        assert_eq!(store.node("0xa").unwrap().risk_score, 40);
    }

    #[tokio::test]
    async fn test_edge_keyed_by_endpoints() {
        let store = MemoryGraphStore::new();
        store.upsert_edge(&edge("0xa", "0xb", 1)).await.unwrap();
        store.upsert_edge(&edge("0xa", "0xb", 3)).await.unwrap();
        store.upsert_edge(&edge("0xb", "0xa", 1)).await.unwrap();
        assert_eq!(store.edge_count(), 2);
        assert_eq!(store.edge("0xa", "0xb").unwrap().transaction_count, 3);
    }

    #[tokio::test]
    async fn test_self_edge_rejected() {
        let store = MemoryGraphStore::new();
        assert!(store.upsert_edge(&edge("0xa", "0xa", 1)).await.is_err());
    }

    #[tokio::test]
    async fn test_connect_memory_backend() {
        assert!(connect_graph(&GraphBackend::Memory).await.is_ok());
    }

    #[cfg(not(feature = "neo4j"))]
    #[tokio::test]
    async fn test_neo4j_without_feature_fails_loudly() {
        let backend = GraphBackend::Neo4j {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "secret".to_string(),
        };
        let err = connect_graph(&backend).await.err().unwrap();
        assert_eq!(err.code, crate::models::errors::ErrorCode::ConfigStoreUnavailable);
    }
}
