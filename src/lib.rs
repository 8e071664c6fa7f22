//! Walletscope Library
//!
//! Ingestion and scoring pipeline for EVM wallets:
//! - Wallet sync: fetch balance, nonce, code and a transaction sample, score
//!   it, write it to a relational store, a graph store and a cache
//! - Market sync: ETH price, gas ladder and network stats with per-source
//!   fallbacks, appended to `market_history`
//! - Popularity ranking over relational state
//!
//! Every outbound provider call goes through a shared per-source rate limiter.

pub mod core;
pub mod models;
pub mod providers;
pub mod storage;
pub mod utils;

pub use crate::core::{
    HeuristicScoring, MarketSyncPipeline, PopularityRanker, ScoringStrategy, StalenessPolicy,
    WalletSyncPipeline,
};
pub use models::{
    AppError, AppResult, ErrorCode, GraphBackend, MarketSnapshot, MarketSyncResult,
    PipelineConfig, PopularWallet, SyncResult, SyncState, WalletDetail, WalletRecord,
};
pub use providers::{
    CoinGeckoClient, EtherscanClient, EvmWalletSource, GasOracle, NetworkStatsSource, PriceSource,
    RpcProvider, WalletDataSource,
};
pub use storage::{
    connect_graph, CacheStore, GraphStore, MemoryGraphStore, MultiStoreWriter, RelationalStore,
    SqliteStore,
};
pub use utils::{RateLimiter, SyncTelemetry, TtlCache};
