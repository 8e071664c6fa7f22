//! Providers Module - External Data Sources
//!
//! Each concern sits behind its own trait so pipelines can be driven by
//! mock sources in tests and any adapter can fail independently.

pub mod coingecko;
pub mod etherscan;
pub mod http;
pub mod rpc;
pub mod wallet;

pub use coingecko::*;
pub use etherscan::*;
pub use rpc::*;
pub use wallet::*;

use async_trait::async_trait;

use crate::models::errors::AppResult;
use crate::models::types::{EthereumMarket, GasTracker, NetworkStats, WalletDetail};

/// Balance, contract flag and a bounded transaction sample for one wallet
#[async_trait]
pub trait WalletDataSource: Send + Sync {
    /// `address` is already normalized
    async fn fetch_wallet(&self, address: &str, sample_size: usize) -> AppResult<WalletDetail>;
}

/// USD market data for a coin id
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_market(&self, coin_id: &str) -> AppResult<EthereumMarket>;
}

/// Four gas tiers in gwei
#[async_trait]
pub trait GasOracle: Send + Sync {
    async fn fetch_gas(&self) -> AppResult<GasTracker>;
}

#[async_trait]
pub trait NetworkStatsSource: Send + Sync {
    async fn fetch_network_stats(&self) -> AppResult<NetworkStats>;
}
