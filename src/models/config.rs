//! Configuration module for the wallet pipelines
//!
//! Uses constants from utils/constants.rs; every knob can be overridden from
//! the environment. `Default` never fails (unset or unparsable variables fall
//! back to constants), `from_env` is the strict loader used by the binary.

use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::models::errors::{AppError, AppResult};
use crate::utils::constants::{
    DEFAULT_COINGECKO_URL, DEFAULT_ETHERSCAN_URL, DEFAULT_REFRESH_THRESHOLD_HOURS,
    DEFAULT_RPC_URL, DEFAULT_TRANSACTION_SAMPLE_SIZE, MAX_REFRESH_THRESHOLD_HOURS,
    SOURCE_COINGECKO, SOURCE_ETHERSCAN, SOURCE_RPC,
};

/// Graph store binding. Either a working backend or a construction error,
/// never an absent store discovered on first write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphBackend {
    /// Process-local graph (tests, single-node deployments)
    Memory,
    /// Neo4j over Bolt (`neo4j` feature)
    Neo4j {
        uri: String,
        user: String,
        password: String,
    },
}

impl GraphBackend {
    pub fn name(&self) -> &'static str {
        match self {
            GraphBackend::Memory => "memory",
            GraphBackend::Neo4j { .. } => "neo4j",
        }
    }

    fn from_env_strict() -> AppResult<Self> {
        match env_string("GRAPH_BACKEND").as_deref() {
            None | Some("memory") => Ok(GraphBackend::Memory),
            Some("neo4j") => Ok(GraphBackend::Neo4j {
                uri: env_string("NEO4J_URI").ok_or_else(|| AppError::missing_env("NEO4J_URI"))?,
                user: env_string("NEO4J_USER").unwrap_or_else(|| "neo4j".to_string()),
                password: env_string("NEO4J_PASSWORD")
                    .ok_or_else(|| AppError::missing_env("NEO4J_PASSWORD"))?,
            }),
            Some(other) => Err(AppError::invalid_config(format!(
                "GRAPH_BACKEND must be memory or neo4j, got {}",
                other
            ))),
        }
    }
}

/// Provider endpoints and credentials
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// JSON-RPC endpoint (balances, nonce, code, blocks)
    pub rpc_url: String,
    /// Etherscan-compatible API (tx history, gas oracle)
    pub etherscan_url: String,
    pub etherscan_api_key: Option<String>,
    pub coingecko_url: String,
    pub coingecko_api_key: Option<String>,
    /// Minimum spacing between calls per source
    pub rpc_min_interval: Duration,
    pub etherscan_min_interval: Duration,
    pub coingecko_min_interval: Duration,
}

impl ProviderConfig {
    /// (source key, interval) pairs for RateLimiter registration
    pub fn rate_limits(&self) -> [(&'static str, Duration); 3] {
        [
            (SOURCE_RPC, self.rpc_min_interval),
            (SOURCE_ETHERSCAN, self.etherscan_min_interval),
            (SOURCE_COINGECKO, self.coingecko_min_interval),
        ]
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            rpc_url: env_string("ETH_RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.to_string()),
            etherscan_url: env_string("ETHERSCAN_URL")
                .unwrap_or_else(|| DEFAULT_ETHERSCAN_URL.to_string()),
            etherscan_api_key: env_string("ETHERSCAN_API_KEY"),
            coingecko_url: env_string("COINGECKO_URL")
                .unwrap_or_else(|| DEFAULT_COINGECKO_URL.to_string()),
            coingecko_api_key: env_string("COINGECKO_API_KEY"),
            // Etherscan free tier: 5 calls/s; CoinGecko demo: ~30 calls/min
            rpc_min_interval: env_millis("RPC_MIN_INTERVAL_MS", 50),
            etherscan_min_interval: env_millis("ETHERSCAN_MIN_INTERVAL_MS", 250),
            coingecko_min_interval: env_millis("COINGECKO_MIN_INTERVAL_MS", 2_000),
        }
    }
}

/// Configuration for the wallet/market/popularity pipelines
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub providers: ProviderConfig,
    /// SQLite database path (":memory:" allowed)
    pub database_path: String,
    pub graph_backend: GraphBackend,
    /// Wallets older than this are re-fetched
    pub refresh_threshold_hours: i64,
    /// Bounded transaction sample per crawl
    pub transaction_sample_size: usize,
    /// Worker pool size for batch syncs
    pub max_concurrent_syncs: usize,
    /// Timeout for each external call
    pub fetch_timeout: Duration,
    /// Timeout for each store write/read
    pub store_timeout: Duration,
    /// Scheduler cadences
    pub wallet_sync_interval: Duration,
    pub market_sync_interval: Duration,
    pub popularity_interval: Duration,
    /// Addresses crawled on every wallet run
    pub seed_wallets: Vec<String>,
    /// Max counterparties carried into the next wallet run
    pub discovery_queue_limit: usize,
    /// Consecutive relational failures before the scheduler gives up
    pub max_consecutive_store_failures: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            providers: ProviderConfig::default(),
            database_path: env_string("DATABASE_PATH")
                .unwrap_or_else(|| "walletscope.db".to_string()),
            graph_backend: GraphBackend::from_env_strict().unwrap_or(GraphBackend::Memory),
            refresh_threshold_hours: env_parse(
                "REFRESH_THRESHOLD_HOURS",
                DEFAULT_REFRESH_THRESHOLD_HOURS,
            ),
            transaction_sample_size: env_parse(
                "TRANSACTION_SAMPLE_SIZE",
                DEFAULT_TRANSACTION_SAMPLE_SIZE,
            ),
            max_concurrent_syncs: env_parse("MAX_CONCURRENT_SYNCS", 4),
            fetch_timeout: env_millis("FETCH_TIMEOUT_MS", 15_000),
            store_timeout: env_millis("STORE_TIMEOUT_MS", 5_000),
            wallet_sync_interval: env_secs("WALLET_SYNC_INTERVAL_SECS", 15 * 60),
            market_sync_interval: env_secs("MARKET_SYNC_INTERVAL_SECS", 60),
            popularity_interval: env_secs("POPULARITY_INTERVAL_SECS", 60 * 60),
            seed_wallets: env_string("SEED_WALLETS")
                .map(|s| {
                    s.split(',')
                        .map(|a| a.trim().to_string())
                        .filter(|a| !a.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            discovery_queue_limit: env_parse("DISCOVERY_QUEUE_LIMIT", 200),
            max_consecutive_store_failures: env_parse("MAX_CONSECUTIVE_STORE_FAILURES", 5),
        }
    }
}

impl PipelineConfig {
    /// Strict loader: the graph backend must resolve and numeric knobs must be sane
    pub fn from_env() -> AppResult<Self> {
        let config = Self {
            graph_backend: GraphBackend::from_env_strict()?,
            ..Self::default()
        };
        config.validate()?;
        info!(
            "⚙️ Config loaded | db: {} | graph: {} | workers: {} | refresh: {}h",
            config.database_path,
            config.graph_backend.name(),
            config.max_concurrent_syncs,
            config.refresh_threshold_hours
        );
        if config.providers.etherscan_api_key.is_some() {
            info!("🔑 ETHERSCAN_API_KEY configured (key hidden)");
        }
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.max_concurrent_syncs == 0 {
            return Err(AppError::invalid_config("MAX_CONCURRENT_SYNCS must be >= 1"));
        }
        if self.transaction_sample_size == 0 {
            return Err(AppError::invalid_config("TRANSACTION_SAMPLE_SIZE must be >= 1"));
        }
        if !(0..=MAX_REFRESH_THRESHOLD_HOURS).contains(&self.refresh_threshold_hours) {
            return Err(AppError::invalid_config(format!(
                "REFRESH_THRESHOLD_HOURS must be within 0..={}",
                MAX_REFRESH_THRESHOLD_HOURS
            )));
        }
        for (key, value) in [
            ("WALLET_SYNC_INTERVAL_SECS", self.wallet_sync_interval),
            ("MARKET_SYNC_INTERVAL_SECS", self.market_sync_interval),
            ("POPULARITY_INTERVAL_SECS", self.popularity_interval),
        ] {
            if value.is_zero() {
                return Err(AppError::invalid_config(format!("{} must be >= 1", key)));
            }
        }
        if self.database_path.is_empty() {
            return Err(AppError::invalid_config("DATABASE_PATH must not be empty"));
        }
        Ok(())
    }

    pub fn refresh_threshold(&self) -> chrono::Duration {
        chrono::Duration::hours(
            self.refresh_threshold_hours
                .clamp(0, MAX_REFRESH_THRESHOLD_HOURS),
        )
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env_string(key)
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_millis(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_parse(key, default_ms))
}

fn env_secs(key: &str, default_secs: u64) -> Duration {
    Duration::from_secs(env_parse(key, default_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig {
            graph_backend: GraphBackend::Memory,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_ok());
        assert!(config.transaction_sample_size > 0);
    }

    #[test]
    fn test_rejects_zero_workers() {
        let config = PipelineConfig {
            max_concurrent_syncs: 0,
            ..PipelineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.code, crate::models::errors::ErrorCode::ConfigInvalidValue);
    }

    #[test]
    fn test_rejects_zero_scheduler_interval() {
        let config = PipelineConfig {
            market_sync_interval: Duration::ZERO,
            ..PipelineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.code, crate::models::errors::ErrorCode::ConfigInvalidValue);
        assert!(err.to_string().contains("MARKET_SYNC_INTERVAL_SECS"));
    }

    #[test]
    fn test_rejects_out_of_range_refresh_threshold() {
        for hours in [-1, MAX_REFRESH_THRESHOLD_HOURS + 1, i64::MAX] {
            let config = PipelineConfig {
                refresh_threshold_hours: hours,
                ..PipelineConfig::default()
            };
            let err = config.validate().unwrap_err();
            assert_eq!(err.code, crate::models::errors::ErrorCode::ConfigInvalidValue);
            // still safe to call on an unvalidated config
            let _ = config.refresh_threshold();
        }
    }

    #[test]
    fn test_rate_limits_cover_every_source() {
        let providers = ProviderConfig::default();
        let keys: Vec<_> = providers.rate_limits().iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![SOURCE_RPC, SOURCE_ETHERSCAN, SOURCE_COINGECKO]);
    }

    #[test]
    fn test_refresh_threshold_duration() {
        let config = PipelineConfig {
            refresh_threshold_hours: 2,
            ..PipelineConfig::default()
        };
        assert_eq!(config.refresh_threshold(), chrono::Duration::hours(2));
    }
}
