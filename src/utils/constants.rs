//! Constants Module - Single Source of Truth
//!
//! Cache keys, TTLs, scoring thresholds and provider defaults used across the
//! pipelines. No other module hardcodes these values.

use std::time::Duration;

// ============================================
// APPLICATION CONSTANTS
// ============================================

/// Application name
pub const APP_NAME: &str = "walletscope";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent for provider HTTP requests
pub const USER_AGENT: &str = concat!("walletscope/", env!("CARGO_PKG_VERSION"));

// ============================================
// CACHE KEYS (read by the query layer)
// ============================================

pub const WALLET_DETAILS_PREFIX: &str = "wallet_details:";
pub const WALLET_TRANSACTIONS_PREFIX: &str = "wallet_transactions:";
pub const POPULAR_WALLETS_KEY: &str = "popular_wallets";
pub const MARKET_LATEST_KEY: &str = "market_data:latest";
pub const MARKET_ETHEREUM_KEY: &str = "market_data:ethereum";
pub const MARKET_GAS_KEY: &str = "market_data:gas_tracker";
pub const MARKET_NETWORK_KEY: &str = "market_data:network_stats";

pub fn wallet_details_key(address: &str) -> String {
    format!("{}{}", WALLET_DETAILS_PREFIX, address)
}

pub fn wallet_transactions_key(address: &str) -> String {
    format!("{}{}", WALLET_TRANSACTIONS_PREFIX, address)
}

// ============================================
// CACHE TTLs
// ============================================

/// Wallet detail blob: outlives the refresh threshold so readers never see a gap
pub const WALLET_DETAILS_TTL: Duration = Duration::from_secs(3 * 60 * 60);
pub const WALLET_TRANSACTIONS_TTL: Duration = Duration::from_secs(10 * 60);
pub const MARKET_SNAPSHOT_TTL: Duration = Duration::from_secs(5 * 60);
pub const GAS_TRACKER_TTL: Duration = Duration::from_secs(10 * 60);
pub const POPULAR_WALLETS_TTL: Duration = Duration::from_secs(6 * 60 * 60);

// ============================================
// WALLET SYNC
// ============================================

pub const DEFAULT_REFRESH_THRESHOLD_HOURS: i64 = 2;
/// Upper bound for REFRESH_THRESHOLD_HOURS (100 years)
pub const MAX_REFRESH_THRESHOLD_HOURS: i64 = 100 * 365 * 24;
pub const DEFAULT_TRANSACTION_SAMPLE_SIZE: usize = 50;
/// Stale rows picked up per scheduled wallet run
pub const STALE_WALLET_BATCH: usize = 500;

// ============================================
// SCORING THRESHOLDS (heuristic, kept verbatim)
// ============================================

/// `high-balance` tag, native units
pub const HIGH_BALANCE_THRESHOLD: f64 = 100.0;
/// `high-activity` tag
pub const HIGH_ACTIVITY_TX_COUNT: u64 = 1000;
/// `hub` tag
pub const HUB_COUNTERPARTY_THRESHOLD: usize = 50;
/// `high-value-txs` tag, native units
pub const HIGH_VALUE_TX_THRESHOLD: f64 = 10.0;

pub const RISK_VERY_HIGH_TX_COUNT: u64 = 10_000;
pub const RISK_VERY_HIGH_TX_PENALTY: i32 = 20;
pub const RISK_NEW_WALLET_DAYS: i64 = 7;
pub const RISK_NEW_WALLET_MIN_TX: u64 = 100;
pub const RISK_NEW_HYPERACTIVE_PENALTY: i32 = 30;
pub const RISK_CONTRACT_CREDIT: i32 = -10;

// ============================================
// POPULARITY
// ============================================

pub const POPULAR_MIN_TX_COUNT: u64 = 100;
pub const POPULAR_ACTIVE_WINDOW_DAYS: i64 = 30;
pub const POPULAR_LIMIT: usize = 100;

// ============================================
// MARKET DEFAULTS
// ============================================

/// Gas fallback ladder in gwei: slow, standard, fast, instant
pub const DEFAULT_GAS_LADDER: [f64; 4] = [20.0, 25.0, 30.0, 35.0];
/// Estimated block time used when network stats are unavailable
pub const DEFAULT_BLOCK_TIME_SECS: f64 = 12.0;
pub const COINGECKO_ETHEREUM_ID: &str = "ethereum";

// ============================================
// PROVIDERS
// ============================================

pub const DEFAULT_RPC_URL: &str = "https://ethereum-rpc.publicnode.com";
pub const DEFAULT_ETHERSCAN_URL: &str = "https://api.etherscan.io/api";
pub const DEFAULT_COINGECKO_URL: &str = "https://api.coingecko.com/api/v3";

/// Rate-limiter source keys
pub const SOURCE_RPC: &str = "rpc";
pub const SOURCE_ETHERSCAN: &str = "etherscan";
pub const SOURCE_COINGECKO: &str = "coingecko";

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// 1 ether = 10^18 wei
pub const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;
pub const WEI_PER_GWEI: f64 = 1e9;

/// Convert a decimal wei string to an exact decimal ether string.
///
/// Trailing zeros of the fractional part are trimmed; "0" stays "0".
pub fn wei_to_ether_string(wei: &str) -> Option<String> {
    let wei: u128 = wei.trim().parse().ok()?;
    let whole = wei / WEI_PER_ETHER;
    let frac = wei % WEI_PER_ETHER;
    if frac == 0 {
        return Some(whole.to_string());
    }
    let frac = format!("{:018}", frac);
    Some(format!("{}.{}", whole, frac.trim_end_matches('0')))
}

/// Lossy wei → ether for scoring arithmetic
pub fn wei_to_ether(wei: u128) -> f64 {
    wei as f64 / WEI_PER_ETHER as f64
}
