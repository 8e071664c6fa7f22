//! RPC Client Module - Ethereum JSON-RPC
//!
//! Balance, nonce, bytecode and block headers. Calls are retried with
//! exponential backoff and jitter and spaced by the shared RateLimiter under
//! the `rpc` key.

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::models::errors::{AppError, AppResult};
use crate::models::types::NetworkStats;
use crate::providers::http::{build_client, parse_hex_u128, parse_hex_u64, HttpSource, RetryPolicy};
use crate::providers::NetworkStatsSource;
use crate::utils::constants::{DEFAULT_BLOCK_TIME_SECS, SOURCE_RPC};
use crate::utils::rate_limiter::RateLimiter;

/// JSON-RPC response structure
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

/// JSON-RPC error structure
#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    /// Rate limit error (HTTP 429 mapped to -32005 by most gateways)
    pub fn is_rate_limit(&self) -> bool {
        self.code == -32005 || self.message.to_lowercase().contains("rate limit")
    }

    fn into_app_error(self) -> AppError {
        if self.is_rate_limit() {
            AppError::rate_limited(SOURCE_RPC)
        } else {
            AppError::external(format!("RPC error: {} (code: {})", self.message, self.code))
        }
    }
}

/// Block header fields used for network stats
#[derive(Debug, Clone, Deserialize)]
pub struct RpcBlock {
    pub number: String,
    pub timestamp: String,
    #[serde(default)]
    pub difficulty: Option<String>,
}

impl RpcBlock {
    pub fn number(&self) -> AppResult<u64> {
        parse_hex_u64(&self.number)
    }

    pub fn timestamp(&self) -> AppResult<u64> {
        parse_hex_u64(&self.timestamp)
    }

    /// Zero after the merge
    pub fn difficulty(&self) -> AppResult<f64> {
        match self.difficulty.as_deref() {
            Some(raw) => Ok(parse_hex_u128(raw)? as f64),
            None => Ok(0.0),
        }
    }
}

/// RPC Provider with retry logic
#[derive(Clone)]
pub struct RpcProvider {
    url: String,
    http: HttpSource,
}

impl RpcProvider {
    pub fn new(url: &str, limiter: Arc<RateLimiter>, timeout: Duration) -> AppResult<Self> {
        if url.is_empty() {
            return Err(AppError::missing_env("ETH_RPC_URL"));
        }
        let client = build_client(timeout)?;
        let provider = Self {
            url: url.to_string(),
            http: HttpSource::new(client, SOURCE_RPC, limiter, RetryPolicy::default()),
        };
        info!("✅ Initialized RPC ({})", provider.masked_url());
        Ok(provider)
    }

    /// Execute JSON-RPC call with retry logic
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> AppResult<T> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        self.http
            .with_retry(method, || async {
                let response: RpcResponse<T> = self
                    .http
                    .send_json(self.http.client.post(&self.url).json(&payload))
                    .await?;
                if let Some(error) = response.error {
                    return Err(error.into_app_error());
                }
                response
                    .result
                    .ok_or_else(|| AppError::invalid_response(format!("{}: no result", method)))
            })
            .await
    }

    /// Balance in wei
    pub async fn get_balance(&self, address: &str) -> AppResult<u128> {
        let raw: String = self
            .call("eth_getBalance", serde_json::json!([address, "latest"]))
            .await?;
        parse_hex_u128(&raw)
    }

    /// Outgoing transaction count (nonce)
    pub async fn get_transaction_count(&self, address: &str) -> AppResult<u64> {
        let raw: String = self
            .call("eth_getTransactionCount", serde_json::json!([address, "latest"]))
            .await?;
        parse_hex_u64(&raw)
    }

    /// Get bytecode; "0x" for externally owned accounts
    pub async fn get_code(&self, address: &str) -> AppResult<String> {
        self.call("eth_getCode", serde_json::json!([address, "latest"]))
            .await
    }

    /// Block header by tag ("latest") or hex number
    pub async fn get_block(&self, block: &str) -> AppResult<RpcBlock> {
        self.call("eth_getBlockByNumber", serde_json::json!([block, false]))
            .await
    }

    /// Get RPC URL (API key masked for logging)
    pub fn masked_url(&self) -> String {
        for marker in ["/v2/", "/v3/"] {
            if let Some((head, _)) = self.url.split_once(marker) {
                return format!("{}{}***HIDDEN***", head, marker);
            }
        }
        self.url.clone()
    }
}

/// Block time and hash rate from the two most recent headers
pub fn network_stats_from_blocks(latest: &RpcBlock, parent: &RpcBlock) -> AppResult<NetworkStats> {
    let block_number = latest.number()?;
    let elapsed = latest.timestamp()?.saturating_sub(parent.timestamp()?);
    let block_time = if elapsed == 0 {
        DEFAULT_BLOCK_TIME_SECS
    } else {
        elapsed as f64
    };
    let difficulty = latest.difficulty()?;

    Ok(NetworkStats {
        block_number,
        block_time,
        difficulty,
        hash_rate: difficulty / block_time,
        last_updated: Utc::now(),
    })
}

#[async_trait]
impl NetworkStatsSource for RpcProvider {
    async fn fetch_network_stats(&self) -> AppResult<NetworkStats> {
        let latest = self.get_block("latest").await?;
        let number = latest.number()?;
        let parent = self
            .get_block(&format!("0x{:x}", number.saturating_sub(1)))
            .await?;
        let stats = network_stats_from_blocks(&latest, &parent)?;
        debug!(
            "⛓️ Block {} | block time {}s",
            stats.block_number, stats.block_time
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::errors::ErrorCode;

    fn block(number: &str, timestamp: &str, difficulty: Option<&str>) -> RpcBlock {
        RpcBlock {
            number: number.to_string(),
            timestamp: timestamp.to_string(),
            difficulty: difficulty.map(String::from),
        }
    }

    #[test]
    fn test_rpc_error_classification() {
        let rate_limit = RpcError {
            code: -32005,
            message: "Rate limit exceeded".to_string(),
        };
        assert!(rate_limit.is_rate_limit());
        assert_eq!(
            rate_limit.into_app_error().code,
            ErrorCode::ExternalRateLimited
        );

        let other = RpcError {
            code: -32601,
            message: "Method not found".to_string(),
        };
        assert_eq!(other.into_app_error().code, ErrorCode::ExternalHttpError);
    }

    #[test]
    fn test_network_stats_from_blocks() {
        let latest = block("0x1312d00", "0x65a0000c", Some("0x0"));
        let parent = block("0x1312cff", "0x65a00000", Some("0x0"));
        let stats = network_stats_from_blocks(&latest, &parent).unwrap();
        assert_eq!(stats.block_number, 20_000_000);
        assert_eq!(stats.block_time, 12.0);
        assert_eq!(stats.difficulty, 0.0);
        assert_eq!(stats.hash_rate, 0.0);
    }

    #[test]
    fn test_same_timestamp_uses_nominal_block_time() {
        let latest = block("0x2", "0x10", Some("0x64"));
        let parent = block("0x1", "0x10", None);
        let stats = network_stats_from_blocks(&latest, &parent).unwrap();
        assert_eq!(stats.block_time, DEFAULT_BLOCK_TIME_SECS);
        assert!((stats.hash_rate - 100.0 / DEFAULT_BLOCK_TIME_SECS).abs() < 1e-9);
    }

    #[test]
    fn test_masked_url() {
        let provider = RpcProvider::new(
            "https://eth-mainnet.g.alchemy.com/v2/secret",
            Arc::new(RateLimiter::new()),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            provider.masked_url(),
            "https://eth-mainnet.g.alchemy.com/v2/***HIDDEN***"
        );
    }

    #[test]
    fn test_empty_url_rejected() {
        let err = RpcProvider::new("", Arc::new(RateLimiter::new()), Duration::from_secs(5))
            .err()
            .unwrap();
        assert_eq!(err.code, ErrorCode::ConfigMissingEnv);
    }
}
