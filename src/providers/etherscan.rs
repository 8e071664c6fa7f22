//! Etherscan-compatible API client
//!
//! `account/txlist` for the bounded transaction sample and
//! `gastracker/gasoracle` for the gas ladder. Both share the `etherscan`
//! rate-limit key.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::models::errors::{AppError, AppResult};
use crate::models::types::{GasTracker, TransactionSample};
use crate::providers::http::{build_client, HttpSource, RetryPolicy};
use crate::providers::GasOracle;
use crate::utils::address::try_normalize;
use crate::utils::constants::{wei_to_ether, SOURCE_ETHERSCAN};
use crate::utils::rate_limiter::RateLimiter;

/// Instant tier is not published by the oracle; derived from the fast tier
pub const INSTANT_GAS_MULTIPLIER: f64 = 1.2;

/// Envelope shared by every Etherscan endpoint. On failure `result` is a
/// plain string ("Max rate limit reached", "Invalid API Key", ...).
#[derive(Debug, Deserialize)]
struct EtherscanEnvelope {
    status: String,
    message: String,
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct EtherscanTx {
    hash: String,
    from: String,
    #[serde(default)]
    to: String,
    value: String,
    #[serde(rename = "timeStamp")]
    time_stamp: String,
    #[serde(rename = "blockNumber")]
    block_number: String,
}

#[derive(Debug, Deserialize)]
struct EtherscanGasOracleResult {
    #[serde(rename = "SafeGasPrice")]
    safe_gas_price: String,
    #[serde(rename = "ProposeGasPrice")]
    propose_gas_price: String,
    #[serde(rename = "FastGasPrice")]
    fast_gas_price: String,
}

#[derive(Clone)]
pub struct EtherscanClient {
    base_url: String,
    api_key: Option<String>,
    http: HttpSource,
}

impl EtherscanClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        limiter: Arc<RateLimiter>,
        timeout: Duration,
    ) -> AppResult<Self> {
        let client = build_client(timeout)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            http: HttpSource::new(client, SOURCE_ETHERSCAN, limiter, RetryPolicy::default()),
        })
    }

    async fn get(&self, what: &str, params: &[(&str, String)]) -> AppResult<serde_json::Value> {
        let mut query: Vec<(&str, String)> = params.to_vec();
        if let Some(key) = &self.api_key {
            query.push(("apikey", key.clone()));
        }

        self.http
            .with_retry(what, || async {
                let envelope: EtherscanEnvelope = self
                    .http
                    .send_json(self.http.client.get(&self.base_url).query(&query))
                    .await?;
                unwrap_envelope(envelope)
            })
            .await
    }

    /// Most recent `sample_size` normal transactions, newest first
    pub async fn fetch_transactions(
        &self,
        address: &str,
        sample_size: usize,
    ) -> AppResult<Vec<TransactionSample>> {
        let result = self
            .get(
                "txlist",
                &[
                    ("module", "account".to_string()),
                    ("action", "txlist".to_string()),
                    ("address", address.to_string()),
                    ("startblock", "0".to_string()),
                    ("endblock", "99999999".to_string()),
                    ("page", "1".to_string()),
                    ("offset", sample_size.to_string()),
                    ("sort", "desc".to_string()),
                ],
            )
            .await?;

        let raw: Vec<EtherscanTx> = serde_json::from_value(result)?;
        let mut samples = raw
            .into_iter()
            .map(to_sample)
            .collect::<AppResult<Vec<_>>>()?;
        samples.truncate(sample_size);
        debug!("📜 {} transactions sampled for {}", samples.len(), address);
        Ok(samples)
    }
}

#[async_trait]
impl GasOracle for EtherscanClient {
    async fn fetch_gas(&self) -> AppResult<GasTracker> {
        let result = self
            .get(
                "gasoracle",
                &[
                    ("module", "gastracker".to_string()),
                    ("action", "gasoracle".to_string()),
                ],
            )
            .await?;
        let oracle: EtherscanGasOracleResult = serde_json::from_value(result)?;
        gas_tracker_from_oracle(&oracle)
    }
}

fn unwrap_envelope(envelope: EtherscanEnvelope) -> AppResult<serde_json::Value> {
    if envelope.status == "1" {
        return Ok(envelope.result);
    }
    // Empty history is reported as an error status
    if envelope.message.starts_with("No transactions found") {
        return Ok(serde_json::Value::Array(Vec::new()));
    }

    let detail = envelope
        .result
        .as_str()
        .map(String::from)
        .unwrap_or_else(|| envelope.result.to_string());
    if detail.to_lowercase().contains("rate limit") {
        Err(AppError::rate_limited(SOURCE_ETHERSCAN))
    } else {
        Err(AppError::external(format!(
            "etherscan: {} ({})",
            envelope.message, detail
        )))
    }
}

fn to_sample(tx: EtherscanTx) -> AppResult<TransactionSample> {
    let wei: u128 = tx
        .value
        .parse()
        .map_err(|_| AppError::invalid_response(format!("bad tx value {:?}", tx.value)))?;
    let timestamp: i64 = tx
        .time_stamp
        .parse()
        .map_err(|_| AppError::invalid_response(format!("bad timeStamp {:?}", tx.time_stamp)))?;
    let block_number: u64 = tx.block_number.parse().map_err(|_| {
        AppError::invalid_response(format!("bad blockNumber {:?}", tx.block_number))
    })?;

    Ok(TransactionSample {
        hash: tx.hash,
        from: try_normalize(&tx.from).unwrap_or(tx.from),
        // Contract creations have an empty `to`
        to: try_normalize(&tx.to).unwrap_or_default(),
        value: wei_to_ether(wei),
        timestamp,
        block_number,
    })
}

fn gas_tracker_from_oracle(oracle: &EtherscanGasOracleResult) -> AppResult<GasTracker> {
    let parse = |field: &str, raw: &str| -> AppResult<f64> {
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .ok_or_else(|| AppError::invalid_response(format!("invalid {} {:?}", field, raw)))
    };
    let slow = parse("SafeGasPrice", &oracle.safe_gas_price)?;
    let standard = parse("ProposeGasPrice", &oracle.propose_gas_price)?;
    let fast = parse("FastGasPrice", &oracle.fast_gas_price)?;

    Ok(GasTracker {
        slow,
        standard,
        fast,
        instant: fast * INSTANT_GAS_MULTIPLIER,
        last_updated: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::errors::ErrorCode;
    use serde_json::json;

    fn envelope(value: serde_json::Value) -> EtherscanEnvelope {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_txlist_parsing() {
        let result = unwrap_envelope(envelope(json!({
            "status": "1",
            "message": "OK",
            "result": [{
                "hash": "0x01",
                "from": "0xDAC17F958D2EE523A2206206994597C13D831EC7",
                "to": "",
                "value": "1500000000000000000",
                "timeStamp": "1700000000",
                "blockNumber": "18500000"
            }]
        })))
        .unwrap();
        let raw: Vec<EtherscanTx> = serde_json::from_value(result).unwrap();
        let sample = to_sample(raw.into_iter().next().unwrap()).unwrap();

        assert_eq!(sample.from, "0xdac17f958d2ee523a2206206994597c13d831ec7");
        assert_eq!(sample.to, "");
        assert!((sample.value - 1.5).abs() < 1e-12);
        assert_eq!(sample.timestamp, 1_700_000_000);
        assert_eq!(sample.block_number, 18_500_000);
    }

    #[test]
    fn test_no_transactions_is_empty_not_error() {
        let result = unwrap_envelope(envelope(json!({
            "status": "0",
            "message": "No transactions found",
            "result": []
        })))
        .unwrap();
        assert_eq!(result, json!([]));
    }

    #[test]
    fn test_rate_limit_status_is_classified() {
        let err = unwrap_envelope(envelope(json!({
            "status": "0",
            "message": "NOTOK",
            "result": "Max rate limit reached"
        })))
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::ExternalRateLimited);

        let err = unwrap_envelope(envelope(json!({
            "status": "0",
            "message": "NOTOK",
            "result": "Invalid API Key"
        })))
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::ExternalHttpError);
    }

    #[test]
    fn test_gas_oracle_tiers() {
        let oracle = EtherscanGasOracleResult {
            safe_gas_price: "12".to_string(),
            propose_gas_price: "14.5".to_string(),
            fast_gas_price: "20".to_string(),
        };
        let gas = gas_tracker_from_oracle(&oracle).unwrap();
        assert_eq!(gas.slow, 12.0);
        assert_eq!(gas.standard, 14.5);
        assert_eq!(gas.fast, 20.0);
        assert!((gas.instant - 24.0).abs() < 1e-9);
    }

    #[test]
    fn test_gas_oracle_rejects_garbage() {
        let oracle = EtherscanGasOracleResult {
            safe_gas_price: "NaN".to_string(),
            propose_gas_price: "1".to_string(),
            fast_gas_price: "1".to_string(),
        };
        assert!(gas_tracker_from_oracle(&oracle).is_err());
    }
}
