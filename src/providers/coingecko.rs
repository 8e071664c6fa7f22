//! CoinGecko market data (`/coins/{id}`)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::models::errors::{AppError, AppResult};
use crate::models::types::EthereumMarket;
use crate::providers::http::{build_client, HttpSource, RetryPolicy};
use crate::providers::PriceSource;
use crate::utils::constants::SOURCE_COINGECKO;
use crate::utils::rate_limiter::RateLimiter;

#[derive(Debug, Deserialize)]
struct CoinResponse {
    market_data: MarketData,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct MarketData {
    current_price: HashMap<String, f64>,
    market_cap: HashMap<String, f64>,
    total_volume: HashMap<String, f64>,
    #[serde(default)]
    price_change_percentage_24h: Option<f64>,
}

#[derive(Clone)]
pub struct CoinGeckoClient {
    base_url: String,
    api_key: Option<String>,
    http: HttpSource,
}

impl CoinGeckoClient {
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
            http: HttpSource::new(client, SOURCE_COINGECKO, limiter, RetryPolicy::default()),
        })
    }

    fn key_header(&self) -> &'static str {
        if self.base_url.contains("pro-api") {
            "x-cg-pro-api-key"
        } else {
            "x-cg-demo-api-key"
        }
    }
}

#[async_trait]
impl PriceSource for CoinGeckoClient {
    async fn fetch_market(&self, coin_id: &str) -> AppResult<EthereumMarket> {
        let url = format!("{}/coins/{}", self.base_url, coin_id);
        let coin: CoinResponse = self
            .http
            .with_retry("coins", || async {
                let mut request = self.http.client.get(&url).query(&[
                    ("localization", "false"),
                    ("tickers", "false"),
                    ("community_data", "false"),
                    ("developer_data", "false"),
                ]);
                if let Some(key) = &self.api_key {
                    request = request.header(self.key_header(), key);
                }
                self.http.send_json(request).await
            })
            .await?;
        market_from_response(coin)
    }
}

fn market_from_response(coin: CoinResponse) -> AppResult<EthereumMarket> {
    let usd = |map: &HashMap<String, f64>, field: &str| -> AppResult<f64> {
        map.get("usd")
            .copied()
            .ok_or_else(|| AppError::invalid_response(format!("coingecko: missing {}.usd", field)))
    };

    Ok(EthereumMarket {
        price: usd(&coin.market_data.current_price, "current_price")?,
        market_cap: usd(&coin.market_data.market_cap, "market_cap")?,
        volume_24h: usd(&coin.market_data.total_volume, "total_volume")?,
        price_change_24h: coin.market_data.price_change_percentage_24h.unwrap_or(0.0),
        last_updated: coin.last_updated.unwrap_or_else(Utc::now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_market_data() {
        let coin: CoinResponse = serde_json::from_value(json!({
            "id": "ethereum",
            "last_updated": "2024-10-01T12:00:00.000Z",
            "market_data": {
                "current_price": {"usd": 2612.35, "eur": 2400.0},
                "market_cap": {"usd": 314063280714.3017},
                "total_volume": {"usd": 17664185611.142204},
                "price_change_percentage_24h": -1.25
            }
        }))
        .unwrap();

        let market = market_from_response(coin).unwrap();
        assert_eq!(market.price, 2612.35);
        assert_eq!(market.market_cap, 314063280714.3017);
        assert_eq!(market.price_change_24h, -1.25);
        assert_eq!(market.last_updated.timestamp(), 1_727_784_000);
    }

    #[test]
    fn test_missing_usd_is_invalid_response() {
        let coin: CoinResponse = serde_json::from_value(json!({
            "market_data": {
                "current_price": {"eur": 1.0},
                "market_cap": {"usd": 1.0},
                "total_volume": {"usd": 1.0}
            }
        }))
        .unwrap();
        let err = market_from_response(coin).unwrap_err();
        assert_eq!(
            err.code,
            crate::models::errors::ErrorCode::ExternalInvalidResponse
        );
    }
}
