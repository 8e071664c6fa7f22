//! Shared HTTP plumbing for the provider adapters
//!
//! - One `reqwest::Client` per adapter (gzip, user agent, timeout)
//! - Exponential backoff with ±20% jitter on retryable failures
//! - Every attempt acquires the RateLimiter slot for its source first

use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, USER_AGENT};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::models::errors::{AppError, AppResult};
use crate::utils::constants::USER_AGENT as USER_AGENT_CONST;
use crate::utils::rate_limiter::RateLimiter;

/// Base retry delay in milliseconds
pub const BASE_RETRY_MS: u64 = 500;

/// Retry delay cap in milliseconds
pub const MAX_RETRY_MS: u64 = 8_000;

/// Attempts per call (first try included)
pub const MAX_ATTEMPTS: u32 = 4;

/// Jitter percentage applied to every delay
pub const RETRY_JITTER_PERCENT: u64 = 20;

/// Build HTTP client with custom headers (gzip enabled)
pub fn build_client(timeout: Duration) -> AppResult<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_CONST));
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .gzip(true)
        .build()
        .map_err(|e| AppError::invalid_config(format!("Failed to build HTTP client: {}", e)))
}

/// Backoff schedule for one source
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            base_delay_ms: BASE_RETRY_MS,
            max_delay_ms: MAX_RETRY_MS,
        }
    }
}

impl RetryPolicy {
    /// No retries; used by tests and by callers that retry on the next cycle
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based), jittered
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let base = self.base_delay_ms.saturating_mul(1u64 << exp);
        let capped = base.min(self.max_delay_ms);

        // Random jitter (±20%) to prevent thundering herd
        let jitter_range = (capped * RETRY_JITTER_PERCENT) / 100;
        let jitter: i64 =
            rand::thread_rng().gen_range(-(jitter_range as i64)..=(jitter_range as i64));
        Duration::from_millis((capped as i64 + jitter).max(0) as u64)
    }
}

/// Rate-limited, retrying request runner shared by the adapters
#[derive(Clone)]
pub struct HttpSource {
    pub client: reqwest::Client,
    pub source_key: &'static str,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl HttpSource {
    pub fn new(
        client: reqwest::Client,
        source_key: &'static str,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            source_key,
            limiter,
            retry,
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. Each attempt waits for a limiter slot.
    pub async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.limiter.acquire_registered(self.source_key).await;

            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "⏳ {} {} failed ({}), retry {}/{} in {}ms",
                        self.source_key,
                        what,
                        e.code_str(),
                        attempt + 1,
                        self.retry.max_attempts,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Send a prepared request and decode the JSON body.
    /// 429 → `EXTERNAL_RATE_LIMITED`, other non-2xx → `EXTERNAL_HTTP_ERROR`.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> AppResult<T> {
        let response = request.send().await?;
        let status = response.status();
        if status.as_u16() == 429 {
            return Err(AppError::rate_limited(self.source_key));
        }
        if !status.is_success() {
            return Err(AppError::external(format!(
                "{} returned HTTP {}",
                self.source_key, status
            )));
        }

        let body = response.text().await?;
        debug!("{} response: {} bytes", self.source_key, body.len());
        serde_json::from_str(&body).map_err(|e| {
            AppError::with_source(
                crate::models::errors::ErrorCode::ExternalInvalidResponse,
                format!("{} returned malformed JSON", self.source_key),
                e,
            )
        })
    }
}

/// Parse a `0x`-prefixed hex quantity
pub fn parse_hex_u128(raw: &str) -> AppResult<u128> {
    let body = raw.trim_start_matches("0x");
    if body.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(body, 16)
        .map_err(|_| AppError::invalid_response(format!("invalid hex quantity {:?}", raw)))
}

pub fn parse_hex_u64(raw: &str) -> AppResult<u64> {
    let value = parse_hex_u128(raw)?;
    u64::try_from(value)
        .map_err(|_| AppError::invalid_response(format!("hex quantity {:?} exceeds u64", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::errors::ErrorCode;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn source() -> HttpSource {
        HttpSource::new(
            reqwest::Client::new(),
            "test",
            Arc::new(RateLimiter::new()),
            RetryPolicy {
                max_attempts: 3,
                base_delay_ms: 10,
                max_delay_ms: 40,
            },
        )
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        };
        let first = policy.delay_for(1).as_millis();
        assert!((80..=120).contains(&first));
        let late = policy.delay_for(9).as_millis();
        assert!((800..=1_200).contains(&late));
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex_u128("0x0").unwrap(), 0);
        assert_eq!(parse_hex_u128("0x").unwrap(), 0);
        assert_eq!(parse_hex_u64("0x1b4").unwrap(), 436);
        assert_eq!(
            parse_hex_u128("0xde0b6b3a7640000").unwrap(),
            1_000_000_000_000_000_000
        );
        assert!(parse_hex_u64("0xzz").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_retryable_errors_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = source()
            .with_retry("probe", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(AppError::external_timeout("slow"))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let err = source()
            .with_retry("probe", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(AppError::rate_limited("test"))
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ExternalRateLimited);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_invalid_response_is_not_retried() {
        let calls = AtomicU32::new(0);
        let err = source()
            .with_retry("probe", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(AppError::invalid_response("garbage"))
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ExternalInvalidResponse);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
