//! Refresh decision for previously synced wallets

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::storage::RelationalStore;

/// Pure predicate: never synced, or last sync older than `threshold`
pub fn is_stale(updated_at: Option<DateTime<Utc>>, now: DateTime<Utc>, threshold: Duration) -> bool {
    match updated_at {
        None => true,
        Some(updated) => now - updated > threshold,
    }
}

pub struct StalenessPolicy {
    relational: Arc<dyn RelationalStore>,
    threshold: Duration,
    read_timeout: std::time::Duration,
}

impl StalenessPolicy {
    pub fn new(
        relational: Arc<dyn RelationalStore>,
        threshold: Duration,
        read_timeout: std::time::Duration,
    ) -> Self {
        Self {
            relational,
            threshold,
            read_timeout,
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Fails open: a read error or timeout means "refresh"
    pub async fn needs_refresh(&self, address: &str) -> bool {
        self.needs_refresh_at(address, Utc::now()).await
    }

    pub async fn needs_refresh_at(&self, address: &str, now: DateTime<Utc>) -> bool {
        let read = tokio::time::timeout(self.read_timeout, self.relational.wallet_updated_at(address)).await;
        match read {
            Ok(Ok(updated_at)) => {
                let stale = is_stale(updated_at, now, self.threshold);
                debug!("🕒 {} stale: {} (updated_at: {:?})", address, stale, updated_at);
                stale
            }
            Ok(Err(e)) => {
                warn!("⚠️ Staleness read failed for {}, refreshing: {}", address, e);
                true
            }
            Err(_) => {
                warn!("⚠️ Staleness read timed out for {}, refreshing", address);
                true
            }
        }
    }
}
