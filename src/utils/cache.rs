//! High-Performance In-Memory Cache Module
//!
//! Thread-safe TTL cache holding the JSON blobs read by the query layer
//! (`wallet_details:*`, `market_data:*`, `popular_wallets`).
//! Uses DashMap for concurrent access without lock contention.
//!
//! Features:
//! - Per-entry TTL (set at write time)
//! - Lazy expiry on read plus explicit `cleanup_expired`
//! - HIT/MISS counters

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::models::errors::AppResult;
use crate::storage::CacheStore;

/// Cache entry with timestamp for TTL validation
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub value: serde_json::Value,
    pub created_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn new(value: serde_json::Value, ttl: Duration) -> Self {
        Self {
            value,
            created_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }

    /// Remaining lifetime in seconds
    pub fn remaining_ttl(&self) -> u64 {
        self.ttl.saturating_sub(self.created_at.elapsed()).as_secs()
    }
}

/// Shared cache; clones point at the same storage
#[derive(Clone, Default)]
pub struct TtlCache {
    store: Arc<DashMap<String, CacheEntry>>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl TtlCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a live entry; expired entries are removed and count as a miss
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        if let Some(entry) = self.store.get(key) {
            if entry.is_expired() {
                drop(entry); // release read lock before removing
                self.store.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!("📭 CACHE MISS (expired): {}", key);
                None
            } else {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("✅ CACHE HIT: {} (TTL: {}s remaining)", key, entry.remaining_ttl());
                Some(entry.value.clone())
            }
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!("📭 CACHE MISS: {}", key);
            None
        }
    }

    pub fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        self.store
            .insert(key.to_string(), CacheEntry::new(value, ttl));
        debug!("💾 CACHE SET: {} (TTL: {}s)", key, ttl.as_secs());
    }

    pub fn invalidate(&self, key: &str) {
        self.store.remove(key);
        debug!("🗑️ CACHE INVALIDATE: {}", key);
    }

    /// Drop every expired entry, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let before = self.store.len();
        self.store.retain(|_, entry| !entry.is_expired());
        let removed = before - self.store.len();
        if removed > 0 {
            info!("🧹 CACHE CLEANUP: {} expired entries removed", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        CacheStats {
            entries: self.store.len(),
            hits,
            misses,
            hit_rate,
        }
    }
}

#[async_trait]
impl CacheStore for TtlCache {
    async fn set_json(&self, key: &str, value: serde_json::Value, ttl: Duration) -> AppResult<()> {
        self.set(key, value, ttl);
        Ok(())
    }

    async fn get_json(&self, key: &str) -> AppResult<Option<serde_json::Value>> {
        Ok(self.get(key))
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cache_set_get() {
        let cache = TtlCache::new();
        cache.set("wallet_details:0xabc", json!({"riskScore": 10}), Duration::from_secs(60));

        let value = cache.get("wallet_details:0xabc").unwrap();
        assert_eq!(value["riskScore"], 10);
    }

    #[test]
    fn test_cache_overwrite_replaces_value() {
        let cache = TtlCache::new();
        cache.set("k", json!(1), Duration::from_secs(60));
        cache.set("k", json!(2), Duration::from_secs(60));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("k"), Some(json!(2)));
    }

    #[test]
    fn test_cache_expiry() {
        let cache = TtlCache::new();
        cache.set("short", json!("x"), Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("short").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cleanup_expired() {
        let cache = TtlCache::new();
        cache.set("a", json!(1), Duration::from_millis(0));
        cache.set("b", json!(2), Duration::from_secs(60));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_stats() {
        let cache = TtlCache::new();
        cache.set("popular_wallets", json!([]), Duration::from_secs(60));
        cache.get("popular_wallets"); // HIT
        cache.get("market_data:latest"); // MISS

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_cache_store_trait() {
        let cache = TtlCache::new();
        cache
            .set_json("market_data:gas_tracker", json!({"slow": 20}), Duration::from_secs(600))
            .await
            .unwrap();
        let value = cache.get_json("market_data:gas_tracker").await.unwrap();
        assert_eq!(value, Some(json!({"slow": 20})));
    }
}
