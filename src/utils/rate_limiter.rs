//! Keyed minimum-interval rate limiter
//!
//! Each external source key gets its own schedule. A caller reserves the next
//! free slot for its key under the mutex, releases the lock, then sleeps until
//! that slot. Concurrent callers on one key are spaced by at least the
//! interval; callers on different keys never wait on each other.
//!
//! The limiter only delays, it never rejects.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

/// Per-source limiter shared by all workers (`Arc<RateLimiter>`)
#[derive(Debug, Default)]
pub struct RateLimiter {
    /// source key -> earliest instant the next acquisition may be granted
    next_slot: Mutex<HashMap<String, Instant>>,
    /// default interval per registered source
    intervals: DashMap<String, Duration>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the default interval for a source key
    pub fn register(&self, source_key: &str, min_interval: Duration) {
        self.intervals.insert(source_key.to_string(), min_interval);
    }

    /// Builder-style registration
    pub fn with_source(self, source_key: &str, min_interval: Duration) -> Self {
        self.register(source_key, min_interval);
        self
    }

    pub fn interval_for(&self, source_key: &str) -> Option<Duration> {
        self.intervals.get(source_key).map(|d| *d)
    }

    /// Wait until at least `min_interval` has passed since the previous
    /// granted acquisition for `source_key`.
    pub async fn acquire(&self, source_key: &str, min_interval: Duration) {
        let slot = self.reserve(source_key, min_interval);
        let now = Instant::now();
        if slot > now {
            debug!(
                "⏳ RATE LIMIT: {} waiting {}ms",
                source_key,
                (slot - now).as_millis()
            );
            sleep_until(slot).await;
        }
    }

    /// Acquire using the registered interval; unknown keys pass straight through
    pub async fn acquire_registered(&self, source_key: &str) {
        match self.interval_for(source_key) {
            Some(interval) => self.acquire(source_key, interval).await,
            None => debug!("RATE LIMIT: no interval registered for {}", source_key),
        }
    }

    /// Reserve the next slot for a key. The lock is held only for this
    /// bookkeeping, never across a suspension point.
    fn reserve(&self, source_key: &str, min_interval: Duration) -> Instant {
        let now = Instant::now();
        let mut slots = match self.next_slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("⚠️ Rate limiter mutex poisoned, recovering state");
                poisoned.into_inner()
            }
        };

        let slot = match slots.get(source_key) {
            Some(next) if *next > now => *next,
            _ => now,
        };
        slots.insert(source_key.to_string(), slot + min_interval);
        slot
    }
}
