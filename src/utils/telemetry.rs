//! Telemetry Module
//!
//! Counts sync outcomes across runs and tracks consecutive relational write
//! failures. A single failed upsert is just an item error; a long unbroken
//! run of them means the store binding itself is broken and the scheduler
//! should stop instead of burning provider quota.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

use crate::models::errors::{AppError, ErrorCode};
use crate::models::types::{MarketSyncResult, SyncResult};

/// Aggregated statistics for reporting
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TelemetryStats {
    pub wallets_synced: u64,
    pub wallets_skipped: u64,
    pub wallets_failed: u64,
    pub external_failures: u64,
    pub relational_failures: u64,
    pub graph_write_failures: u64,
    pub cache_write_failures: u64,
    pub consecutive_relational_failures: u64,
    pub market_syncs: u64,
    pub market_source_fallbacks: u64,
    pub popularity_runs: u64,
    pub period_start: u64,
    pub period_end: u64,
}

impl TelemetryStats {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// Lock-free counters shared by the pipelines
pub struct SyncTelemetry {
    wallets_synced: AtomicU64,
    wallets_skipped: AtomicU64,
    wallets_failed: AtomicU64,
    external_failures: AtomicU64,
    relational_failures: AtomicU64,
    graph_write_failures: AtomicU64,
    cache_write_failures: AtomicU64,
    consecutive_relational_failures: AtomicU64,
    market_syncs: AtomicU64,
    market_source_fallbacks: AtomicU64,
    popularity_runs: AtomicU64,
    session_start: u64,
}

impl Default for SyncTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncTelemetry {
    pub fn new() -> Self {
        Self {
            wallets_synced: AtomicU64::new(0),
            wallets_skipped: AtomicU64::new(0),
            wallets_failed: AtomicU64::new(0),
            external_failures: AtomicU64::new(0),
            relational_failures: AtomicU64::new(0),
            graph_write_failures: AtomicU64::new(0),
            cache_write_failures: AtomicU64::new(0),
            consecutive_relational_failures: AtomicU64::new(0),
            market_syncs: AtomicU64::new(0),
            market_source_fallbacks: AtomicU64::new(0),
            popularity_runs: AtomicU64::new(0),
            session_start: current_timestamp(),
        }
    }

    /// Record one wallet sync outcome
    pub fn record_sync(&self, result: &SyncResult) {
        if result.ok {
            if result.skipped {
                self.wallets_skipped.fetch_add(1, Ordering::Relaxed);
            } else {
                self.wallets_synced.fetch_add(1, Ordering::Relaxed);
                // A successful upsert proves the relational store is reachable
                self.consecutive_relational_failures
                    .store(0, Ordering::Relaxed);
            }
            return;
        }

        self.wallets_failed.fetch_add(1, Ordering::Relaxed);
        match result.error_code.as_deref() {
            Some(code) if code == ErrorCode::RelationalWriteFailed.as_str()
                || code == ErrorCode::StoreTimeout.as_str() =>
            {
                self.relational_failures.fetch_add(1, Ordering::Relaxed);
                self.consecutive_relational_failures
                    .fetch_add(1, Ordering::Relaxed);
            }
            Some(code) if code.starts_with("EXTERNAL_") => {
                self.external_failures.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    pub fn record_graph_failure(&self) {
        self.graph_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_failure(&self) {
        self.cache_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_market_sync(&self, result: &MarketSyncResult) {
        self.market_syncs.fetch_add(1, Ordering::Relaxed);
        self.market_source_fallbacks
            .fetch_add(result.fallback_count() as u64, Ordering::Relaxed);
        if !result.history_written {
            self.relational_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_popularity_run(&self) {
        self.popularity_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn consecutive_relational_failures(&self) -> u64 {
        self.consecutive_relational_failures.load(Ordering::Relaxed)
    }

    /// Error to escalate above the batch level once `threshold` relational
    /// failures happened in a row; `None` while below it
    pub fn escalation(&self, threshold: u64) -> Option<AppError> {
        let streak = self.consecutive_relational_failures();
        if threshold > 0 && streak >= threshold {
            Some(AppError::store_unavailable(format!(
                "relational store failed {} consecutive writes",
                streak
            )))
        } else {
            None
        }
    }

    pub fn get_stats(&self) -> TelemetryStats {
        TelemetryStats {
            wallets_synced: self.wallets_synced.load(Ordering::Relaxed),
            wallets_skipped: self.wallets_skipped.load(Ordering::Relaxed),
            wallets_failed: self.wallets_failed.load(Ordering::Relaxed),
            external_failures: self.external_failures.load(Ordering::Relaxed),
            relational_failures: self.relational_failures.load(Ordering::Relaxed),
            graph_write_failures: self.graph_write_failures.load(Ordering::Relaxed),
            cache_write_failures: self.cache_write_failures.load(Ordering::Relaxed),
            consecutive_relational_failures: self.consecutive_relational_failures(),
            market_syncs: self.market_syncs.load(Ordering::Relaxed),
            market_source_fallbacks: self.market_source_fallbacks.load(Ordering::Relaxed),
            popularity_runs: self.popularity_runs.load(Ordering::Relaxed),
            period_start: self.session_start,
            period_end: current_timestamp(),
        }
    }

    pub fn log_summary(&self) {
        let stats = self.get_stats();
        info!(
            "📊 Stats | Synced: {} | Skipped: {} | Failed: {} | Graph errs: {} | Cache errs: {} | Market syncs: {} (fallbacks: {})",
            stats.wallets_synced,
            stats.wallets_skipped,
            stats.wallets_failed,
            stats.graph_write_failures,
            stats.cache_write_failures,
            stats.market_syncs,
            stats.market_source_fallbacks,
        );
    }

    /// Export current stats to a timestamped JSON file in `dir`
    pub fn export_stats_json(&self, dir: &Path) -> Result<PathBuf, std::io::Error> {
        fs::create_dir_all(dir)?;
        let stats = self.get_stats();
        let path = dir.join(format!("stats_{}.json", current_timestamp()));
        fs::write(&path, stats.to_json())?;
        Ok(path)
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(code: ErrorCode) -> SyncResult {
        SyncResult::failed("0xabc".to_string(), &AppError::new(code, "boom"))
    }

    #[test]
    fn test_counts_outcomes() {
        let telemetry = SyncTelemetry::new();
        telemetry.record_sync(&SyncResult::skipped("0xabc".to_string()));
        telemetry.record_sync(&failure(ErrorCode::ExternalTimeout));
        telemetry.record_sync(&failure(ErrorCode::InvalidAddress));

        let stats = telemetry.get_stats();
        assert_eq!(stats.wallets_skipped, 1);
        assert_eq!(stats.wallets_failed, 2);
        assert_eq!(stats.external_failures, 1);
        assert_eq!(stats.relational_failures, 0);
    }

    #[test]
    fn test_escalates_only_after_repeated_relational_failures() {
        let telemetry = SyncTelemetry::new();
        for _ in 0..2 {
            telemetry.record_sync(&failure(ErrorCode::RelationalWriteFailed));
        }
        assert!(telemetry.escalation(3).is_none());

        telemetry.record_sync(&failure(ErrorCode::StoreTimeout));
        let err = telemetry.escalation(3).unwrap();
        assert_eq!(err.code, ErrorCode::ConfigStoreUnavailable);
    }

    #[test]
    fn test_external_failures_do_not_break_streak_or_escalate() {
        let telemetry = SyncTelemetry::new();
        for _ in 0..10 {
            telemetry.record_sync(&failure(ErrorCode::ExternalHttpError));
        }
        assert_eq!(telemetry.consecutive_relational_failures(), 0);
        assert!(telemetry.escalation(3).is_none());
    }

    #[test]
    fn test_stats_json_export() {
        let telemetry = SyncTelemetry::new();
        telemetry.record_popularity_run();
        let json = telemetry.get_stats().to_json();
        assert!(json.contains("popularity_runs"));

        let dir = tempfile::tempdir().unwrap();
        let path = telemetry.export_stats_json(dir.path()).unwrap();
        assert!(path.exists());
    }
}
