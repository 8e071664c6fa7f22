//! SQLite relational store (rusqlite)
//!
//! One long-lived connection behind `Arc<Mutex<_>>`. Every statement runs on
//! the blocking pool so no async task ever holds the mutex across an await.
//! Timestamps are stored as unix milliseconds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::models::types::{MarketHistoryRow, WalletRecord};
use crate::storage::RelationalStore;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS wallets (
    address           TEXT PRIMARY KEY,
    balance           TEXT NOT NULL,
    balance_usd       REAL NOT NULL,
    transaction_count INTEGER NOT NULL,
    is_contract       INTEGER NOT NULL,
    contract_type     TEXT,
    tags              TEXT NOT NULL,
    risk_score        INTEGER NOT NULL CHECK (risk_score BETWEEN 0 AND 100),
    first_seen        INTEGER,
    last_activity     INTEGER,
    updated_at        INTEGER NOT NULL,
    created_at        INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_wallets_popularity
    ON wallets(transaction_count DESC, balance_usd DESC);
CREATE INDEX IF NOT EXISTS idx_wallets_updated_at ON wallets(updated_at);

CREATE TABLE IF NOT EXISTS market_history (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    price_usd_cents  INTEGER NOT NULL,
    market_cap_usd   INTEGER NOT NULL,
    volume_24h_usd   INTEGER NOT NULL,
    price_change_24h REAL NOT NULL,
    gas_slow         INTEGER NOT NULL,
    gas_standard     INTEGER NOT NULL,
    gas_fast         INTEGER NOT NULL,
    gas_instant      INTEGER NOT NULL,
    block_number     INTEGER NOT NULL,
    recorded_at      INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_market_history_recorded_at ON market_history(recorded_at DESC);
"#;

const WALLET_COLUMNS: &str = "address, balance, balance_usd, transaction_count, is_contract, \
     contract_type, tags, risk_score, first_seen, last_activity, updated_at";

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file and apply the schema.
    /// `":memory:"` opens a private in-memory database.
    pub fn open(path: &str) -> AppResult<Self> {
        if path == ":memory:" {
            return Self::open_in_memory();
        }

        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::store_unavailable(format!(
                        "cannot create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let conn = Connection::open(path).map_err(|e| {
            AppError::store_unavailable(format!("cannot open SQLite database {}: {}", path, e))
        })?;
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(|e| AppError::store_unavailable(format!("cannot enable WAL: {}", e)))?;
        debug!("SQLite journal_mode = {}", mode);

        let store = Self::init(conn)?;
        info!("✅ SQLite store ready at {}", path);
        Ok(store)
    }

    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            AppError::store_unavailable(format!("cannot open in-memory SQLite: {}", e))
        })?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> AppResult<Self> {
        conn.busy_timeout(Duration::from_secs(5))
            .and_then(|_| conn.execute_batch(SCHEMA))
            .map_err(|e| AppError::store_unavailable(format!("schema setup failed: {}", e)))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `op` against the connection on the blocking pool.
    /// `code` classifies lock/join failures for this call.
    async fn with_conn<T, F>(&self, code: ErrorCode, op: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> AppResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| AppError::new(code, "SQLite connection mutex poisoned"))?;
            op(&guard)
        })
        .await
        .map_err(|e| AppError::new(code, format!("SQLite task aborted: {}", e)))?
    }
}

#[async_trait]
impl RelationalStore for SqliteStore {
    async fn upsert_wallet(&self, record: &WalletRecord) -> AppResult<WalletRecord> {
        let record = record.clone();
        self.with_conn(ErrorCode::RelationalWriteFailed, move |conn| {
            let tags = serde_json::to_string(&record.tags).map_err(|e| {
                AppError::with_source(ErrorCode::RelationalWriteFailed, "tags encode failed", e)
            })?;
            let sql = format!(
                "INSERT INTO wallets (
                    address, balance, balance_usd, transaction_count, is_contract,
                    contract_type, tags, risk_score, first_seen, last_activity,
                    updated_at, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
                ON CONFLICT(address) DO UPDATE SET
                    balance = excluded.balance,
                    balance_usd = excluded.balance_usd,
                    transaction_count = excluded.transaction_count,
                    is_contract = excluded.is_contract,
                    contract_type = excluded.contract_type,
                    tags = excluded.tags,
                    risk_score = excluded.risk_score,
                    first_seen = COALESCE(wallets.first_seen, excluded.first_seen),
                    last_activity = excluded.last_activity,
                    updated_at = excluded.updated_at
                RETURNING {}",
                WALLET_COLUMNS
            );
            conn.query_row(
                &sql,
                params![
                    record.address,
                    record.balance,
                    record.balance_usd,
                    to_sql_count(record.transaction_count),
                    record.is_contract,
                    record.contract_type,
                    tags,
                    record.risk_score.min(100),
                    record.first_seen.map(|t| t.timestamp_millis()),
                    record.last_activity.map(|t| t.timestamp_millis()),
                    record.updated_at.timestamp_millis(),
                ],
                wallet_from_row,
            )
            .map_err(|e| {
                AppError::with_source(
                    ErrorCode::RelationalWriteFailed,
                    format!("wallet upsert failed for {}", record.address),
                    e,
                )
            })
        })
        .await
    }

    async fn get_wallet(&self, address: &str) -> AppResult<Option<WalletRecord>> {
        let address = address.to_string();
        self.with_conn(ErrorCode::StoreReadFailed, move |conn| {
            let sql = format!("SELECT {} FROM wallets WHERE address = ?1", WALLET_COLUMNS);
            Ok(conn
                .query_row(&sql, params![address], wallet_from_row)
                .optional()?)
        })
        .await
    }

    async fn wallet_updated_at(&self, address: &str) -> AppResult<Option<DateTime<Utc>>> {
        let address = address.to_string();
        self.with_conn(ErrorCode::StoreReadFailed, move |conn| {
            let millis: Option<i64> = conn
                .query_row(
                    "SELECT updated_at FROM wallets WHERE address = ?1",
                    params![address],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(millis.and_then(DateTime::from_timestamp_millis))
        })
        .await
    }

    async fn insert_market_history(&self, row: &MarketHistoryRow) -> AppResult<()> {
        let row = row.clone();
        self.with_conn(ErrorCode::RelationalWriteFailed, move |conn| {
            conn.execute(
                "INSERT INTO market_history (
                    price_usd_cents, market_cap_usd, volume_24h_usd, price_change_24h,
                    gas_slow, gas_standard, gas_fast, gas_instant, block_number, recorded_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    row.price_usd_cents,
                    row.market_cap_usd,
                    row.volume_24h_usd,
                    row.price_change_24h,
                    row.gas_slow,
                    row.gas_standard,
                    row.gas_fast,
                    row.gas_instant,
                    row.block_number,
                    row.recorded_at.timestamp_millis(),
                ],
            )
            .map_err(|e| {
                AppError::with_source(
                    ErrorCode::RelationalWriteFailed,
                    "market history insert failed",
                    e,
                )
            })?;
            Ok(())
        })
        .await
    }

    async fn query_popular(
        &self,
        min_tx_count: u64,
        active_since: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<WalletRecord>> {
        self.with_conn(ErrorCode::StoreReadFailed, move |conn| {
            let sql = format!(
                "SELECT {} FROM wallets
                 WHERE transaction_count > ?1
                   AND last_activity IS NOT NULL
                   AND last_activity >= ?2
                 ORDER BY transaction_count DESC, balance_usd DESC, address ASC
                 LIMIT ?3",
                WALLET_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params![
                    to_sql_count(min_tx_count),
                    active_since.timestamp_millis(),
                    to_sql_count(limit as u64)
                ],
                wallet_from_row,
            )?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn list_wallets(&self, limit: usize, offset: usize) -> AppResult<Vec<WalletRecord>> {
        self.with_conn(ErrorCode::StoreReadFailed, move |conn| {
            let sql = format!(
                "SELECT {} FROM wallets ORDER BY address ASC LIMIT ?1 OFFSET ?2",
                WALLET_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params![to_sql_count(limit as u64), to_sql_count(offset as u64)],
                wallet_from_row,
            )?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn list_stale_wallets(
        &self,
        older_than: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<String>> {
        self.with_conn(ErrorCode::StoreReadFailed, move |conn| {
            let mut stmt = conn.prepare(
                "SELECT address FROM wallets WHERE updated_at < ?1
                 ORDER BY updated_at ASC LIMIT ?2",
            )?;
            let rows = stmt.query_map(
                params![older_than.timestamp_millis(), to_sql_count(limit as u64)],
                |row| row.get::<_, String>(0),
            )?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn count_market_history(&self) -> AppResult<u64> {
        self.with_conn(ErrorCode::StoreReadFailed, |conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM market_history", [], |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    async fn latest_market_history(&self) -> AppResult<Option<MarketHistoryRow>> {
        self.with_conn(ErrorCode::StoreReadFailed, |conn| {
            Ok(conn
                .query_row(
                    "SELECT price_usd_cents, market_cap_usd, volume_24h_usd, price_change_24h,
                            gas_slow, gas_standard, gas_fast, gas_instant, block_number,
                            recorded_at
                     FROM market_history ORDER BY id DESC LIMIT 1",
                    [],
                    history_from_row,
                )
                .optional()?)
        })
        .await
    }
}

fn to_sql_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn wallet_from_row(row: &Row<'_>) -> rusqlite::Result<WalletRecord> {
    let tags_json: String = row.get(6)?;
    let tags: BTreeSet<String> = serde_json::from_str(&tags_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let transaction_count: i64 = row.get(3)?;
    let risk_score: i64 = row.get(7)?;
    let updated_at: i64 = row.get(10)?;

    Ok(WalletRecord {
        address: row.get(0)?,
        balance: row.get(1)?,
        balance_usd: row.get(2)?,
        transaction_count: transaction_count.max(0) as u64,
        is_contract: row.get(4)?,
        contract_type: row.get(5)?,
        tags,
        risk_score: risk_score.clamp(0, 100) as u8,
        first_seen: row
            .get::<_, Option<i64>>(8)?
            .and_then(DateTime::from_timestamp_millis),
        last_activity: row
            .get::<_, Option<i64>>(9)?
            .and_then(DateTime::from_timestamp_millis),
        updated_at: DateTime::from_timestamp_millis(updated_at).unwrap_or_default(),
    })
}

fn history_from_row(row: &Row<'_>) -> rusqlite::Result<MarketHistoryRow> {
    let recorded_at: i64 = row.get(9)?;
    Ok(MarketHistoryRow {
        price_usd_cents: row.get(0)?,
        market_cap_usd: row.get(1)?,
        volume_24h_usd: row.get(2)?,
        price_change_24h: row.get(3)?,
        gas_slow: row.get(4)?,
        gas_standard: row.get(5)?,
        gas_fast: row.get(6)?,
        gas_instant: row.get(7)?,
        block_number: row.get(8)?,
        recorded_at: DateTime::from_timestamp_millis(recorded_at).unwrap_or_default(),
    })
}
