//! Local price and analysis storage using SQLite.
//!
//! Provides persistent storage for:
//! - Daily and weekly bars with their moving averages
//! - Per-symbol cache metadata driving incremental sync
//! - Per-symbol analysis state and chart payload
//!
//! Every access goes through one async mutex around the connection, so a
//! multi-statement write is never interleaved with another worker's reads.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{PriceBar, Resolution};
use crate::analysis::{ChartData, SymbolAnalysisState};

// ============================================================================
// Database Schema
// ============================================================================

const CREATE_TABLES_SQL: &str = r#"
-- Daily bars
CREATE TABLE IF NOT EXISTS daily_prices (
    symbol TEXT NOT NULL,
    date TEXT NOT NULL,
    open REAL NOT NULL,
    high REAL NOT NULL,
    low REAL NOT NULL,
    close REAL NOT NULL,
    volume REAL NOT NULL DEFAULT 0,
    sma200 REAL,
    ema200 REAL,
    PRIMARY KEY (symbol, date)
);

-- Weekly bars keyed by the Monday of the week
CREATE TABLE IF NOT EXISTS weekly_prices (
    symbol TEXT NOT NULL,
    week_start TEXT NOT NULL,
    open REAL NOT NULL,
    high REAL NOT NULL,
    low REAL NOT NULL,
    close REAL NOT NULL,
    volume REAL NOT NULL DEFAULT 0,
    sma200 REAL,
    PRIMARY KEY (symbol, week_start)
);

-- One row per cached symbol
CREATE TABLE IF NOT EXISTS cache_metadata (
    symbol TEXT PRIMARY KEY,
    first_date TEXT NOT NULL,
    last_date TEXT NOT NULL,
    daily_count INTEGER NOT NULL,
    weekly_count INTEGER NOT NULL,
    last_synced TEXT NOT NULL
);

-- Versioned analysis snapshot, replaced atomically
CREATE TABLE IF NOT EXISTS symbol_analysis (
    symbol TEXT PRIMARY KEY,
    version INTEGER NOT NULL,
    last_updated TEXT NOT NULL,
    state_json TEXT NOT NULL,
    chart_json TEXT,
    saved_at TEXT NOT NULL
);
"#;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for local storage
#[derive(Debug, Clone)]
pub struct LocalStorageConfig {
    /// Path to SQLite database
    pub db_path: PathBuf,
}

impl LocalStorageConfig {
    pub fn from_config(config: &restzone_common::Config) -> Self {
        Self {
            db_path: config.db_path(),
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// Cache bookkeeping for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub symbol: String,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub daily_count: usize,
    pub weekly_count: usize,
    pub last_synced: DateTime<Utc>,
}

/// Row counts for diagnostics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LocalStorageStats {
    pub symbols: u64,
    pub daily_rows: u64,
    pub weekly_rows: u64,
    pub analyzed_symbols: u64,
}

fn parse_date(raw: &str, idx: usize) -> rusqlite::Result<NaiveDate> {
    raw.parse::<NaiveDate>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

// ============================================================================
// Local Storage
// ============================================================================

/// Local SQLite storage shared by all scan workers
pub struct LocalStorage {
    /// rusqlite::Connection is Send but not Sync, hence Mutex
    db: Arc<Mutex<Connection>>,
    config: LocalStorageConfig,
}

impl LocalStorage {
    /// Open (or create) the database
    pub fn new(config: LocalStorageConfig) -> Result<Self> {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&config.db_path)
            .context("Failed to open local storage database")?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .context("Failed to set database pragmas")?;

        conn.execute_batch(CREATE_TABLES_SQL)
            .context("Failed to create database tables")?;

        info!(db_path = %config.db_path.display(), "Initialized local storage");

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            config,
        })
    }

    /// Get the database path
    pub fn db_path(&self) -> &PathBuf {
        &self.config.db_path
    }

    // ========================================================================
    // Cache Metadata
    // ========================================================================

    pub async fn get_cache_metadata(&self, symbol: &str) -> Result<Option<CacheMetadata>> {
        let db = self.db.lock().await;

        let result = db.query_row(
            "SELECT symbol, first_date, last_date, daily_count, weekly_count, last_synced
             FROM cache_metadata WHERE symbol = ?1",
            params![symbol],
            |row| {
                let first: String = row.get(1)?;
                let last: String = row.get(2)?;
                let synced: String = row.get(5)?;
                let daily: i64 = row.get(3)?;
                let weekly: i64 = row.get(4)?;

                Ok(CacheMetadata {
                    symbol: row.get(0)?,
                    first_date: parse_date(&first, 1)?,
                    last_date: parse_date(&last, 2)?,
                    daily_count: daily as usize,
                    weekly_count: weekly as usize,
                    last_synced: DateTime::parse_from_rfc3339(&synced)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                })
            },
        );

        match result {
            Ok(meta) => Ok(Some(meta)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // ========================================================================
    // Price Data
    // ========================================================================

    /// Load bars for a symbol in chronological order, optionally from `since`.
    pub async fn load_bars(
        &self,
        symbol: &str,
        resolution: Resolution,
        since: Option<NaiveDate>,
    ) -> Result<Vec<PriceBar>> {
        let db = self.db.lock().await;
        let since = since.map(|d| d.to_string()).unwrap_or_default();

        let sql = match resolution {
            Resolution::Daily => {
                "SELECT date, open, high, low, close, volume, sma200, ema200
                 FROM daily_prices WHERE symbol = ?1 AND date >= ?2 ORDER BY date"
            }
            Resolution::Weekly => {
                "SELECT week_start, open, high, low, close, volume, sma200, NULL
                 FROM weekly_prices WHERE symbol = ?1 AND week_start >= ?2 ORDER BY week_start"
            }
        };

        let mut stmt = db.prepare(sql)?;
        let bars = stmt
            .query_map(params![symbol, since], Self::row_to_bar)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("Failed to load {resolution} bars for {symbol}"))?;

        Ok(bars)
    }

    fn row_to_bar(row: &rusqlite::Row) -> rusqlite::Result<PriceBar> {
        let date: String = row.get(0)?;
        Ok(PriceBar {
            date: parse_date(&date, 0)?,
            open: row.get(1)?,
            high: row.get(2)?,
            low: row.get(3)?,
            close: row.get(4)?,
            volume: row.get(5)?,
            sma200: row.get(6)?,
            ema200: row.get(7)?,
        })
    }

    /// Atomically replace every cached bar of a symbol and update its
    /// metadata. Nothing is written if any statement fails.
    pub async fn replace_history(
        &self,
        symbol: &str,
        daily: &[PriceBar],
        weekly: &[PriceBar],
        synced_at: DateTime<Utc>,
    ) -> Result<CacheMetadata> {
        let (Some(first), Some(last)) = (daily.first(), daily.last()) else {
            anyhow::bail!("Refusing to replace {symbol} history with no daily bars");
        };

        let meta = CacheMetadata {
            symbol: symbol.to_string(),
            first_date: first.date,
            last_date: last.date,
            daily_count: daily.len(),
            weekly_count: weekly.len(),
            last_synced: synced_at,
        };

        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        Self::write_history(&tx, &meta, daily, weekly)
            .with_context(|| format!("Failed to write price history for {symbol}"))?;
        tx.commit()?;

        debug!(
            symbol,
            daily = daily.len(),
            weekly = weekly.len(),
            last_date = %meta.last_date,
            "Replaced cached history"
        );
        Ok(meta)
    }

    fn write_history(
        tx: &Transaction<'_>,
        meta: &CacheMetadata,
        daily: &[PriceBar],
        weekly: &[PriceBar],
    ) -> rusqlite::Result<()> {
        let symbol = meta.symbol.as_str();
        tx.execute("DELETE FROM daily_prices WHERE symbol = ?1", params![symbol])?;
        tx.execute("DELETE FROM weekly_prices WHERE symbol = ?1", params![symbol])?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO daily_prices
                 (symbol, date, open, high, low, close, volume, sma200, ema200)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for bar in daily {
                stmt.execute(params![
                    symbol,
                    bar.date.to_string(),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume,
                    bar.sma200,
                    bar.ema200,
                ])?;
            }
        }

        {
            let mut stmt = tx.prepare(
                "INSERT INTO weekly_prices
                 (symbol, week_start, open, high, low, close, volume, sma200)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for bar in weekly {
                stmt.execute(params![
                    symbol,
                    bar.date.to_string(),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume,
                    bar.sma200,
                ])?;
            }
        }

        tx.execute(
            r#"
            INSERT OR REPLACE INTO cache_metadata
            (symbol, first_date, last_date, daily_count, weekly_count, last_synced)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                symbol,
                meta.first_date.to_string(),
                meta.last_date.to_string(),
                meta.daily_count as i64,
                meta.weekly_count as i64,
                meta.last_synced.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    // ========================================================================
    // Analysis State
    // ========================================================================

    pub async fn load_analysis(&self, symbol: &str) -> Result<Option<SymbolAnalysisState>> {
        let db = self.db.lock().await;

        let json: Option<String> = db
            .query_row(
                "SELECT state_json FROM symbol_analysis WHERE symbol = ?1",
                params![symbol],
                |row| row.get(0),
            )
            .optional()?;

        json.map(|j| {
            serde_json::from_str(&j)
                .with_context(|| format!("Corrupt analysis state for {symbol}"))
        })
        .transpose()
    }

    /// Replace the analysis snapshot (and chart payload) in one statement.
    pub async fn save_analysis(
        &self,
        state: &SymbolAnalysisState,
        chart: Option<&ChartData>,
    ) -> Result<()> {
        let state_json = serde_json::to_string(state)?;
        let chart_json = chart.map(serde_json::to_string).transpose()?;

        let db = self.db.lock().await;
        db.execute(
            r#"
            INSERT OR REPLACE INTO symbol_analysis
            (symbol, version, last_updated, state_json, chart_json, saved_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                state.symbol,
                state.version as i64,
                state.last_updated.to_string(),
                state_json,
                chart_json,
                Utc::now().to_rfc3339(),
            ],
        )?;

        debug!(symbol = %state.symbol, version = state.version, "Saved analysis state");
        Ok(())
    }

    /// Rewrite the state of an already-saved version in place. The chart
    /// payload and version are left alone. Returns false when no row holds
    /// that version.
    pub async fn update_state(&self, state: &SymbolAnalysisState) -> Result<bool> {
        let state_json = serde_json::to_string(state)?;

        let db = self.db.lock().await;
        let updated = db.execute(
            "UPDATE symbol_analysis SET state_json = ?3, saved_at = ?4
             WHERE symbol = ?1 AND version = ?2",
            params![
                state.symbol,
                state.version as i64,
                state_json,
                Utc::now().to_rfc3339(),
            ],
        )?;

        Ok(updated > 0)
    }

    pub async fn load_chart(&self, symbol: &str) -> Result<Option<ChartData>> {
        let db = self.db.lock().await;

        let json: Option<Option<String>> = db
            .query_row(
                "SELECT chart_json FROM symbol_analysis WHERE symbol = ?1",
                params![symbol],
                |row| row.get(0),
            )
            .optional()?;

        json.flatten()
            .map(|j| serde_json::from_str(&j).context("Corrupt chart payload"))
            .transpose()
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    pub async fn get_stats(&self) -> Result<LocalStorageStats> {
        let db = self.db.lock().await;

        let count = |sql: &str| -> rusqlite::Result<u64> {
            db.query_row(sql, [], |row| row.get::<_, i64>(0)).map(|n| n as u64)
        };

        Ok(LocalStorageStats {
            symbols: count("SELECT COUNT(*) FROM cache_metadata")?,
            daily_rows: count("SELECT COUNT(*) FROM daily_prices")?,
            weekly_rows: count("SELECT COUNT(*) FROM weekly_prices")?,
            analyzed_symbols: count("SELECT COUNT(*) FROM symbol_analysis")?,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
