//! Market data module.
//!
//! Holds the price types shared by the detectors, the local SQLite cache and
//! its incremental synchronisation against a remote provider.
//!
//! # Series invariants
//! - One bar per date, dates strictly increasing
//! - Moving averages are recomputed over the whole series after every merge
//! - `ema200` is only populated on daily bars

pub mod indicators;
pub mod local_storage;
pub mod price_cache;
pub mod provider;
pub mod universe;
pub mod yahoo;

pub use local_storage::{CacheMetadata, LocalStorage, LocalStorageConfig, LocalStorageStats};
pub use price_cache::PriceCache;
pub use provider::{MarketDataProvider, ProviderError};
pub use universe::{FileUniverse, StaticUniverse, UniverseProvider};
pub use yahoo::YahooChartProvider;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Core Data Types
// ============================================================================

/// Bar resolution stored in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Daily,
    Weekly,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Daily => write!(f, "daily"),
            Self::Weekly => write!(f, "weekly"),
        }
    }
}

/// A row as returned by a provider, before normalisation.
///
/// Any price field may be missing; such rows are dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBar {
    /// Exchange-local timestamp of the bar
    pub time: DateTime<FixedOffset>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

/// A normalised OHLCV bar with its moving averages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub sma200: Option<f64>,
    pub ema200: Option<f64>,
}

impl PriceBar {
    /// Bar without moving averages.
    pub fn new(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume,
            sma200: None,
            ema200: None,
        }
    }

    /// Midpoint of the candle body.
    pub fn body_center(&self) -> f64 {
        (self.open + self.close) / 2.0
    }
}

/// Date-indexed price series with binary-search lookups.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSeries {
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    /// Build a series, sorting by date and keeping the last bar for any
    /// duplicated date.
    pub fn new(bars: Vec<PriceBar>) -> Self {
        let mut by_date = BTreeMap::new();
        for bar in bars {
            by_date.insert(bar.date, bar);
        }
        Self {
            bars: by_date.into_values().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn get(&self, idx: usize) -> Option<&PriceBar> {
        self.bars.get(idx)
    }

    pub fn first(&self) -> Option<&PriceBar> {
        self.bars.first()
    }

    pub fn last(&self) -> Option<&PriceBar> {
        self.bars.last()
    }

    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    /// Exact index of a date.
    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        self.bars.binary_search_by_key(&date, |b| b.date).ok()
    }

    /// Index of the first bar strictly after `date` (may equal `len()`).
    pub fn first_index_after(&self, date: NaiveDate) -> usize {
        self.bars.partition_point(|b| b.date <= date)
    }

    /// Most recent bar dated on or before `date`.
    pub fn last_at_or_before(&self, date: NaiveDate) -> Option<&PriceBar> {
        match self.first_index_after(date) {
            0 => None,
            idx => self.bars.get(idx - 1),
        }
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn into_bars(self) -> Vec<PriceBar> {
        self.bars
    }
}

/// Daily and weekly series for one symbol.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceHistory {
    pub daily: PriceSeries,
    pub weekly: PriceSeries,
}

impl PriceHistory {
    pub fn new(daily: PriceSeries, weekly: PriceSeries) -> Self {
        Self { daily, weekly }
    }

    /// Latest cached market date (daily resolution).
    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.daily.latest_date()
    }
}

// ============================================================================
// Normalisation & Merge
// ============================================================================

/// Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Reduce provider rows to clean bars.
///
/// Timestamps become naive calendar dates (weekly rows are keyed by the
/// Monday of their week), rows missing any OHLC value are dropped, missing
/// volume becomes zero and the last row wins on duplicated dates.
pub fn normalize(raw: Vec<RawBar>, resolution: Resolution) -> Vec<PriceBar> {
    let mut by_date = BTreeMap::new();

    for row in raw {
        let (Some(open), Some(high), Some(low), Some(close)) =
            (row.open, row.high, row.low, row.close)
        else {
            continue;
        };
        if [open, high, low, close].iter().any(|v| !v.is_finite()) {
            continue;
        }

        let mut date = row.time.date_naive();
        if resolution == Resolution::Weekly {
            date = week_start(date);
        }
        let volume = row.volume.filter(|v| v.is_finite()).unwrap_or(0.0);

        by_date.insert(date, PriceBar::new(date, open, high, low, close, volume));
    }

    by_date.into_values().collect()
}

/// Merge stored and freshly fetched bars; fetched bars win on equal dates.
pub fn merge_bars(stored: Vec<PriceBar>, fetched: Vec<PriceBar>) -> Vec<PriceBar> {
    let mut by_date = BTreeMap::new();
    for bar in stored.into_iter().chain(fetched) {
        by_date.insert(bar.date, bar);
    }
    by_date.into_values().collect()
}
