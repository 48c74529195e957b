//! Shared fixtures for the scanner integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use tempfile::{tempdir, TempDir};

use restzone_common::DetectorConfig;
use restzone_scanner::data::{
    week_start, LocalStorage, LocalStorageConfig, MarketDataProvider, PriceBar, PriceHistory,
    PriceSeries, ProviderError, RawBar, Resolution,
};

// ============================================================================
// Test Data Generators
// ============================================================================

/// Deterministic pseudo-random value in [0, 1)
pub fn rand_simple(seed: u64) -> f64 {
    let x = seed
        .wrapping_mul(6_364_136_223_846_793_005)
        .wrapping_add(1_442_695_040_888_963_407);
    (x >> 33) as f64 / (1u64 << 31) as f64
}

/// `n` consecutive weekdays starting at `start`.
pub fn trading_days(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(n);
    let mut date = start;
    while days.len() < n {
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            days.push(date);
        }
        date += Duration::days(1);
    }
    days
}

/// Daily bars around the averages. Every 30 bars a setup / gap / breakout
/// sequence starts, and 15 bars later a setup / gap / violation sequence;
/// the rest is noise.
pub fn pattern_bars(n: usize, seed: u64) -> Vec<PriceBar> {
    let start = NaiveDate::from_ymd_opt(2020, 1, 6).unwrap();
    trading_days(start, n)
        .into_iter()
        .enumerate()
        .map(|(i, date)| {
            let r = |k: u64| rand_simple(seed.wrapping_mul(10_007) + i as u64 * 7 + k);
            let (open, high, low, close, volume) = match i % 30 {
                0 | 15 => (100.5, 101.0, 100.2, 100.8, 1000.0),
                1 | 16 => (101.0, 101.6, 100.9, 101.5, 1100.0),
                2 | 17 => (101.5, 102.2, 101.3, 102.0, 1200.0),
                3 => (102.0, 103.2, 101.9, 103.0, 3000.0),
                18 => (101.0, 101.2, 98.0, 98.5, 2500.0),
                _ => {
                    let base = 100.0 + 4.0 * (r(1) - 0.5);
                    let close = base + 2.0 * (r(2) - 0.5);
                    let high = base.max(close) + 0.5 * r(3);
                    let low = base.min(close) - 1.5 * r(4);
                    (base, high, low, close, 800.0 + 600.0 * r(5))
                }
            };
            let mut bar = PriceBar::new(date, open, high, low, close, volume);
            bar.sma200 = Some(100.0);
            bar.ema200 = Some(101.0);
            bar
        })
        .collect()
}

/// Flat daily bars at 100 (at `early_level` for the first 60) with a
/// single rest-zone setup three bars before `breakout_idx`, a gap on the
/// next two bars and a close above the setup high on `breakout_idx`.
/// Averages are left for the cache to compute.
pub fn breakout_bars(n: usize, breakout_idx: usize, early_level: f64) -> Vec<PriceBar> {
    let start = NaiveDate::from_ymd_opt(2020, 1, 6).unwrap();
    let setup = breakout_idx.wrapping_sub(3);
    trading_days(start, n)
        .into_iter()
        .enumerate()
        .map(|(i, date)| {
            let level = if i < 60 { early_level } else { 100.0 };
            let (open, high, low, close) = match i.wrapping_sub(setup) {
                0 => (100.0, 100.3, 99.8, 100.05),
                1 => (100.2, 100.8, 100.1, 100.6),
                2 => (100.6, 101.0, 100.5, 100.9),
                3 => (101.0, 101.6, 100.9, 101.5),
                _ => (level, level + 0.5, level - 0.5, level),
            };
            PriceBar::new(date, open, high, low, close, 1000.0)
        })
        .collect()
}

/// Weekly bars (Mondays) covering `daily`, all above their average.
pub fn uptrend_weekly(daily: &[PriceBar]) -> Vec<PriceBar> {
    let (Some(first), Some(last)) = (daily.first(), daily.last()) else {
        return Vec::new();
    };
    let mut weeks = Vec::new();
    let mut monday = week_start(first.date);
    while monday <= last.date {
        let mut bar = PriceBar::new(monday, 104.0, 106.0, 103.0, 105.0, 5000.0);
        bar.sma200 = Some(100.0);
        weeks.push(bar);
        monday += Duration::days(7);
    }
    weeks
}

pub fn pattern_history(n: usize, seed: u64) -> PriceHistory {
    let daily = pattern_bars(n, seed);
    let weekly = uptrend_weekly(&daily);
    PriceHistory::new(PriceSeries::new(daily), PriceSeries::new(weekly))
}

/// Same weekly series, daily bars cut after the first `len`.
pub fn truncated(history: &PriceHistory, len: usize) -> PriceHistory {
    PriceHistory::new(
        PriceSeries::new(history.daily.bars()[..len].to_vec()),
        history.weekly.clone(),
    )
}

pub fn detector_config() -> DetectorConfig {
    DetectorConfig {
        min_history_bars: 5,
        ..Default::default()
    }
}

pub fn create_test_storage() -> (TempDir, Arc<LocalStorage>) {
    let dir = tempdir().unwrap();
    let config = LocalStorageConfig {
        db_path: dir.path().join("test_restzone.db"),
    };
    let storage = Arc::new(LocalStorage::new(config).unwrap());
    (dir, storage)
}

pub fn to_raw(bar: &PriceBar) -> RawBar {
    RawBar {
        time: bar.date.and_hms_opt(0, 0, 0).unwrap().and_utc().fixed_offset(),
        open: Some(bar.open),
        high: Some(bar.high),
        low: Some(bar.low),
        close: Some(bar.close),
        volume: Some(bar.volume),
    }
}

// ============================================================================
// Mock Provider
// ============================================================================

/// How a symbol behaves when fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    Serve,
    Fail,
    Panic,
}

/// Serves fixed series per symbol, filtered to the requested range.
pub struct MockProvider {
    daily: Mutex<HashMap<String, Vec<PriceBar>>>,
    behavior: Mutex<HashMap<String, MockBehavior>>,
    pub daily_calls: AtomicU32,
    pub weekly_calls: AtomicU32,
    pub last_daily_start: Mutex<Option<NaiveDate>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            daily: Mutex::new(HashMap::new()),
            behavior: Mutex::new(HashMap::new()),
            daily_calls: AtomicU32::new(0),
            weekly_calls: AtomicU32::new(0),
            last_daily_start: Mutex::new(None),
        }
    }

    pub fn with_series(self, symbol: &str, bars: Vec<PriceBar>) -> Self {
        self.set_series(symbol, bars);
        self
    }

    pub fn with_behavior(self, symbol: &str, behavior: MockBehavior) -> Self {
        self.set_behavior(symbol, behavior);
        self
    }

    pub fn set_series(&self, symbol: &str, bars: Vec<PriceBar>) {
        self.daily.lock().unwrap().insert(symbol.to_string(), bars);
    }

    pub fn set_behavior(&self, symbol: &str, behavior: MockBehavior) {
        self.behavior.lock().unwrap().insert(symbol.to_string(), behavior);
    }

    pub fn calls(&self) -> u32 {
        self.daily_calls.load(Ordering::Relaxed) + self.weekly_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MarketDataProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        resolution: Resolution,
    ) -> Result<Vec<RawBar>, ProviderError> {
        match resolution {
            Resolution::Daily => {
                self.daily_calls.fetch_add(1, Ordering::Relaxed);
                *self.last_daily_start.lock().unwrap() = Some(start);
            }
            Resolution::Weekly => {
                self.weekly_calls.fetch_add(1, Ordering::Relaxed);
            }
        }

        let behavior = self
            .behavior
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .unwrap_or(MockBehavior::Serve);
        match behavior {
            MockBehavior::Fail => {
                return Err(ProviderError::Network("mock network failure".into()));
            }
            MockBehavior::Panic => panic!("mock provider panic for {symbol}"),
            MockBehavior::Serve => {}
        }

        let daily = self.daily.lock().unwrap().get(symbol).cloned().unwrap_or_default();
        let bars = match resolution {
            Resolution::Daily => daily,
            Resolution::Weekly => uptrend_weekly(&daily),
        };
        Ok(bars
            .iter()
            .filter(|b| b.date >= start && b.date <= end)
            .map(to_raw)
            .collect())
    }
}
