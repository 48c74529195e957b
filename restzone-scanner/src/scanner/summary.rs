//! Daily summary aggregation.
//!
//! Buckets are relative to each symbol's own latest market date, so a symbol
//! whose data lags a day still reports against its last bar.

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::analysis::{GapZone, Signal, SymbolAnalysisState};

/// How far back "recent" and "candidate" reach.
pub const LOOKBACK_BUSINESS_DAYS: u32 = 5;

/// Step back `n` weekdays from `date`, skipping Saturdays and Sundays.
pub fn business_days_back(date: NaiveDate, n: u32) -> NaiveDate {
    let mut current = date;
    let mut remaining = n;
    while remaining > 0 {
        current -= Duration::days(1);
        if !matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            remaining -= 1;
        }
    }
    current
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Breakout,
    Candidate,
}

/// One line of the daily report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub symbol: String,
    pub kind: EntryKind,
    /// Breakout date for signals, formation date for candidates
    pub date: NaiveDate,
    pub setup_date: Option<NaiveDate>,
    pub gap_lower: f64,
    pub gap_upper: f64,
    pub gap_percentage: f64,
    pub breakout_price: Option<f64>,
    pub resistance_price: Option<f64>,
    pub breakout_percentage: Option<f64>,
    pub breakout_volume: Option<f64>,
    pub avg_volume_20d: Option<f64>,
    pub volume_increase_pct: Option<f64>,
    pub rs_score: Option<f64>,
    pub rs_rating: Option<u8>,
}

impl SummaryEntry {
    fn from_signal(state: &SymbolAnalysisState, signal: &Signal) -> Self {
        Self {
            symbol: state.symbol.clone(),
            kind: EntryKind::Breakout,
            date: signal.breakout_date,
            setup_date: state.setup(signal.gap.setup_id).map(|s| s.date),
            gap_lower: signal.gap.lower_bound,
            gap_upper: signal.gap.upper_bound,
            gap_percentage: signal.gap.gap_percentage,
            breakout_price: Some(signal.breakout_price),
            resistance_price: Some(signal.resistance_price),
            breakout_percentage: Some(signal.breakout_percentage),
            breakout_volume: signal.breakout_volume,
            avg_volume_20d: signal.avg_volume_20d,
            volume_increase_pct: signal.volume_increase_pct,
            rs_score: signal.rs_score,
            rs_rating: signal.rs_rating,
        }
    }

    fn from_gap(state: &SymbolAnalysisState, gap: &GapZone) -> Self {
        Self {
            symbol: state.symbol.clone(),
            kind: EntryKind::Candidate,
            date: gap.formation_date,
            setup_date: state.setup(gap.setup_id).map(|s| s.date),
            gap_lower: gap.lower_bound,
            gap_upper: gap.upper_bound,
            gap_percentage: gap.gap_percentage,
            breakout_price: None,
            resistance_price: None,
            breakout_percentage: None,
            breakout_volume: None,
            avg_volume_20d: None,
            volume_increase_pct: None,
            rs_score: None,
            rs_rating: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryCounts {
    pub signals_today: usize,
    pub signals_recent: usize,
    pub candidates: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedSymbol {
    pub symbol: String,
    pub error: String,
    /// Likely to succeed on the next run (network, rate limit, timeout)
    #[serde(default)]
    pub transient: bool,
}

/// Run-level figures the orchestrator hands to the aggregator.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub started_at: DateTime<Local>,
    pub duration: std::time::Duration,
    pub total_scanned: usize,
    pub analyzed: usize,
    pub failed: Vec<FailedSymbol>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub scan_date: NaiveDate,
    pub scan_time: DateTime<Local>,
    pub duration_secs: f64,
    pub total_scanned: usize,
    pub analyzed: usize,
    pub failed: Vec<FailedSymbol>,
    pub avg_time_per_symbol_ms: f64,
    pub counts: SummaryCounts,
    pub signals_today: Vec<SummaryEntry>,
    pub signals_recent: Vec<SummaryEntry>,
    pub candidates: Vec<SummaryEntry>,
}

/// Collects per-symbol buckets as states arrive.
#[derive(Debug, Default)]
pub struct SummaryAggregator {
    today: BTreeMap<(String, NaiveDate), SummaryEntry>,
    recent: BTreeMap<(String, NaiveDate), SummaryEntry>,
    candidates: BTreeMap<(String, NaiveDate), SummaryEntry>,
}

impl SummaryAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one symbol's state. Adding the same state twice is a no-op.
    pub fn add(&mut self, state: &SymbolAnalysisState) {
        let market_date = state.last_updated;
        let window_start = business_days_back(market_date, LOOKBACK_BUSINESS_DAYS);

        for signal in &state.signals {
            let key = (state.symbol.clone(), signal.breakout_date);
            if signal.breakout_date == market_date {
                self.today
                    .entry(key)
                    .or_insert_with(|| SummaryEntry::from_signal(state, signal));
            } else if signal.breakout_date >= window_start && signal.breakout_date < market_date {
                self.recent
                    .entry(key)
                    .or_insert_with(|| SummaryEntry::from_signal(state, signal));
            }
        }

        for gap in state.active_gaps() {
            if gap.formation_date >= window_start && gap.formation_date <= market_date {
                self.candidates
                    .entry((state.symbol.clone(), gap.formation_date))
                    .or_insert_with(|| SummaryEntry::from_gap(state, gap));
            }
        }
    }

    pub fn finish(self, report: ScanReport) -> DailySummary {
        let duration_secs = report.duration.as_secs_f64();
        let avg_time_per_symbol_ms = if report.total_scanned == 0 {
            0.0
        } else {
            duration_secs * 1000.0 / report.total_scanned as f64
        };

        // BTreeMap keys already order by symbol then date
        let signals_today: Vec<_> = self.today.into_values().collect();
        let signals_recent: Vec<_> = self.recent.into_values().collect();
        let candidates: Vec<_> = self.candidates.into_values().collect();

        DailySummary {
            scan_date: report.started_at.date_naive(),
            scan_time: report.started_at,
            duration_secs,
            total_scanned: report.total_scanned,
            analyzed: report.analyzed,
            failed: report.failed,
            avg_time_per_symbol_ms,
            counts: SummaryCounts {
                signals_today: signals_today.len(),
                signals_recent: signals_recent.len(),
                candidates: candidates.len(),
            },
            signals_today,
            signals_recent,
            candidates,
        }
    }
}
