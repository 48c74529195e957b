//! Batch scan orchestration.
//!
//! The universe is processed in sequential batches. Inside a batch every
//! symbol runs as its own task, bounded by a semaphore; detection itself is
//! CPU-bound and runs on the blocking pool. A failing or panicking symbol is
//! recorded in the summary and never aborts the batch.
//!
//! Once every batch is in, new signals are rated against the composites of
//! every scanned symbol on their breakout date. A rating is written back to
//! the stored state and never recomputed.

use anyhow::{anyhow, Result};
use chrono::{Local, NaiveDate};
use futures::FutureExt;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use restzone_common::{DetectorConfig, ScanConfig};

use super::summary::{
    DailySummary, FailedSymbol, ScanReport, SummaryAggregator, LOOKBACK_BUSINESS_DAYS,
};
use crate::analysis::{AnalysisMode, ChartData, DifferentialAnalyzer, SymbolAnalysisState};
use crate::data::{PriceCache, ProviderError};
use crate::pattern::strength::{self, DailyRatings, ScoreBoard};
use crate::pattern::trend;

/// Composites kept per symbol for rating: one per date a summary can list.
const RATING_WINDOW_BARS: usize = LOOKBACK_BUSINESS_DAYS as usize + 1;

/// Progress reported after each batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanProgress {
    pub batch: usize,
    pub batches: usize,
    pub processed: usize,
    pub total: usize,
    pub failed: usize,
}

pub type ProgressCallback = Arc<dyn Fn(ScanProgress) + Send + Sync>;

/// Per-symbol knobs for [`scan_symbol`].
#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    pub lookback_years: u32,
    /// Skip analysis when the latest bar fails the weekly trend rule
    pub require_current_trend: bool,
    /// Write the new state and chart back to storage
    pub persist: bool,
}

/// Result of scanning a single symbol.
#[derive(Debug, Clone)]
pub struct SymbolScan {
    pub symbol: String,
    /// `None` when the symbol has neither cached bars nor prior state, or
    /// was skipped by the trend filter
    pub mode: Option<AnalysisMode>,
    pub state: Option<SymbolAnalysisState>,
    /// Composites of the most recent bars, oldest first
    pub scores: Vec<(NaiveDate, f64)>,
    /// Built when the state was saved, or whenever the scan does not persist
    pub chart: Option<ChartData>,
}

pub struct ScanOrchestrator {
    cache: Arc<PriceCache>,
    analyzer: Arc<DifferentialAnalyzer>,
    config: ScanConfig,
    progress: Option<ProgressCallback>,
}

impl ScanOrchestrator {
    pub fn new(cache: Arc<PriceCache>, detector: DetectorConfig, config: ScanConfig) -> Self {
        Self {
            cache,
            analyzer: Arc::new(DifferentialAnalyzer::new(detector)),
            config,
            progress: None,
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    fn options(&self, persist: bool) -> ScanOptions {
        ScanOptions {
            lookback_years: self.config.lookback_years,
            require_current_trend: self.config.require_current_trend,
            persist,
        }
    }

    /// Sync and analyze one symbol without touching its stored state.
    pub async fn analyze_symbol(&self, symbol: &str) -> Result<SymbolScan> {
        let today = Local::now().date_naive();
        scan_symbol(&self.cache, &self.analyzer, symbol, self.options(false), today).await
    }

    /// Scan the universe against the local calendar date.
    pub async fn run(&self, symbols: &[String]) -> DailySummary {
        self.run_as_of(symbols, Local::now().date_naive()).await
    }

    /// Scan the universe, syncing each cache through `today`.
    pub async fn run_as_of(&self, symbols: &[String], today: NaiveDate) -> DailySummary {
        let started_at = Local::now();
        let timer = Instant::now();
        let batch_size = self.config.batch_size.max(1);
        let batches = symbols.len().div_ceil(batch_size);

        info!(
            symbols = symbols.len(),
            batches,
            workers = self.config.max_workers,
            "Starting scan"
        );

        let mut board = ScoreBoard::new();
        let mut states = Vec::new();
        let mut failed = Vec::new();
        let mut analyzed = 0usize;

        for (i, batch) in symbols.chunks(batch_size).enumerate() {
            let (results, batch_failed) = self.run_batch(batch, today).await;

            for scan in results {
                analyzed += 1;
                board.record(&scan.symbol, &scan.scores);
                states.extend(scan.state);
            }
            failed.extend(batch_failed);

            let progress = ScanProgress {
                batch: i + 1,
                batches,
                processed: (i * batch_size + batch.len()).min(symbols.len()),
                total: symbols.len(),
                failed: failed.len(),
            };
            info!(
                batch = progress.batch,
                batches = progress.batches,
                processed = progress.processed,
                total = progress.total,
                failed = progress.failed,
                "Batch complete"
            );
            if let Some(callback) = &self.progress {
                callback(progress);
            }

            if i + 1 < batches && self.config.batch_pause_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(self.config.batch_pause_ms))
                    .await;
            }
        }

        let ratings = board.ratings();
        let mut aggregator = SummaryAggregator::new();
        for mut state in states {
            if rate_signals(&mut state, &ratings) > 0 {
                self.store_ratings(&state).await;
            }
            aggregator.add(&state);
        }
        failed.sort_by(|a: &FailedSymbol, b| a.symbol.cmp(&b.symbol));

        let summary = aggregator.finish(ScanReport {
            started_at,
            duration: timer.elapsed(),
            total_scanned: symbols.len(),
            analyzed,
            failed,
        });

        info!(
            analyzed = summary.analyzed,
            failed = summary.failed.len(),
            today = summary.counts.signals_today,
            recent = summary.counts.signals_recent,
            candidates = summary.counts.candidates,
            duration_secs = summary.duration_secs,
            "Scan complete"
        );
        summary
    }

    async fn store_ratings(&self, state: &SymbolAnalysisState) {
        match self.cache.storage().update_state(state).await {
            Ok(true) => debug!(symbol = %state.symbol, "Stored signal ratings"),
            Ok(false) => {
                warn!(symbol = %state.symbol, version = state.version, "Analysis row moved on, ratings not stored")
            }
            Err(e) => {
                warn!(symbol = %state.symbol, error = %format!("{e:#}"), "Failed to store signal ratings")
            }
        }
    }

    async fn run_batch(
        &self,
        batch: &[String],
        today: NaiveDate,
    ) -> (Vec<SymbolScan>, Vec<FailedSymbol>) {
        let semaphore = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let mut join_set: JoinSet<(String, Result<SymbolScan>)> = JoinSet::new();

        for symbol in batch {
            let semaphore = Arc::clone(&semaphore);
            let cache = Arc::clone(&self.cache);
            let analyzer = Arc::clone(&self.analyzer);
            let symbol = symbol.clone();
            let options = self.options(true);

            join_set.spawn(async move {
                let work = async {
                    let _permit = semaphore.acquire_owned().await?;
                    scan_symbol(&cache, &analyzer, &symbol, options, today).await
                };
                let result = match AssertUnwindSafe(work).catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => Err(anyhow!("panicked: {}", panic_message(&*panic))),
                };
                (symbol, result)
            });
        }

        let mut pending: HashSet<&str> = batch.iter().map(String::as_str).collect();
        let mut results = Vec::new();
        let mut failed = Vec::new();

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((symbol, Ok(scan))) => {
                    pending.remove(symbol.as_str());
                    results.push(scan);
                }
                Ok((symbol, Err(e))) => {
                    pending.remove(symbol.as_str());
                    let transient = is_transient(&e);
                    warn!(symbol = %symbol, error = %format!("{e:#}"), transient, "Symbol scan failed");
                    failed.push(FailedSymbol {
                        symbol,
                        error: format!("{e:#}"),
                        transient,
                    });
                }
                Err(join_error) => {
                    warn!(error = %join_error, "Scan task aborted");
                }
            }
        }

        // tasks that never reported back
        for symbol in pending {
            failed.push(FailedSymbol {
                symbol: symbol.to_string(),
                error: "task aborted".to_string(),
                transient: true,
            });
        }

        (results, failed)
    }
}

/// Sync and analyze one symbol, persisting the result when asked to.
pub async fn scan_symbol(
    cache: &PriceCache,
    analyzer: &Arc<DifferentialAnalyzer>,
    symbol: &str,
    options: ScanOptions,
    today: NaiveDate,
) -> Result<SymbolScan> {
    let history = cache.sync_as_of(symbol, options.lookback_years, today).await?;
    let scores = strength::recent_scores(&history.daily, RATING_WINDOW_BARS);

    if options.require_current_trend {
        let threshold = analyzer.config().weekly_trend_threshold;
        if let Some(latest) = history.latest_date() {
            if !trend::passes(&history.weekly, latest, threshold) {
                debug!(symbol, %latest, "Latest bar fails the weekly trend, skipping");
                return Ok(SymbolScan {
                    symbol: symbol.to_string(),
                    mode: None,
                    state: None,
                    scores,
                    chart: None,
                });
            }
        }
    }

    let prior = cache.storage().load_analysis(symbol).await?;

    let analyzer = Arc::clone(analyzer);
    let owned_symbol = symbol.to_string();
    let persist = options.persist;
    let (outcome, chart) = tokio::task::spawn_blocking(move || {
        let outcome = analyzer.analyze(&owned_symbol, prior.as_ref(), &history);
        let chart = outcome
            .as_ref()
            .filter(|o| o.persist || !persist)
            .map(|o| ChartData::build(&o.state, &history));
        (outcome, chart)
    })
    .await
    .map_err(|e| anyhow!("analysis task failed: {e}"))?;

    let Some(outcome) = outcome else {
        debug!(symbol, "No cached bars, nothing to analyze");
        return Ok(SymbolScan {
            symbol: symbol.to_string(),
            mode: None,
            state: None,
            scores,
            chart: None,
        });
    };

    if persist && outcome.persist {
        cache
            .storage()
            .save_analysis(&outcome.state, chart.as_ref())
            .await?;
    }

    debug!(
        symbol,
        mode = %outcome.mode,
        version = outcome.state.version,
        signals = outcome.state.signals.len(),
        persisted = persist && outcome.persist,
        "Symbol analyzed"
    );

    Ok(SymbolScan {
        symbol: symbol.to_string(),
        mode: Some(outcome.mode),
        state: Some(outcome.state),
        scores,
        chart,
    })
}

/// Rate every unrated signal whose breakout date has a universe rating.
/// Returns how many were rated.
fn rate_signals(state: &mut SymbolAnalysisState, ratings: &DailyRatings) -> usize {
    let mut rated = 0;
    for signal in state.signals.iter_mut().filter(|s| s.rs_rating.is_none()) {
        if let Some(rating) = ratings.get(&state.symbol, signal.breakout_date) {
            signal.rs_rating = Some(rating);
            rated += 1;
        }
    }
    rated
}

/// Whether a symbol failure is worth retrying on the next run.
fn is_transient(error: &anyhow::Error) -> bool {
    if let Some(e) = error.downcast_ref::<ProviderError>() {
        return e.is_recoverable();
    }
    error
        .downcast_ref::<restzone_common::Error>()
        .is_some_and(restzone_common::Error::is_transient)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::state::{gap_id, setup_id};
    use crate::analysis::{GapStatus, GapZone, Signal};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn signal(breakout: NaiveDate, rs_rating: Option<u8>) -> Signal {
        let setup = breakout - chrono::Duration::days(4);
        Signal {
            gap: GapZone {
                id: gap_id("AAA", setup, breakout),
                setup_id: setup_id("AAA", setup),
                formation_date: breakout - chrono::Duration::days(1),
                gap_percentage: 0.01,
                lower_bound: 10.0,
                upper_bound: 10.1,
                status: GapStatus::Consumed,
                violated_date: None,
            },
            breakout_date: breakout,
            breakout_price: 11.0,
            resistance_price: 10.9,
            breakout_percentage: 0.92,
            breakout_volume: None,
            avg_volume_20d: None,
            volume_increase_pct: None,
            rs_score: Some(3.0),
            rs_rating,
        }
    }

    #[test]
    fn test_rate_signals_only_fills_missing_ratings() {
        let mut board = ScoreBoard::new();
        board.record("AAA", &[(date(11), 1.0), (date(12), 5.0)]);
        board.record("BBB", &[(date(11), 4.0), (date(12), 2.0)]);
        let ratings = board.ratings();

        let mut state = SymbolAnalysisState::new("AAA", date(12));
        state.signals = vec![
            signal(date(11), Some(80)),
            signal(date(12), None),
            signal(date(4), None),
        ];

        assert_eq!(rate_signals(&mut state, &ratings), 1);
        let rated: Vec<_> = state.signals.iter().map(|s| s.rs_rating).collect();
        assert_eq!(rated, vec![Some(80), Some(99), None]);

        // second pass has nothing left to rate
        assert_eq!(rate_signals(&mut state, &ratings), 0);
    }

    #[test]
    fn test_provider_errors_classify_transience() {
        assert!(is_transient(&anyhow::Error::new(ProviderError::Network("reset".into()))));
        assert!(!is_transient(&anyhow!("corrupt row")));
    }
}
