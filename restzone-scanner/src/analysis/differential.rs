//! Differential analysis: full scan, incremental re-scan or no-op.
//!
//! `analyze` is a pure function of the prior snapshot and the cached
//! history. The caller persists the returned snapshot when `persist` is set.

use restzone_common::DetectorConfig;
use tracing::debug;

use super::engine::{DetectionEngine, ReplayStats};
use super::state::{MarketRegime, SymbolAnalysisState};
use crate::data::PriceHistory;
use crate::pattern::trend;

/// How a symbol was analyzed this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    /// No prior state: scanned from the minimum-history index
    Full,
    /// Only bars after the prior watermark were processed
    Incremental,
    /// Cache holds nothing newer than the watermark
    UpToDate,
}

impl std::fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Incremental => write!(f, "incremental"),
            Self::UpToDate => write!(f, "up_to_date"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub mode: AnalysisMode,
    pub state: SymbolAnalysisState,
    /// Whether the snapshot differs from the stored one
    pub persist: bool,
    pub stats: ReplayStats,
}

pub struct DifferentialAnalyzer {
    config: DetectorConfig,
}

impl DifferentialAnalyzer {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Analyze one symbol. Returns `None` when there is neither prior state
    /// nor any cached bar.
    pub fn analyze(
        &self,
        symbol: &str,
        prior: Option<&SymbolAnalysisState>,
        history: &PriceHistory,
    ) -> Option<AnalysisOutcome> {
        let latest = history.latest_date();

        let (prior, latest) = match (prior, latest) {
            (None, None) => return None,
            (None, Some(latest)) => {
                let (state, stats) = self.full_scan(symbol, history, latest);
                return Some(AnalysisOutcome {
                    mode: AnalysisMode::Full,
                    state,
                    persist: true,
                    stats,
                });
            }
            (Some(prior), Some(latest)) if latest > prior.last_updated => (prior, latest),
            (Some(prior), _) => {
                return Some(AnalysisOutcome {
                    mode: AnalysisMode::UpToDate,
                    state: prior.clone(),
                    persist: false,
                    stats: ReplayStats::default(),
                });
            }
        };

        let mut state = prior.clone();
        let from = history
            .daily
            .first_index_after(prior.last_updated)
            .max(self.config.min_history_bars);
        let stats = DetectionEngine::new(symbol, history, &self.config).replay(&mut state, from);

        state.last_updated = latest;
        state.market_regime = self.regime(history, latest);
        state.version = prior.version + 1;

        debug!(
            symbol,
            from_idx = from,
            bars = stats.bars,
            new_setups = stats.new_setups,
            new_gaps = stats.new_gaps,
            signals = stats.signals,
            changed = stats.changed(),
            version = state.version,
            "Incremental analysis"
        );

        Some(AnalysisOutcome {
            mode: AnalysisMode::Incremental,
            state,
            persist: true,
            stats,
        })
    }

    fn full_scan(
        &self,
        symbol: &str,
        history: &PriceHistory,
        latest: chrono::NaiveDate,
    ) -> (SymbolAnalysisState, ReplayStats) {
        let mut state = SymbolAnalysisState::new(symbol, latest);
        let stats = DetectionEngine::new(symbol, history, &self.config)
            .replay(&mut state, self.config.min_history_bars);
        state.market_regime = self.regime(history, latest);

        debug!(
            symbol,
            bars = stats.bars,
            setups = state.setups.len(),
            gaps = state.gaps.len(),
            signals = state.signals.len(),
            "Full analysis"
        );
        (state, stats)
    }

    fn regime(&self, history: &PriceHistory, as_of: chrono::NaiveDate) -> MarketRegime {
        if trend::passes(&history.weekly, as_of, self.config.weekly_trend_threshold) {
            MarketRegime::Trending
        } else {
            MarketRegime::Ranging
        }
    }
}
