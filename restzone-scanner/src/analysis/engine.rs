//! Chronological detection engine.
//!
//! Replays daily bars in date order against a mutable state. For each bar:
//!
//! 1. active gaps are resolved (formation date, then id order): violation
//!    first, then breakout; a breakout consumes the gap, its setup and the
//!    setup's other active gaps
//! 2. active setups whose gap window covers the bar look for a gap completed
//!    by it
//! 3. the bar itself is classified as a potential new setup
//!
//! Because every step only reads bars up to the current one, replaying
//! `[a, n)` in one pass or as `[a, w)` followed by `[w, n)` yields the same
//! state.
//!
//! Before replaying, active gaps whose formation or setup bar is no longer
//! cached (trimmed by the lookback window) are expired: their resistance can
//! no longer be computed.

use restzone_common::DetectorConfig;
use tracing::trace;

use super::state::{
    gap_id, setup_id, GapStatus, GapZone, Setup, SetupStatus, Signal, SymbolAnalysisState,
};
use crate::data::indicators::{rs_composite, volume_metrics};
use crate::data::PriceHistory;
use crate::pattern::{breakout, gap, setup, trend, BreakoutInfo, BreakoutResult, GapResult};

/// Counts of state changes made by a replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub bars: usize,
    pub new_setups: usize,
    pub new_gaps: usize,
    pub violations: usize,
    pub signals: usize,
    pub expired: usize,
}

impl ReplayStats {
    pub fn changed(&self) -> bool {
        self.new_setups + self.new_gaps + self.violations + self.signals + self.expired > 0
    }
}

pub struct DetectionEngine<'a> {
    symbol: &'a str,
    history: &'a PriceHistory,
    config: &'a DetectorConfig,
}

impl<'a> DetectionEngine<'a> {
    pub fn new(symbol: &'a str, history: &'a PriceHistory, config: &'a DetectorConfig) -> Self {
        Self {
            symbol,
            history,
            config,
        }
    }

    /// Process daily bars `from..` in order.
    pub fn replay(&self, state: &mut SymbolAnalysisState, from: usize) -> ReplayStats {
        let mut stats = ReplayStats {
            expired: self.expire_untracked(state),
            ..ReplayStats::default()
        };
        for idx in from..self.history.daily.len() {
            self.resolve_gaps(state, idx, &mut stats);
            self.extend_gaps(state, idx, &mut stats);
            self.seed_setup(state, idx, &mut stats);
            stats.bars += 1;
        }
        stats
    }

    /// Expire active gaps that can no longer be resolved against the cache.
    fn expire_untracked(&self, state: &mut SymbolAnalysisState) -> usize {
        let daily = &self.history.daily;
        let setup_dates: std::collections::HashMap<_, _> =
            state.setups.iter().map(|s| (s.id, s.date)).collect();

        let mut expired = 0;
        for gap in state.gaps.iter_mut().filter(|g| g.status == GapStatus::Active) {
            let tracked = daily.index_of(gap.formation_date).is_some()
                && setup_dates
                    .get(&gap.setup_id)
                    .is_some_and(|d| daily.index_of(*d).is_some());
            if !tracked {
                gap.status = GapStatus::Expired;
                expired += 1;
                trace!(symbol = self.symbol, formation = %gap.formation_date, "Gap expired");
            }
        }
        expired
    }

    fn resolve_gaps(&self, state: &mut SymbolAnalysisState, idx: usize, stats: &mut ReplayStats) {
        let daily = &self.history.daily;
        let bars = daily.bars();
        let bar = &bars[idx];

        let mut order: Vec<usize> = (0..state.gaps.len())
            .filter(|i| state.gaps[*i].status == GapStatus::Active)
            .collect();
        order.sort_by_key(|i| (state.gaps[*i].formation_date, state.gaps[*i].id));

        for gi in order {
            // a sibling may have broken out earlier on this bar
            if state.gaps[gi].status != GapStatus::Active {
                continue;
            }
            let gap = &state.gaps[gi];
            let Some(formation_idx) = daily.index_of(gap.formation_date) else {
                continue;
            };
            if idx <= formation_idx {
                continue;
            }
            let Some(setup_idx) = state
                .setup(gap.setup_id)
                .and_then(|s| daily.index_of(s.date))
            else {
                continue;
            };
            let Some(level) = breakout::resistance(bars, setup_idx, formation_idx) else {
                continue;
            };

            match breakout::evaluate_bar(bar, level, gap.lower_bound, self.config) {
                BreakoutResult::Pending => {}
                BreakoutResult::Violated { date } => {
                    let gap = &mut state.gaps[gi];
                    gap.status = GapStatus::Violated;
                    gap.violated_date = Some(date);
                    stats.violations += 1;
                    trace!(symbol = self.symbol, %date, "Gap violated");
                }
                BreakoutResult::Breakout(info) => {
                    self.emit_signal(state, gi, idx, info);
                    stats.signals += 1;
                }
            }
        }
    }

    fn emit_signal(&self, state: &mut SymbolAnalysisState, gi: usize, idx: usize, info: BreakoutInfo) {
        let bars = self.history.daily.bars();
        let owner = state.gaps[gi].setup_id;

        for gap in state
            .gaps
            .iter_mut()
            .filter(|g| g.setup_id == owner && g.status == GapStatus::Active)
        {
            gap.status = GapStatus::Consumed;
        }
        if let Some(setup) = state.setups.iter_mut().find(|s| s.id == owner) {
            setup.status = SetupStatus::Consumed;
        }

        let volume = volume_metrics(bars, idx);
        state.signals.push(Signal {
            gap: state.gaps[gi].clone(),
            breakout_date: info.date,
            breakout_price: info.price,
            resistance_price: info.resistance,
            breakout_percentage: info.breakout_percentage,
            breakout_volume: volume.map(|v| v.breakout_volume),
            avg_volume_20d: volume.map(|v| v.avg_volume_20d),
            volume_increase_pct: volume.map(|v| v.volume_increase_pct),
            rs_score: rs_composite(bars, idx),
            rs_rating: None,
        });
        trace!(symbol = self.symbol, date = %info.date, "Breakout signal");
    }

    fn extend_gaps(&self, state: &mut SymbolAnalysisState, idx: usize, stats: &mut ReplayStats) {
        let daily = &self.history.daily;
        let bars = daily.bars();

        let GapResult::Gap(candidate) = gap::check_third_bar(bars, idx, self.config) else {
            return;
        };
        let formation_date = bars[idx].date;

        let owners: Vec<_> = state
            .active_setups()
            .filter(|s| {
                daily
                    .index_of(s.date)
                    .is_some_and(|s_idx| gap::in_window(s_idx, idx, self.config))
            })
            .map(|s| (s.id, s.date))
            .collect();

        for (owner, setup_date) in owners {
            let id = gap_id(self.symbol, setup_date, formation_date);
            if state.gaps.iter().any(|g| g.id == id) {
                continue;
            }
            state.gaps.push(GapZone {
                id,
                setup_id: owner,
                formation_date,
                gap_percentage: candidate.gap_percentage,
                lower_bound: candidate.lower_bound,
                upper_bound: candidate.upper_bound,
                status: GapStatus::Active,
                violated_date: None,
            });
            stats.new_gaps += 1;
        }
    }

    fn seed_setup(&self, state: &mut SymbolAnalysisState, idx: usize, stats: &mut ReplayStats) {
        let Some(kind) = setup::classify(self.history, idx, self.config).kind() else {
            return;
        };
        let date = self.history.daily.bars()[idx].date;
        let id = setup_id(self.symbol, date);
        if state.setups.iter().any(|s| s.id == id) {
            return;
        }

        state.setups.push(Setup {
            id,
            date,
            kind,
            status: SetupStatus::Active,
            weekly_deviation: trend::weekly_deviation(&self.history.weekly, date),
        });
        stats.new_setups += 1;
    }
}
