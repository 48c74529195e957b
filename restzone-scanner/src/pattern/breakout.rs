//! Rule 4: breakout above the post-setup resistance.
//!
//! Resistance is the highest high between the setup bar (exclusive) and the
//! gap's formation bar (exclusive). Each later bar is checked for a violation
//! of the gap floor before it is checked for a breakout.

use restzone_common::DetectorConfig;

use super::{BreakoutInfo, BreakoutResult};
use crate::data::PriceBar;

/// Bars before the setup used when the setup-to-gap range is empty.
const FALLBACK_LOOKBACK: usize = 10;

/// Highest high over `[setup_idx + 1, formation_idx)`, falling back to
/// `[setup_idx - 10, setup_idx]` when that range is empty.
pub fn resistance(bars: &[PriceBar], setup_idx: usize, formation_idx: usize) -> Option<f64> {
    let (start, end) = if formation_idx > setup_idx + 1 {
        (setup_idx + 1, formation_idx)
    } else {
        (setup_idx.saturating_sub(FALLBACK_LOOKBACK), setup_idx + 1)
    };
    let end = end.min(bars.len());
    if start >= end {
        return None;
    }
    bars[start..end]
        .iter()
        .map(|b| b.high)
        .fold(None, |acc: Option<f64>, h| Some(acc.map_or(h, |a| a.max(h))))
}

/// Evaluate a single bar against a gap floor and resistance.
pub fn evaluate_bar(
    bar: &PriceBar,
    resistance: f64,
    lower_bound: f64,
    config: &DetectorConfig,
) -> BreakoutResult {
    if bar.low < lower_bound * (1.0 - config.violation_tolerance) {
        return BreakoutResult::Violated { date: bar.date };
    }
    if bar.close > resistance * (1.0 + config.breakout_threshold) {
        return BreakoutResult::Breakout(BreakoutInfo {
            date: bar.date,
            price: bar.close,
            resistance,
            breakout_percentage: (bar.close / resistance - 1.0) * 100.0,
        });
    }
    BreakoutResult::Pending
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use test_case::test_case;

    fn bar(day: i64, low: f64, high: f64, close: f64) -> PriceBar {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(day);
        PriceBar::new(date, close, high, low, close, 0.0)
    }

    #[test_case(50.06, true ; "close above threshold breaks out")]
    #[test_case(50.04, false ; "close inside threshold stays pending")]
    fn test_breakout_boundary(close: f64, expected: bool) {
        let b = bar(5, 49.9, 50.1, close);
        let result = evaluate_bar(&b, 50.0, 48.0, &DetectorConfig::default());
        match result {
            BreakoutResult::Breakout(info) => {
                assert!(expected);
                assert!((info.breakout_percentage - 0.12).abs() < 1e-9);
            }
            BreakoutResult::Pending => assert!(!expected),
            BreakoutResult::Violated { .. } => panic!("unexpected violation"),
        }
    }

    #[test]
    fn test_violation_takes_precedence() {
        // low breaches the floor and close clears resistance on the same bar
        let b = bar(5, 45.0, 52.0, 51.0);
        let result = evaluate_bar(&b, 50.0, 48.0, &DetectorConfig::default());
        assert_eq!(result, BreakoutResult::Violated { date: b.date });
    }

    #[test]
    fn test_tolerance_absorbs_small_dip() {
        // floor 48 * 0.98 = 47.04
        let b = bar(5, 47.1, 49.0, 48.5);
        assert_eq!(
            evaluate_bar(&b, 50.0, 48.0, &DetectorConfig::default()),
            BreakoutResult::Pending
        );
    }

    #[test]
    fn test_resistance_ranges() {
        let bars: Vec<PriceBar> = (0..6).map(|d| bar(d, 1.0, 10.0 + d as f64, 5.0)).collect();
        // setup 1, gap formed at 4: highs of bars 2, 3
        assert_eq!(resistance(&bars, 1, 4), Some(13.0));
        // empty range falls back to bars up to the setup
        assert_eq!(resistance(&bars, 3, 4), Some(13.0));
    }
}
