//! Rule 3: three-bar gap detection after a setup.
//!
//! Bar `i` completes a gap when its low clears the high of bar `i - 2` by at
//! least `min_gap_pct`, and the gap sits near the long averages.

use restzone_common::DetectorConfig;

use super::{GapCandidate, GapResult};
use crate::data::PriceBar;

fn within(price: f64, average: f64, tolerance: f64) -> bool {
    average != 0.0 && ((price - average) / average).abs() <= tolerance
}

/// Bar-3 open/close near either average, or the gap midpoint near either.
fn near_averages(first: &PriceBar, third: &PriceBar, config: &DetectorConfig) -> bool {
    let (Some(sma), Some(ema)) = (third.sma200, third.ema200) else {
        return false;
    };

    let body_near = [third.open, third.close].iter().any(|price| {
        within(*price, sma, config.ma_proximity) || within(*price, ema, config.ma_proximity)
    });
    if body_near {
        return true;
    }

    let center = (first.high + third.low) / 2.0;
    within(center, sma, config.zone_proximity) || within(center, ema, config.zone_proximity)
}

/// Check whether bar `idx` completes a qualifying gap.
pub fn check_third_bar(bars: &[PriceBar], idx: usize, config: &DetectorConfig) -> GapResult {
    if idx < 2 || idx >= bars.len() {
        return GapResult::None;
    }
    let (first, third) = (&bars[idx - 2], &bars[idx]);

    if third.low <= first.high || first.high <= 0.0 {
        return GapResult::None;
    }
    let gap_percentage = (third.low - first.high) / first.high;
    if gap_percentage < config.min_gap_pct {
        return GapResult::None;
    }
    if !near_averages(first, third, config) {
        return GapResult::None;
    }

    GapResult::Gap(GapCandidate {
        gap_percentage,
        lower_bound: first.high,
        upper_bound: third.low,
    })
}

/// Whether third-bar index `idx` lies in the search window of a setup at
/// `setup_idx`: `setup_idx + 2 <= idx < setup_idx + gap_window`.
pub fn in_window(setup_idx: usize, idx: usize, config: &DetectorConfig) -> bool {
    idx >= setup_idx + 2 && idx < setup_idx + config.gap_window
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn bar(day: i64, low: f64, high: f64) -> PriceBar {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(day);
        let mut b = PriceBar::new(date, low, high, low, high, 0.0);
        b.sma200 = Some(100.0);
        b.ema200 = Some(100.0);
        b
    }

    #[test]
    fn test_detects_gap() {
        let bars = vec![bar(0, 99.0, 100.0), bar(1, 100.0, 101.5), bar(2, 101.0, 102.0)];
        let GapResult::Gap(gap) = check_third_bar(&bars, 2, &DetectorConfig::default()) else {
            panic!("expected gap");
        };
        assert_eq!(gap.lower_bound, 100.0);
        assert_eq!(gap.upper_bound, 101.0);
        assert!((gap.gap_percentage - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_small_or_overlapping_gap() {
        let config = DetectorConfig::default();
        let overlap = vec![bar(0, 99.0, 100.0), bar(1, 99.5, 100.5), bar(2, 99.9, 101.0)];
        assert_eq!(check_third_bar(&overlap, 2, &config), GapResult::None);

        // 0.05% gap
        let tiny = vec![bar(0, 99.0, 100.0), bar(1, 99.5, 100.5), bar(2, 100.05, 101.0)];
        assert_eq!(check_third_bar(&tiny, 2, &config), GapResult::None);
    }

    #[test]
    fn test_rejects_gap_far_from_averages() {
        let mut bars = vec![bar(0, 129.0, 130.0), bar(1, 130.0, 131.0), bar(2, 132.0, 133.0)];
        for b in &mut bars {
            b.sma200 = Some(100.0);
            b.ema200 = Some(100.0);
        }
        assert_eq!(check_third_bar(&bars, 2, &DetectorConfig::default()), GapResult::None);
    }

    #[test]
    fn test_window_bounds() {
        let config = DetectorConfig::default();
        assert!(!in_window(10, 11, &config));
        assert!(in_window(10, 12, &config));
        assert!(in_window(10, 29, &config));
        assert!(!in_window(10, 30, &config));
    }
}
