//! Technical indicators used by the cache and the detectors.
//!
//! Averages follow a warm-up rule: a value is only reported once
//! `MA_MIN_PERIODS` closes are available.

use statrs::statistics::Statistics;

use super::PriceBar;

/// Long moving-average window.
pub const MA_WINDOW: usize = 200;
/// Closes required before an average is reported.
pub const MA_MIN_PERIODS: usize = 50;
/// Average true range lookback.
pub const ATR_PERIOD: usize = 14;
/// Bars of history (beyond the current one) needed for volume metrics.
pub const VOLUME_LOOKBACK: usize = 20;

/// Rate-of-change horizons and weights for the relative strength composite.
const RS_WEIGHTS: [(usize, f64); 4] = [(63, 0.4), (126, 0.2), (189, 0.2), (252, 0.2)];

/// Rolling simple moving average with a minimum-period warm-up.
pub fn sma_series(values: &[f64], window: usize, min_periods: usize) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;

    for (i, v) in values.iter().enumerate() {
        sum += v;
        if i >= window {
            sum -= values[i - window];
        }
        let count = (i + 1).min(window);
        out.push((count >= min_periods).then(|| sum / count as f64));
    }
    out
}

/// Exponential moving average (`alpha = 2 / (span + 1)`) seeded with the
/// first value, reported after `min_periods` values.
pub fn ema_series(values: &[f64], span: usize, min_periods: usize) -> Vec<Option<f64>> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut ema = None;

    for (i, v) in values.iter().enumerate() {
        let next = match ema {
            None => *v,
            Some(prev) => alpha * v + (1.0 - alpha) * prev,
        };
        ema = Some(next);
        out.push((i + 1 >= min_periods).then_some(next));
    }
    out
}

/// Recompute `sma200` (and `ema200` when requested) over the whole series.
pub fn apply_moving_averages(bars: &mut [PriceBar], with_ema: bool) {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let sma = sma_series(&closes, MA_WINDOW, MA_MIN_PERIODS);
    let ema = if with_ema {
        ema_series(&closes, MA_WINDOW, MA_MIN_PERIODS)
    } else {
        vec![None; closes.len()]
    };

    for ((bar, s), e) in bars.iter_mut().zip(sma).zip(ema) {
        bar.sma200 = s;
        bar.ema200 = e;
    }
}

/// Mean high-low range over the `ATR_PERIOD` bars ending at `idx`.
pub fn atr_at(bars: &[PriceBar], idx: usize) -> Option<f64> {
    if idx >= bars.len() || idx + 1 < ATR_PERIOD {
        return None;
    }
    let window = &bars[idx + 1 - ATR_PERIOD..=idx];
    Some(window.iter().map(|b| b.high - b.low).mean())
}

/// Percent change of close over `period` bars ending at `idx`.
pub fn rate_of_change(bars: &[PriceBar], idx: usize, period: usize) -> Option<f64> {
    if idx >= bars.len() || idx < period {
        return None;
    }
    let base = bars[idx - period].close;
    if base == 0.0 {
        return None;
    }
    Some((bars[idx].close / base - 1.0) * 100.0)
}

/// Weighted rate-of-change composite at `idx`:
/// `0.4*ROC63 + 0.2*ROC126 + 0.2*ROC189 + 0.2*ROC252`.
pub fn rs_composite(bars: &[PriceBar], idx: usize) -> Option<f64> {
    RS_WEIGHTS.iter().try_fold(0.0, |acc, (period, weight)| {
        rate_of_change(bars, idx, *period).map(|roc| acc + weight * roc)
    })
}

/// Volume at the bar and its comparison to the preceding 20-bar average.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeMetrics {
    pub breakout_volume: f64,
    pub avg_volume_20d: f64,
    /// Percent above the average, rounded to one decimal
    pub volume_increase_pct: f64,
}

/// Volume metrics for the bar at `idx`; `None` with fewer than 21 bars or a
/// zero average.
pub fn volume_metrics(bars: &[PriceBar], idx: usize) -> Option<VolumeMetrics> {
    if idx >= bars.len() || idx < VOLUME_LOOKBACK {
        return None;
    }
    let avg = bars[idx - VOLUME_LOOKBACK..idx].iter().map(|b| b.volume).mean();
    if avg <= 0.0 || !avg.is_finite() {
        return None;
    }
    let volume = bars[idx].volume;
    let increase = ((volume / avg - 1.0) * 100.0 * 10.0).round() / 10.0;

    Some(VolumeMetrics {
        breakout_volume: volume,
        avg_volume_20d: avg,
        volume_increase_pct: increase,
    })
}
