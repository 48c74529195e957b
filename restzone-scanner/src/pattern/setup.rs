//! Rule 2: rest-zone setup detection.
//!
//! The zone spans the daily 200 SMA and EMA, padded by 20% of its width.
//! Width is the SMA/EMA spread, widened to half the 14-bar ATR when the
//! averages sit close together.

use restzone_common::DetectorConfig;

use super::{trend, RestZone, SetupResult};
use crate::data::indicators::atr_at;
use crate::data::{PriceBar, PriceHistory};

const ZONE_PADDING: f64 = 0.2;
const ATR_WIDTH_FACTOR: f64 = 0.5;

/// Rest zone at `idx`, or `None` while either average is warming up.
pub fn rest_zone(bars: &[PriceBar], idx: usize) -> Option<RestZone> {
    let bar = bars.get(idx)?;
    let (sma, ema) = (bar.sma200?, bar.ema200?);

    let mut width = (sma - ema).abs();
    if let Some(atr) = atr_at(bars, idx).filter(|a| *a > 0.0) {
        width = width.max(atr * ATR_WIDTH_FACTOR);
    }

    Some(RestZone {
        lower: sma.min(ema) - width * ZONE_PADDING,
        upper: sma.max(ema) + width * ZONE_PADDING,
        width,
    })
}

/// Classify a candle against a zone, ignoring the trend filter.
pub fn classify_candle(bar: &PriceBar, zone: RestZone) -> SetupResult {
    let open_in = zone.contains(bar.open);
    let close_in = zone.contains(bar.close);

    match (open_in, close_in) {
        (true, true) => SetupResult::Primary { zone },
        (true, false) | (false, true) if zone.contains(bar.body_center()) => {
            SetupResult::Secondary { zone }
        }
        _ => SetupResult::None,
    }
}

/// Full rule 2 at daily index `idx`: trend filter, averages, zone test.
pub fn classify(history: &PriceHistory, idx: usize, config: &DetectorConfig) -> SetupResult {
    let bars = history.daily.bars();
    let Some(bar) = bars.get(idx) else {
        return SetupResult::None;
    };
    if !trend::passes(&history.weekly, bar.date, config.weekly_trend_threshold) {
        return SetupResult::None;
    }
    match rest_zone(bars, idx) {
        Some(zone) => classify_candle(bar, zone),
        None => SetupResult::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PriceSeries;
    use chrono::NaiveDate;

    fn bar(open: f64, close: f64) -> PriceBar {
        let date = NaiveDate::from_ymd_opt(2024, 3, 6).unwrap();
        let mut b = PriceBar::new(date, open, open.max(close), open.min(close), close, 0.0);
        b.sma200 = Some(100.0);
        b.ema200 = Some(102.0);
        b
    }

    fn zone() -> RestZone {
        // width 2 -> [99.6, 102.4]
        rest_zone(&[bar(101.0, 101.0)], 0).unwrap()
    }

    #[test]
    fn test_zone_without_atr() {
        let z = zone();
        assert!((z.lower - 99.6).abs() < 1e-9);
        assert!((z.upper - 102.4).abs() < 1e-9);
    }

    #[test]
    fn test_primary_and_secondary() {
        let z = zone();
        assert!(matches!(classify_candle(&bar(100.0, 102.0), z), SetupResult::Primary { .. }));
        // open inside, close above, midpoint 102.2 inside
        assert!(matches!(classify_candle(&bar(101.9, 102.5), z), SetupResult::Secondary { .. }));
        // open inside, close far above, midpoint outside
        assert_eq!(classify_candle(&bar(102.0, 106.0), z), SetupResult::None);
        // both outside
        assert_eq!(classify_candle(&bar(95.0, 96.0), z), SetupResult::None);
    }

    #[test]
    fn test_missing_average_is_not_a_setup() {
        let mut b = bar(101.0, 101.0);
        b.ema200 = None;
        assert!(rest_zone(&[b], 0).is_none());
    }

    #[test]
    fn test_trend_filter_gates_setup() {
        let daily = PriceSeries::new(vec![bar(101.0, 101.0)]);
        let monday = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let mut weekly_bar = PriceBar::new(monday, 90.0, 90.0, 90.0, 90.0, 0.0);
        weekly_bar.sma200 = Some(100.0);
        let history = PriceHistory::new(daily.clone(), PriceSeries::new(vec![weekly_bar.clone()]));
        assert_eq!(classify(&history, 0, &DetectorConfig::default()), SetupResult::None);

        weekly_bar.close = 110.0;
        let history = PriceHistory::new(daily, PriceSeries::new(vec![weekly_bar]));
        assert!(matches!(
            classify(&history, 0, &DetectorConfig::default()),
            SetupResult::Primary { .. }
        ));
    }
}
