//! Rule 1: weekly trend filter.

use chrono::NaiveDate;

use super::{TrendFailure, TrendResult};
use crate::data::PriceSeries;

/// Weekly `(close - sma200) / sma200` of the last weekly bar on or before
/// `as_of`.
pub fn weekly_deviation(weekly: &PriceSeries, as_of: NaiveDate) -> Option<f64> {
    match evaluate(weekly, as_of, f64::NEG_INFINITY) {
        TrendResult::Pass { deviation } => Some(deviation),
        TrendResult::Fail(_) => None,
    }
}

/// Check the weekly trend as of a daily date.
pub fn evaluate(weekly: &PriceSeries, as_of: NaiveDate, threshold: f64) -> TrendResult {
    let Some(bar) = weekly.last_at_or_before(as_of) else {
        return TrendResult::Fail(TrendFailure::NoWeeklyBar);
    };
    let sma = match bar.sma200 {
        Some(v) if v != 0.0 => v,
        _ => return TrendResult::Fail(TrendFailure::NoAverage),
    };

    let deviation = (bar.close - sma) / sma;
    if deviation < threshold {
        TrendResult::Fail(TrendFailure::BelowThreshold { deviation })
    } else {
        TrendResult::Pass { deviation }
    }
}

pub fn passes(weekly: &PriceSeries, as_of: NaiveDate, threshold: f64) -> bool {
    evaluate(weekly, as_of, threshold).passed()
}
