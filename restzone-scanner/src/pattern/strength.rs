//! Relative strength.
//!
//! Each symbol gets a weighted rate-of-change composite per bar. A rating
//! ranks one symbol's composite on a given date against every other symbol
//! scanned in the same run that has a bar on that date, and maps the
//! percentile onto 1-99.

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

use crate::data::indicators::rs_composite;
use crate::data::PriceSeries;

/// Composites of the last `bars` daily bars, oldest first. Bars without
/// enough history are left out.
pub fn recent_scores(daily: &PriceSeries, bars: usize) -> Vec<(NaiveDate, f64)> {
    let all = daily.bars();
    (all.len().saturating_sub(bars)..all.len())
        .filter_map(|idx| rs_composite(all, idx).map(|score| (all[idx].date, score)))
        .collect()
}

/// Percentile ratings (1-99) for a set of scores.
///
/// Ties count half. A lone symbol rates 50.
pub fn percentile_ratings(scores: &HashMap<String, f64>) -> HashMap<String, u8> {
    let values: Vec<f64> = scores.values().copied().filter(|v| v.is_finite()).collect();
    let others = values.len().saturating_sub(1);

    scores
        .iter()
        .filter(|(_, score)| score.is_finite())
        .map(|(symbol, score)| {
            let pct = if others == 0 {
                0.5
            } else {
                let below = values.iter().filter(|v| *v < score).count() as f64;
                // self is one of the equal values
                let ties = values.iter().filter(|v| *v == score).count() as f64 - 1.0;
                (below + 0.5 * ties) / others as f64
            };
            let rating = (1.0 + 98.0 * pct).round().clamp(1.0, 99.0) as u8;
            (symbol.clone(), rating)
        })
        .collect()
}

/// Composites collected across a run, grouped by market date.
#[derive(Debug, Default)]
pub struct ScoreBoard {
    by_date: BTreeMap<NaiveDate, HashMap<String, f64>>,
}

impl ScoreBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, symbol: &str, scores: &[(NaiveDate, f64)]) {
        for (date, score) in scores {
            self.by_date
                .entry(*date)
                .or_default()
                .insert(symbol.to_string(), *score);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_date.is_empty()
    }

    /// Rank every recorded date.
    pub fn ratings(&self) -> DailyRatings {
        DailyRatings(
            self.by_date
                .iter()
                .map(|(date, scores)| (*date, percentile_ratings(scores)))
                .collect(),
        )
    }
}

/// Universe ratings per market date.
#[derive(Debug, Default)]
pub struct DailyRatings(HashMap<NaiveDate, HashMap<String, u8>>);

impl DailyRatings {
    pub fn get(&self, symbol: &str, date: NaiveDate) -> Option<u8> {
        self.0.get(&date).and_then(|r| r.get(symbol)).copied()
    }
}
