//! Lightweight chart payload stored next to each analysis snapshot.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::state::{GapStatus, SymbolAnalysisState};
use crate::data::PriceHistory;

const VOLUME_UP: &str = "#26a69a";
const VOLUME_DOWN: &str = "#ef5350";
const GAP_ACTIVE: &str = "#FFD700";
const GAP_CONSUMED: &str = "#9370DB";
const GAP_VIOLATED: &str = "#808080";
const SIGNAL_COLOR: &str = "#FF00FF";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandlePoint {
    pub time: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinePoint {
    pub time: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumePoint {
    pub time: NaiveDate,
    pub value: f64,
    pub color: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkerPosition {
    InBar,
    BelowBar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkerShape {
    Circle,
    ArrowUp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartMarker {
    pub time: NaiveDate,
    pub position: MarkerPosition,
    pub color: String,
    pub shape: MarkerShape,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    pub candles: Vec<CandlePoint>,
    pub sma200: Vec<LinePoint>,
    pub ema200: Vec<LinePoint>,
    /// Weekly SMA200 carried forward onto each daily date
    pub weekly_sma200: Vec<LinePoint>,
    pub volume: Vec<VolumePoint>,
    pub markers: Vec<ChartMarker>,
}

impl ChartData {
    /// Build the payload for a snapshot over its cached history.
    pub fn build(state: &SymbolAnalysisState, history: &PriceHistory) -> Self {
        let bars = history.daily.bars();
        let line = |time: NaiveDate, value: Option<f64>| value.map(|value| LinePoint { time, value });

        let mut chart = ChartData {
            candles: bars
                .iter()
                .map(|b| CandlePoint {
                    time: b.date,
                    open: b.open,
                    high: b.high,
                    low: b.low,
                    close: b.close,
                })
                .collect(),
            sma200: bars.iter().filter_map(|b| line(b.date, b.sma200)).collect(),
            ema200: bars.iter().filter_map(|b| line(b.date, b.ema200)).collect(),
            weekly_sma200: bars
                .iter()
                .filter_map(|b| {
                    let weekly = history.weekly.last_at_or_before(b.date)?;
                    line(b.date, weekly.sma200)
                })
                .collect(),
            volume: bars
                .iter()
                .map(|b| VolumePoint {
                    time: b.date,
                    value: b.volume,
                    color: if b.close >= b.open { VOLUME_UP } else { VOLUME_DOWN }.to_string(),
                })
                .collect(),
            markers: Vec::new(),
        };

        // gap marker sits on the middle bar of the three-bar pattern
        for gap in &state.gaps {
            let Some(idx) = history.daily.index_of(gap.formation_date) else {
                continue;
            };
            let Some(middle) = idx.checked_sub(1).and_then(|i| bars.get(i)) else {
                continue;
            };
            let color = match gap.status {
                GapStatus::Active => GAP_ACTIVE,
                GapStatus::Consumed => GAP_CONSUMED,
                GapStatus::Violated | GapStatus::Expired => GAP_VIOLATED,
            };
            chart.markers.push(ChartMarker {
                time: middle.date,
                position: MarkerPosition::InBar,
                color: color.to_string(),
                shape: MarkerShape::Circle,
                text: "Gap".to_string(),
            });
        }

        for signal in &state.signals {
            chart.markers.push(ChartMarker {
                time: signal.breakout_date,
                position: MarkerPosition::BelowBar,
                color: SIGNAL_COLOR.to_string(),
                shape: MarkerShape::ArrowUp,
                text: "Break".to_string(),
            });
        }

        chart.markers.sort_by_key(|m| m.time);
        chart
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::state::{gap_id, setup_id, GapZone};
    use crate::data::{PriceBar, PriceSeries};
    use chrono::Duration;

    #[test]
    fn test_chart_payload() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(); // Monday
        let daily: Vec<PriceBar> = (0..5)
            .map(|i| {
                let mut b = PriceBar::new(start + Duration::days(i), 10.0, 11.0, 9.0, 10.0 + (i as f64 - 2.0), 100.0);
                b.sma200 = (i >= 2).then_some(10.0);
                b
            })
            .collect();
        let mut week = PriceBar::new(start, 10.0, 11.0, 9.0, 10.0, 500.0);
        week.sma200 = Some(9.5);
        let history = PriceHistory::new(PriceSeries::new(daily), PriceSeries::new(vec![week]));

        let mut state = SymbolAnalysisState::new("AAPL", start + Duration::days(4));
        let formation = start + Duration::days(3);
        state.gaps.push(GapZone {
            id: gap_id("AAPL", start, formation),
            setup_id: setup_id("AAPL", start),
            formation_date: formation,
            gap_percentage: 0.01,
            lower_bound: 11.0,
            upper_bound: 11.1,
            status: GapStatus::Violated,
            violated_date: Some(start + Duration::days(4)),
        });

        let chart = ChartData::build(&state, &history);
        assert_eq!(chart.candles.len(), 5);
        assert_eq!(chart.sma200.len(), 3);
        assert!(chart.ema200.is_empty());
        assert_eq!(chart.weekly_sma200.len(), 5);
        assert_eq!(chart.volume[0].color, VOLUME_DOWN);
        assert_eq!(chart.volume[4].color, VOLUME_UP);
        assert_eq!(chart.markers.len(), 1);
        assert_eq!(chart.markers[0].time, start + Duration::days(2));
        assert_eq!(chart.markers[0].color, GAP_VIOLATED);

        let json = serde_json::to_value(&chart).unwrap();
        assert_eq!(json["markers"][0]["position"], "inBar");
        assert_eq!(json["markers"][0]["shape"], "circle");
    }
}
