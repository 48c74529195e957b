//! Property tests over random price paths.

mod common;

use std::collections::HashSet;

use proptest::prelude::*;
use restzone_scanner::analysis::{DifferentialAnalyzer, GapStatus, SetupStatus};
use restzone_scanner::data::{PriceBar, PriceHistory, PriceSeries};

use common::{detector_config, trading_days, truncated, uptrend_weekly};

/// Bars from (open, close, wick) steps around the averages.
fn history_from(steps: &[(f64, f64, f64, f64)]) -> PriceHistory {
    let start = chrono::NaiveDate::from_ymd_opt(2021, 3, 1).unwrap();
    let daily: Vec<PriceBar> = trading_days(start, steps.len())
        .into_iter()
        .zip(steps)
        .map(|(date, (open, close, up, down))| {
            let mut bar = PriceBar::new(
                date,
                *open,
                open.max(*close) + up,
                open.min(*close) - down,
                *close,
                1000.0,
            );
            bar.sma200 = Some(100.0);
            bar.ema200 = Some(101.5);
            bar
        })
        .collect();
    let weekly = uptrend_weekly(&daily);
    PriceHistory::new(PriceSeries::new(daily), PriceSeries::new(weekly))
}

fn steps() -> impl Strategy<Value = Vec<(f64, f64, f64, f64)>> {
    prop::collection::vec((97.0..105.0f64, 97.0..105.0f64, 0.0..1.0f64, 0.0..2.5f64), 30..120)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_gaps_are_valid(steps in steps()) {
        let config = detector_config();
        let analyzer = DifferentialAnalyzer::new(config.clone());
        let state = analyzer.analyze("PROP", None, &history_from(&steps)).unwrap().state;

        let setup_ids: HashSet<_> = state.setups.iter().map(|s| s.id).collect();
        for gap in &state.gaps {
            prop_assert!(gap.gap_percentage >= config.min_gap_pct);
            prop_assert!(gap.upper_bound > gap.lower_bound);
            prop_assert!(setup_ids.contains(&gap.setup_id));
            prop_assert_eq!(gap.violated_date.is_some(), gap.status == GapStatus::Violated);
        }
    }

    #[test]
    fn prop_one_signal_per_setup(steps in steps()) {
        let analyzer = DifferentialAnalyzer::new(detector_config());
        let state = analyzer.analyze("PROP", None, &history_from(&steps)).unwrap().state;

        for setup in &state.setups {
            let signals = state.signals_for_setup(setup.id).count();
            match setup.status {
                SetupStatus::Consumed => prop_assert_eq!(signals, 1),
                SetupStatus::Active => prop_assert_eq!(signals, 0),
            }
            if setup.status == SetupStatus::Consumed {
                prop_assert!(state
                    .gaps
                    .iter()
                    .filter(|g| g.setup_id == setup.id)
                    .all(|g| g.status != GapStatus::Active));
            }
        }
        for signal in &state.signals {
            prop_assert!(signal.breakout_date > signal.gap.formation_date);
            prop_assert_eq!(signal.gap.status, GapStatus::Consumed);
        }
    }

    #[test]
    fn prop_incremental_matches_full(steps in steps(), cut in 0.1..0.9f64) {
        let analyzer = DifferentialAnalyzer::new(detector_config());
        let history = history_from(&steps);
        let split = ((steps.len() as f64 * cut) as usize).max(1);

        let full = analyzer.analyze("PROP", None, &history).unwrap().state;
        let first = analyzer.analyze("PROP", None, &truncated(&history, split)).unwrap().state;
        let second = analyzer.analyze("PROP", Some(&first), &history).unwrap().state;

        prop_assert_eq!(second.setups, full.setups);
        prop_assert_eq!(second.gaps, full.gaps);
        prop_assert_eq!(second.signals, full.signals);
    }
}
