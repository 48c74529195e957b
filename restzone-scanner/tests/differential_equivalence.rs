//! Incremental re-scans must reproduce a full scan of the same data.

mod common;

use restzone_scanner::analysis::{
    AnalysisMode, DifferentialAnalyzer, GapStatus, SetupStatus, SymbolAnalysisState,
};
use test_case::test_case;

use common::{detector_config, pattern_history, truncated};

fn assert_same_entities(a: &SymbolAnalysisState, b: &SymbolAnalysisState) {
    assert_eq!(a.last_updated, b.last_updated);
    assert_eq!(a.market_regime, b.market_regime);
    assert_eq!(a.setups, b.setups);
    assert_eq!(a.gaps, b.gaps);
    assert_eq!(a.signals, b.signals);
}

#[test]
fn test_fixture_produces_every_outcome() {
    let analyzer = DifferentialAnalyzer::new(detector_config());
    let history = pattern_history(240, 7);
    let state = analyzer.analyze("TEST", None, &history).unwrap().state;

    assert!(!state.signals.is_empty());
    assert!(state.gaps.iter().any(|g| g.status == GapStatus::Violated));
    assert!(state.setups.iter().any(|s| s.status == SetupStatus::Consumed));
}

#[test_case(6 ; "split right after warmup")]
#[test_case(33 ; "split between gap and breakout")]
#[test_case(48 ; "split between gap and violation")]
#[test_case(52 ; "split inside a gap window")]
#[test_case(120 ; "split mid history")]
#[test_case(239 ; "one new bar")]
fn test_single_split_matches_full(split: usize) {
    let analyzer = DifferentialAnalyzer::new(detector_config());
    let history = pattern_history(240, 7);

    let full = analyzer.analyze("TEST", None, &history).unwrap();
    let first = analyzer.analyze("TEST", None, &truncated(&history, split)).unwrap();
    let second = analyzer.analyze("TEST", Some(&first.state), &history).unwrap();

    assert_eq!(second.mode, AnalysisMode::Incremental);
    assert_eq!(second.state.version, 2);
    assert_same_entities(&second.state, &full.state);
}

#[test]
fn test_daily_steps_match_full() {
    let analyzer = DifferentialAnalyzer::new(detector_config());
    let history = pattern_history(150, 11);
    let full = analyzer.analyze("TEST", None, &history).unwrap();

    let mut state = analyzer
        .analyze("TEST", None, &truncated(&history, 40))
        .unwrap()
        .state;
    for len in 41..=history.daily.len() {
        let outcome = analyzer
            .analyze("TEST", Some(&state), &truncated(&history, len))
            .unwrap();
        assert!(outcome.persist);
        state = outcome.state;
    }

    assert_eq!(state.version, 1 + (150 - 40) as u64);
    assert_same_entities(&state, &full.state);
}

#[test]
fn test_rerun_is_idempotent() {
    let analyzer = DifferentialAnalyzer::new(detector_config());
    let history = pattern_history(120, 3);

    let first = analyzer.analyze("TEST", None, &history).unwrap();
    let again = analyzer.analyze("TEST", Some(&first.state), &history).unwrap();

    assert_eq!(again.mode, AnalysisMode::UpToDate);
    assert!(!again.persist);
    assert_eq!(again.state, first.state);
}

#[test]
fn test_stale_history_keeps_prior_state() {
    let analyzer = DifferentialAnalyzer::new(detector_config());
    let history = pattern_history(120, 3);
    let first = analyzer.analyze("TEST", None, &history).unwrap();

    let older = analyzer
        .analyze("TEST", Some(&first.state), &truncated(&history, 100))
        .unwrap();
    assert_eq!(older.mode, AnalysisMode::UpToDate);
    assert_eq!(older.state, first.state);
}
