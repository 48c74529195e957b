//! Per-symbol analysis: persisted state, the chronological detection engine,
//! the differential analyzer and the chart payload.

pub mod chart;
pub mod differential;
pub mod engine;
pub mod state;

pub use chart::ChartData;
pub use differential::{AnalysisMode, AnalysisOutcome, DifferentialAnalyzer};
pub use engine::{DetectionEngine, ReplayStats};
pub use state::{
    GapStatus, GapZone, MarketRegime, Setup, SetupStatus, Signal, SymbolAnalysisState,
};
