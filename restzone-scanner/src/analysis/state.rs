//! Persisted per-symbol detection state.
//!
//! A [`SymbolAnalysisState`] is a versioned snapshot. It is only produced by
//! the differential analyzer and replaced as a whole in storage.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pattern::SetupKind;

/// Namespace for deterministic entity ids.
const ID_NAMESPACE: Uuid = Uuid::from_u128(0x6a1c_52f4_9d3e_4b07_8e21_5f0c_a9d4_7b13);

/// Id of the setup a symbol forms on `date`.
pub fn setup_id(symbol: &str, date: NaiveDate) -> Uuid {
    Uuid::new_v5(&ID_NAMESPACE, format!("{symbol}:setup:{date}").as_bytes())
}

/// Id of the gap formed on `formation` after the setup on `setup_date`.
pub fn gap_id(symbol: &str, setup_date: NaiveDate, formation: NaiveDate) -> Uuid {
    Uuid::new_v5(
        &ID_NAMESPACE,
        format!("{symbol}:gap:{setup_date}:{formation}").as_bytes(),
    )
}

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetupStatus {
    Active,
    Consumed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GapStatus {
    Active,
    Consumed,
    Violated,
    /// Formation or setup bar has left the cached lookback window
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setup {
    pub id: Uuid,
    pub date: NaiveDate,
    pub kind: SetupKind,
    pub status: SetupStatus,
    /// Weekly close vs weekly SMA200 on the setup date
    pub weekly_deviation: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapZone {
    pub id: Uuid,
    pub setup_id: Uuid,
    pub formation_date: NaiveDate,
    pub gap_percentage: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub status: GapStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violated_date: Option<NaiveDate>,
}

/// A confirmed breakout. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    #[serde(flatten)]
    pub gap: GapZone,
    pub breakout_date: NaiveDate,
    pub breakout_price: f64,
    pub resistance_price: f64,
    pub breakout_percentage: f64,
    pub breakout_volume: Option<f64>,
    pub avg_volume_20d: Option<f64>,
    pub volume_increase_pct: Option<f64>,
    /// Relative strength composite at the breakout bar
    pub rs_score: Option<f64>,
    /// Percentile of `rs_score` among every symbol scanned on the breakout
    /// date; set once, by the run that first sees the breakout
    #[serde(default)]
    pub rs_rating: Option<u8>,
}

/// Coarse trend label recorded with each snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketRegime {
    /// Latest weekly close at or above its 200 SMA
    Trending,
    Ranging,
}

// ============================================================================
// Snapshot
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolAnalysisState {
    pub symbol: String,
    pub version: u64,
    /// Latest market date already analyzed
    pub last_updated: NaiveDate,
    pub market_regime: MarketRegime,
    pub setups: Vec<Setup>,
    pub gaps: Vec<GapZone>,
    pub signals: Vec<Signal>,
}

impl SymbolAnalysisState {
    /// Empty first-version state.
    pub fn new(symbol: impl Into<String>, last_updated: NaiveDate) -> Self {
        Self {
            symbol: symbol.into(),
            version: 1,
            last_updated,
            market_regime: MarketRegime::Ranging,
            setups: Vec::new(),
            gaps: Vec::new(),
            signals: Vec::new(),
        }
    }

    pub fn setup(&self, id: Uuid) -> Option<&Setup> {
        self.setups.iter().find(|s| s.id == id)
    }

    pub fn active_setups(&self) -> impl Iterator<Item = &Setup> {
        self.setups.iter().filter(|s| s.status == SetupStatus::Active)
    }

    pub fn active_gaps(&self) -> impl Iterator<Item = &GapZone> {
        self.gaps.iter().filter(|g| g.status == GapStatus::Active)
    }

    /// Signals emitted for a setup; at most one.
    pub fn signals_for_setup(&self, setup_id: Uuid) -> impl Iterator<Item = &Signal> {
        self.signals.iter().filter(move |s| s.gap.setup_id == setup_id)
    }
}
