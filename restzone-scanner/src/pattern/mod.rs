//! Pattern detection rules.
//!
//! Four stateless rules evaluated over in-memory price series:
//!
//! 1. [`trend`] - weekly close must sit at or above the weekly 200 SMA
//! 2. [`setup`] - a daily candle rests inside the band around the 200 SMA/EMA
//! 3. [`gap`] - a three-bar upward gap forms shortly after a setup, near the averages
//! 4. [`breakout`] - a close clears the resistance built since the setup,
//!    unless the gap floor is violated first
//!
//! [`strength`] adds the relative strength composite and the universe
//! percentile rating. Every rule answers with a tagged result enum.

pub mod breakout;
pub mod gap;
pub mod setup;
pub mod strength;
pub mod trend;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============================================================================
// Rule Results
// ============================================================================

/// Why a trend check failed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrendFailure {
    /// No weekly bar on or before the date
    NoWeeklyBar,
    /// Weekly SMA200 missing or zero
    NoAverage,
    /// Deviation below the configured threshold
    BelowThreshold { deviation: f64 },
}

/// Rule 1 outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrendResult {
    Pass { deviation: f64 },
    Fail(TrendFailure),
}

impl TrendResult {
    pub fn passed(&self) -> bool {
        matches!(self, Self::Pass { .. })
    }
}

/// Setup strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SetupKind {
    /// Open and close both inside the zone
    Primary,
    /// One of open/close inside and the body midpoint inside
    Secondary,
}

/// Band around the long averages a setup candle must rest in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RestZone {
    pub lower: f64,
    pub upper: f64,
    pub width: f64,
}

impl RestZone {
    pub fn contains(&self, price: f64) -> bool {
        self.lower <= price && price <= self.upper
    }
}

/// Rule 2 outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SetupResult {
    Primary { zone: RestZone },
    Secondary { zone: RestZone },
    None,
}

impl SetupResult {
    pub fn kind(&self) -> Option<SetupKind> {
        match self {
            Self::Primary { .. } => Some(SetupKind::Primary),
            Self::Secondary { .. } => Some(SetupKind::Secondary),
            Self::None => None,
        }
    }
}

/// A qualifying three-bar gap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GapCandidate {
    /// `(upper - lower) / lower`
    pub gap_percentage: f64,
    /// High of the first bar
    pub lower_bound: f64,
    /// Low of the third bar
    pub upper_bound: f64,
}

/// Rule 3 outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GapResult {
    Gap(GapCandidate),
    None,
}

/// Price data of a confirmed breakout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakoutInfo {
    pub date: NaiveDate,
    pub price: f64,
    pub resistance: f64,
    pub breakout_percentage: f64,
}

/// Rule 4 outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BreakoutResult {
    Breakout(BreakoutInfo),
    Violated { date: NaiveDate },
    Pending,
}
