//! Rest-zone gap breakout scanner.
//!
//! Scans a universe of symbols once per trading day for a four-rule pattern:
//!
//! 1. **Trend**: the latest weekly close sits above its 200-period SMA
//! 2. **Setup**: a daily candle's body touches the rest zone between the
//!    daily SMA200 and EMA200
//! 3. **Gap**: within the following window a three-bar gap opens above the
//!    setup (`low[t] > high[t-2]`)
//! 4. **Breakout**: a close clears the highest high between the setup and the
//!    gap without first falling through the gap's lower bound
//!
//! # Architecture
//!
//! ```text
//! UniverseProvider ──► ScanOrchestrator ──► PriceCache ──► MarketDataProvider
//!                            │                  │
//!                            │                  └──► LocalStorage (SQLite)
//!                            ▼
//!                    DifferentialAnalyzer ──► DetectionEngine ──► pattern rules
//!                            │
//!                            ▼
//!                   SummaryAggregator ──► SummaryArchive (daily/*.json)
//! ```
//!
//! Per-symbol state is versioned and replaced atomically. Each run only
//! processes bars newer than the stored watermark, and the result equals a
//! full re-scan of the same data.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod analysis;
pub mod data;
pub mod pattern;
pub mod scanner;

pub use analysis::{AnalysisMode, DifferentialAnalyzer, SymbolAnalysisState};
pub use data::{LocalStorage, PriceCache};
pub use scanner::{DailySummary, ScanOrchestrator, SummaryArchive};
