//! Universe scan: batch orchestration, summary aggregation and archiving.

pub mod archive;
pub mod orchestrator;
pub mod summary;

pub use archive::SummaryArchive;
pub use orchestrator::{
    scan_symbol, ProgressCallback, ScanOptions, ScanOrchestrator, ScanProgress, SymbolScan,
};
pub use summary::{
    business_days_back, DailySummary, EntryKind, FailedSymbol, ScanReport, SummaryAggregator,
    SummaryCounts, SummaryEntry,
};
