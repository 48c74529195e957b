//! Dated summary archive under the data directory.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use restzone_common::util::write_atomic;

use super::summary::DailySummary;

const LATEST_FILE: &str = "latest.json";

pub struct SummaryArchive {
    dir: PathBuf,
}

impl SummaryArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `{scan_date}.json` and `latest.json`, each atomically.
    pub fn save(&self, summary: &DailySummary) -> Result<PathBuf> {
        let body = serde_json::to_vec_pretty(summary)?;
        let dated = self.dir.join(format!("{}.json", summary.scan_date));

        write_atomic(&dated, &body)
            .with_context(|| format!("Failed to write {}", dated.display()))?;
        write_atomic(&self.dir.join(LATEST_FILE), &body)
            .context("Failed to write latest summary")?;

        info!(
            path = %dated.display(),
            today = summary.counts.signals_today,
            recent = summary.counts.signals_recent,
            candidates = summary.counts.candidates,
            "Summary archived"
        );
        Ok(dated)
    }

    pub fn load_latest(&self) -> Result<Option<DailySummary>> {
        self.load_file(&self.dir.join(LATEST_FILE))
    }

    pub fn load(&self, date: chrono::NaiveDate) -> Result<Option<DailySummary>> {
        self.load_file(&self.dir.join(format!("{date}.json")))
    }

    fn load_file(&self, path: &Path) -> Result<Option<DailySummary>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let summary = serde_json::from_str(&content)
            .with_context(|| format!("Corrupt summary {}", path.display()))?;
        Ok(Some(summary))
    }
}
