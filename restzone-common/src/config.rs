//! Configuration management for the rest-zone scanner.
//!
//! The scanner reads a single JSON file at `~/.restzone/config.json`.
//! Missing files and missing fields fall back to defaults.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (RESTZONE_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `RESTZONE_LOG_LEVEL` → observability.log_level
//! - `RESTZONE_DATA_DIR` → storage.data_dir
//! - `RESTZONE_BATCH_SIZE` → scan.batch_size
//! - `RESTZONE_MAX_WORKERS` → scan.max_workers
//! - `RESTZONE_LOOKBACK_YEARS` → scan.lookback_years
//! - `RESTZONE_UNIVERSE_FILE` → scan.universe_file
//! - `RESTZONE_REQUIRE_CURRENT_TREND` → scan.require_current_trend

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::util::expand_path;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".restzone"),
        |dirs| dirs.home_dir().join(".restzone"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Scanner configuration root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub detector: DetectorConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration, apply environment overrides and validate.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("RESTZONE_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(dir) = lookup("RESTZONE_DATA_DIR") {
            self.storage.data_dir = dir;
        }
        if let Some(v) = lookup("RESTZONE_BATCH_SIZE").and_then(|v| v.parse().ok()) {
            self.scan.batch_size = v;
        }
        if let Some(v) = lookup("RESTZONE_MAX_WORKERS").and_then(|v| v.parse().ok()) {
            self.scan.max_workers = v;
        }
        if let Some(v) = lookup("RESTZONE_LOOKBACK_YEARS").and_then(|v| v.parse().ok()) {
            self.scan.lookback_years = v;
        }
        if let Some(file) = lookup("RESTZONE_UNIVERSE_FILE") {
            self.scan.universe_file = Some(file);
        }
        if let Some(v) = lookup("RESTZONE_REQUIRE_CURRENT_TREND").and_then(|v| v.parse().ok()) {
            self.scan.require_current_trend = v;
        }
    }

    /// Reject settings the scanner cannot run with.
    pub fn validate(&self) -> crate::Result<()> {
        if self.scan.batch_size == 0 {
            return Err(Error::Config("scan.batch_size must be at least 1".into()));
        }
        if self.scan.max_workers == 0 {
            return Err(Error::Config("scan.max_workers must be at least 1".into()));
        }
        if self.scan.lookback_years == 0 {
            return Err(Error::Config("scan.lookback_years must be at least 1".into()));
        }
        self.detector.validate()
    }

    /// Resolved data directory.
    pub fn data_dir(&self) -> PathBuf {
        expand_path(&self.storage.data_dir)
    }

    /// SQLite database path inside the data directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir().join("restzone.db")
    }

    /// Directory holding the daily summary archive.
    pub fn summary_dir(&self) -> PathBuf {
        self.data_dir().join("daily")
    }
}

// ============================================================================
// Observability
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Storage
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for the price database and summary archive
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> String {
    "~/.restzone/data".into()
}

// ============================================================================
// Market Data Provider
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the chart endpoint
    #[serde(default = "default_provider_url")]
    pub base_url: String,

    /// Per-request timeout
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_url(),
            timeout_secs: default_provider_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_provider_url() -> String {
    "https://query1.finance.yahoo.com/v8/finance/chart".into()
}

fn default_provider_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (compatible; restzone-scanner/0.1)".into()
}

// ============================================================================
// Scan Orchestration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Symbols per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Concurrent symbol workers within a batch
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Years of history kept in the price cache
    #[serde(default = "default_lookback_years")]
    pub lookback_years: u32,

    /// Pause between batches
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,

    /// One symbol per line; first CSV column is used
    #[serde(default)]
    pub universe_file: Option<String>,

    /// Skip symbols whose latest bar fails the weekly trend rule
    #[serde(default = "default_require_current_trend")]
    pub require_current_trend: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_workers: default_max_workers(),
            lookback_years: default_lookback_years(),
            batch_pause_ms: default_batch_pause_ms(),
            universe_file: None,
            require_current_trend: default_require_current_trend(),
        }
    }
}

fn default_batch_size() -> usize {
    50
}

fn default_max_workers() -> usize {
    10
}

fn default_lookback_years() -> u32 {
    10
}

fn default_batch_pause_ms() -> u64 {
    100
}

fn default_require_current_trend() -> bool {
    true
}

// ============================================================================
// Detector Thresholds
// ============================================================================

/// Thresholds for the four detection rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Minimum weekly (close - sma200) / sma200 for the trend filter
    #[serde(default)]
    pub weekly_trend_threshold: f64,

    /// Bars required before a first-time symbol is scanned for setups
    #[serde(default = "default_min_history_bars")]
    pub min_history_bars: usize,

    /// Gap third-bar must fall within this many bars of the setup
    #[serde(default = "default_gap_window")]
    pub gap_window: usize,

    #[serde(default = "default_min_gap_pct")]
    pub min_gap_pct: f64,

    /// Max relative distance of bar-3 open/close from either average
    #[serde(default = "default_ma_proximity")]
    pub ma_proximity: f64,

    /// Max relative distance of the gap midpoint from either average
    #[serde(default = "default_zone_proximity")]
    pub zone_proximity: f64,

    /// Close must exceed resistance by this fraction
    #[serde(default = "default_breakout_threshold")]
    pub breakout_threshold: f64,

    /// Low may dip this fraction below the gap floor before it counts as violated
    #[serde(default = "default_violation_tolerance")]
    pub violation_tolerance: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            weekly_trend_threshold: 0.0,
            min_history_bars: default_min_history_bars(),
            gap_window: default_gap_window(),
            min_gap_pct: default_min_gap_pct(),
            ma_proximity: default_ma_proximity(),
            zone_proximity: default_zone_proximity(),
            breakout_threshold: default_breakout_threshold(),
            violation_tolerance: default_violation_tolerance(),
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> crate::Result<()> {
        if self.gap_window < 3 {
            return Err(Error::Config("detector.gap_window must be at least 3".into()));
        }
        let fractions = [
            ("detector.min_gap_pct", self.min_gap_pct),
            ("detector.ma_proximity", self.ma_proximity),
            ("detector.zone_proximity", self.zone_proximity),
            ("detector.breakout_threshold", self.breakout_threshold),
            ("detector.violation_tolerance", self.violation_tolerance),
        ];
        for (name, value) in fractions {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::Config(format!("{name} must be a non-negative number")));
            }
        }
        Ok(())
    }
}

fn default_min_history_bars() -> usize {
    1000
}

fn default_gap_window() -> usize {
    20
}

fn default_min_gap_pct() -> f64 {
    0.001
}

fn default_ma_proximity() -> f64 {
    0.05
}

fn default_zone_proximity() -> f64 {
    0.10
}

fn default_breakout_threshold() -> f64 {
    0.001
}

fn default_violation_tolerance() -> f64 {
    0.02
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;
    use test_case::test_case;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.scan.batch_size, 50);
        assert_eq!(config.scan.max_workers, 10);
        assert_eq!(config.scan.lookback_years, 10);
        assert!(config.scan.require_current_trend);
        assert_eq!(config.detector.min_history_bars, 1000);
        assert_eq!(config.detector.gap_window, 20);
        assert!((config.detector.violation_tolerance - 0.02).abs() < 1e-12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"scan": {"batch_size": 5}, "detector": {"min_history_bars": 300}}"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.scan.batch_size, 5);
        assert_eq!(config.scan.max_workers, 10);
        assert_eq!(config.detector.min_history_bars, 300);
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("RESTZONE_BATCH_SIZE", "7"),
            ("RESTZONE_MAX_WORKERS", "not-a-number"),
            ("RESTZONE_DATA_DIR", "/tmp/rz"),
            ("RESTZONE_REQUIRE_CURRENT_TREND", "false"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.scan.batch_size, 7);
        assert_eq!(config.scan.max_workers, 10);
        assert!(!config.scan.require_current_trend);
        assert_eq!(config.db_path(), PathBuf::from("/tmp/rz/restzone.db"));
        assert_eq!(config.summary_dir(), PathBuf::from("/tmp/rz/daily"));
    }

    #[test_case(|c: &mut Config| c.scan.batch_size = 0 ; "zero batch size")]
    #[test_case(|c: &mut Config| c.scan.max_workers = 0 ; "zero workers")]
    #[test_case(|c: &mut Config| c.detector.gap_window = 2 ; "tiny gap window")]
    #[test_case(|c: &mut Config| c.detector.violation_tolerance = -0.1 ; "negative tolerance")]
    fn test_validate_rejects(mutate: fn(&mut Config)) {
        let mut config = Config::default();
        mutate(&mut config);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
