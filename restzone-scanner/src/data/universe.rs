//! Symbol universe sources.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;

/// Supplies the list of symbols to scan.
#[async_trait]
pub trait UniverseProvider: Send + Sync {
    async fn symbols(&self) -> Result<Vec<String>>;
}

/// Fixed in-memory universe.
#[derive(Debug, Clone, Default)]
pub struct StaticUniverse {
    symbols: Vec<String>,
}

impl StaticUniverse {
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            symbols: symbols.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl UniverseProvider for StaticUniverse {
    async fn symbols(&self) -> Result<Vec<String>> {
        Ok(self.symbols.clone())
    }
}

/// Universe read from a text or CSV file, one symbol per line.
#[derive(Debug, Clone)]
pub struct FileUniverse {
    path: PathBuf,
}

impl FileUniverse {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Parse universe file contents.
///
/// Takes the first comma-separated column of each line, skips blanks and
/// `#` comments, a `symbol`/`ticker` header, and duplicates (first wins).
pub fn parse_universe(contents: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split(',').next())
        .map(|s| s.trim().trim_matches('"').to_string())
        .filter(|s| {
            !s.is_empty() && !s.eq_ignore_ascii_case("symbol") && !s.eq_ignore_ascii_case("ticker")
        })
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

#[async_trait]
impl UniverseProvider for FileUniverse {
    async fn symbols(&self) -> Result<Vec<String>> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read universe file {}", self.path.display()))?;
        Ok(parse_universe(&contents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_universe() {
        let contents = "Symbol,Name\n# watchlist\nAAPL,Apple\n\n MSFT , Microsoft\nAAPL,dup\n\"NVDA\"\n";
        assert_eq!(parse_universe(contents), vec!["AAPL", "MSFT", "NVDA"]);
    }

    #[tokio::test]
    async fn test_file_universe() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("universe.csv");
        std::fs::write(&path, "AAPL\nMSFT\n").unwrap();

        let symbols = FileUniverse::new(&path).symbols().await.unwrap();
        assert_eq!(symbols, vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn test_static_universe() {
        let universe = StaticUniverse::new(["AAPL", "MSFT"]);
        let symbols = tokio_test::block_on(universe.symbols()).unwrap();
        assert_eq!(symbols, vec!["AAPL", "MSFT"]);
    }

    #[tokio::test]
    async fn test_missing_file_errors() {
        let universe = FileUniverse::new("/nonexistent/universe.txt");
        assert!(universe.symbols().await.is_err());
    }
}
