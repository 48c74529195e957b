//! Restzone Scanner - runs one daily scan over the configured universe, or
//! analyzes a single symbol without touching its stored state.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

use restzone_common::config::Config;
use restzone_common::logging::init_logging;
use restzone_common::util::expand_path;
use restzone_scanner::data::{
    FileUniverse, LocalStorageConfig, MarketDataProvider, UniverseProvider, YahooChartProvider,
};
use restzone_scanner::scanner::SymbolScan;
use restzone_scanner::{LocalStorage, PriceCache, ScanOrchestrator, SummaryArchive};

/// Rest-zone gap breakout scanner.
#[derive(Parser, Debug)]
#[command(name = "restzone-scanner")]
#[command(version)]
#[command(about = "Daily rest-zone gap breakout scan", long_about = None)]
struct Cli {
    /// Analyze one symbol and print the result instead of scanning the universe
    #[arg(long)]
    symbol: Option<String>,

    /// Include the chart payload in single-symbol output
    #[arg(long, requires = "symbol")]
    chart: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let startup_start = std::time::Instant::now();

    let config = Config::load_with_env()?;

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("Restzone Scanner v{}", env!("CARGO_PKG_VERSION"));

    let storage = Arc::new(LocalStorage::new(LocalStorageConfig::from_config(&config))?);
    let provider: Arc<dyn MarketDataProvider> =
        Arc::new(YahooChartProvider::new(&config.provider)?);
    // outer bound a little past the HTTP client's own timeout
    let fetch_timeout = Duration::from_secs(config.provider.timeout_secs + 5);
    let cache = Arc::new(PriceCache::new(Arc::clone(&storage), provider, fetch_timeout));

    let orchestrator = ScanOrchestrator::new(cache, config.detector.clone(), config.scan.clone());

    if let Some(symbol) = cli.symbol {
        let symbol = symbol.trim().to_uppercase();
        let scan = orchestrator.analyze_symbol(&symbol).await?;
        println!("{}", render_symbol(&scan, cli.chart)?);
        return Ok(());
    }

    let universe_file = config
        .scan
        .universe_file
        .as_deref()
        .context("No universe configured: set scan.universe_file or RESTZONE_UNIVERSE_FILE")?;
    let universe = FileUniverse::new(expand_path(universe_file));
    let symbols = universe.symbols().await?;

    tracing::info!(
        symbols = symbols.len(),
        duration_ms = startup_start.elapsed().as_millis() as u64,
        "Scanner initialized"
    );

    let summary = tokio::select! {
        summary = orchestrator.run(&symbols) => summary,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, scan abandoned");
            return Ok(());
        }
    };

    SummaryArchive::new(config.summary_dir()).save(&summary)?;

    let stats = storage.get_stats().await?;
    tracing::info!(
        symbols = stats.symbols,
        daily_rows = stats.daily_rows,
        analyzed_symbols = stats.analyzed_symbols,
        "Cache status"
    );
    Ok(())
}

fn render_symbol(scan: &SymbolScan, with_chart: bool) -> Result<String> {
    if scan.state.is_none() {
        tracing::info!(symbol = %scan.symbol, "No analysis: no cached bars or weekly trend not met");
    }
    let chart = scan.chart.as_ref().filter(|_| with_chart);
    let output = serde_json::json!({
        "symbol": scan.symbol,
        "mode": scan.mode.map(|m| m.to_string()),
        "state": scan.state,
        "chart": chart,
    });
    Ok(serde_json::to_string_pretty(&output)?)
}
