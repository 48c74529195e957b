//! Yahoo Finance chart API adapter.
//!
//! Uses the public `v8/finance/chart/{symbol}` endpoint, which returns
//! parallel arrays of timestamps and OHLCV values. Timestamps are shifted by
//! the exchange `gmtoffset` so the calendar date matches the trading day.
//! A bar belonging to the session still in progress is dropped, so the
//! cache never holds a partial day.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use restzone_common::config::ProviderConfig;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::provider::{MarketDataProvider, ProviderError};
use super::{RawBar, Resolution};

/// Retry hint after a 429
const RATE_LIMIT_RETRY_SECS: u64 = 60;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i32,
    #[serde(default)]
    current_trading_period: Option<TradingPeriods>,
}

#[derive(Debug, Deserialize)]
struct TradingPeriods {
    regular: TradingPeriod,
}

/// Epoch seconds bounding the exchange's current regular session.
#[derive(Debug, Clone, Copy, Deserialize)]
struct TradingPeriod {
    start: i64,
    end: i64,
}

impl TradingPeriod {
    /// Whether a row stamped `ts` belongs to a session that is still open.
    fn is_partial(&self, ts: i64, now: i64) -> bool {
        now < self.end && ts >= self.start
    }
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

// ============================================================================
// Adapter
// ============================================================================

/// Chart API client.
pub struct YahooChartProvider {
    client: reqwest::Client,
    base_url: String,
}

impl YahooChartProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ProviderError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn interval(resolution: Resolution) -> &'static str {
        match resolution {
            Resolution::Daily => "1d",
            Resolution::Weekly => "1wk",
        }
    }
}

fn epoch_secs(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

/// Decode a chart response body into raw rows, skipping any row of a
/// session that has not closed by `now` (epoch seconds).
fn parse_chart(body: &str, symbol: &str, now: i64) -> Result<Vec<RawBar>, ProviderError> {
    let envelope: ChartEnvelope = serde_json::from_str(body)
        .map_err(|e| ProviderError::Internal(format!("Failed to parse response: {}", e)))?;

    if let Some(err) = envelope.chart.error {
        let msg = err.description.unwrap_or(err.code.clone());
        return Err(if err.code.eq_ignore_ascii_case("not found") {
            ProviderError::DataNotAvailable(format!("{symbol}: {msg}"))
        } else {
            ProviderError::Internal(msg)
        });
    }

    let Some(result) = envelope.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(Vec::new());
    };

    let offset = FixedOffset::east_opt(result.meta.gmtoffset)
        .ok_or_else(|| ProviderError::Internal(format!("Bad gmtoffset {}", result.meta.gmtoffset)))?;
    let session = result.meta.current_trading_period.map(|p| p.regular);
    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
    let at = |values: &[Option<f64>], i: usize| values.get(i).copied().flatten();

    let rows = result
        .timestamp
        .iter()
        .enumerate()
        .filter(|(_, ts)| !session.is_some_and(|p| p.is_partial(**ts, now)))
        .filter_map(|(i, ts)| {
            let time = DateTime::from_timestamp(*ts, 0)?.with_timezone(&offset);
            Some(RawBar {
                time,
                open: at(&quote.open, i),
                high: at(&quote.high, i),
                low: at(&quote.low, i),
                close: at(&quote.close, i),
                volume: at(&quote.volume, i),
            })
        })
        .collect();

    Ok(rows)
}

#[async_trait]
impl MarketDataProvider for YahooChartProvider {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    async fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        resolution: Resolution,
    ) -> Result<Vec<RawBar>, ProviderError> {
        if end < start {
            return Err(ProviderError::InvalidRequest(format!(
                "end {end} before start {start}"
            )));
        }

        let url = format!("{}/{}", self.base_url, symbol);
        // period2 is exclusive
        let period1 = epoch_secs(start);
        let period2 = epoch_secs(end) + 86_400;

        debug!(symbol, %start, %end, %resolution, "Fetching chart");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", Self::interval(resolution).to_string()),
                ("events", "history".to_string()),
            ])
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Network("Request timeout".into())
                } else if e.is_connect() {
                    ProviderError::Network("Connection failed".into())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ProviderError::Auth(format!("HTTP {}", status)));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited {
                retry_after_secs: Some(RATE_LIMIT_RETRY_SECS),
            });
        }
        if status.is_server_error() {
            return Err(ProviderError::Unavailable(format!("HTTP {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        // 404 bodies still carry a chart.error object
        if status == reqwest::StatusCode::NOT_FOUND {
            return match parse_chart(&body, symbol, Utc::now().timestamp()) {
                Err(e) => Err(e),
                Ok(_) => Err(ProviderError::DataNotAvailable(symbol.to_string())),
            };
        }
        if !status.is_success() {
            return Err(ProviderError::InvalidRequest(format!("HTTP {}: {}", status, body)));
        }

        let rows = parse_chart(&body, symbol, Utc::now().timestamp())?;
        debug!(symbol, rows = rows.len(), %resolution, "Chart fetched");
        Ok(rows)
    }
}
