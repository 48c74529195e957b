//! Incremental price cache synchronisation.
//!
//! A sync reads the symbol's cache metadata, fetches only the missing date
//! range (outside the storage lock), merges it into the stored bars,
//! recomputes the moving averages and replaces the symbol's rows in one
//! transaction. The returned history is always read back from storage.

use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveDate, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use super::indicators::apply_moving_averages;
use super::local_storage::{CacheMetadata, LocalStorage};
use super::provider::MarketDataProvider;
use super::{merge_bars, normalize, week_start, PriceBar, PriceHistory, PriceSeries, Resolution};

/// What a sync has to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPlan {
    /// No cached data: fetch the whole lookback window
    Full { start: NaiveDate },
    /// Cached through an earlier date: fetch the tail
    Delta { start: NaiveDate },
    /// Cache already covers today
    Fresh,
}

impl SyncPlan {
    /// Decide the fetch range from existing metadata.
    pub fn decide(meta: Option<&CacheMetadata>, today: NaiveDate, lookback_years: u32) -> Self {
        match meta {
            None => Self::Full {
                start: lookback_start(today, lookback_years),
            },
            Some(m) if m.last_date < today => Self::Delta {
                start: m.last_date + Duration::days(1),
            },
            Some(_) => Self::Fresh,
        }
    }

    fn start(&self) -> Option<NaiveDate> {
        match self {
            Self::Full { start } | Self::Delta { start } => Some(*start),
            Self::Fresh => None,
        }
    }
}

/// Oldest date retained for a lookback window.
pub fn lookback_start(today: NaiveDate, lookback_years: u32) -> NaiveDate {
    today - Duration::days(365 * i64::from(lookback_years))
}

/// Price cache backed by [`LocalStorage`] and a remote provider.
pub struct PriceCache {
    storage: Arc<LocalStorage>,
    provider: Arc<dyn MarketDataProvider>,
    fetch_timeout: std::time::Duration,
}

impl PriceCache {
    pub fn new(
        storage: Arc<LocalStorage>,
        provider: Arc<dyn MarketDataProvider>,
        fetch_timeout: std::time::Duration,
    ) -> Self {
        Self {
            storage,
            provider,
            fetch_timeout,
        }
    }

    pub fn storage(&self) -> &Arc<LocalStorage> {
        &self.storage
    }

    /// Sync against the local calendar date.
    pub async fn sync(&self, symbol: &str, lookback_years: u32) -> Result<PriceHistory> {
        self.sync_as_of(symbol, lookback_years, Local::now().date_naive())
            .await
    }

    /// Bring the cache up to `today` and return the bounded history.
    pub async fn sync_as_of(
        &self,
        symbol: &str,
        lookback_years: u32,
        today: NaiveDate,
    ) -> Result<PriceHistory> {
        let meta = self.storage.get_cache_metadata(symbol).await?;
        let plan = SyncPlan::decide(meta.as_ref(), today, lookback_years);
        let cutoff = lookback_start(today, lookback_years);

        if let Some(start) = plan.start() {
            debug!(symbol, ?plan, "Syncing price cache");

            let (daily_raw, weekly_raw) = tokio::try_join!(
                self.fetch(symbol, start, today, Resolution::Daily),
                self.fetch(symbol, week_start(start), today, Resolution::Weekly),
            )?;
            let fetched_daily = normalize(daily_raw, Resolution::Daily);
            let fetched_weekly = normalize(weekly_raw, Resolution::Weekly);

            if fetched_daily.is_empty() && fetched_weekly.is_empty() {
                debug!(symbol, ?plan, "Provider returned no new bars");
            } else {
                self.merge_and_store(symbol, cutoff, fetched_daily, fetched_weekly)
                    .await?;
            }
        } else {
            debug!(symbol, "Price cache is current");
        }

        let daily = self
            .storage
            .load_bars(symbol, Resolution::Daily, Some(cutoff))
            .await?;
        let weekly = self
            .storage
            .load_bars(symbol, Resolution::Weekly, Some(week_start(cutoff)))
            .await?;

        Ok(PriceHistory::new(PriceSeries::new(daily), PriceSeries::new(weekly)))
    }

    async fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        resolution: Resolution,
    ) -> Result<Vec<super::RawBar>> {
        let fetched = tokio::time::timeout(
            self.fetch_timeout,
            self.provider.fetch(symbol, start, end, resolution),
        )
        .await
        .map_err(|_| restzone_common::Error::Timeout)
        .with_context(|| format!("{} {resolution} fetch for {symbol} timed out", self.provider.name()))?
        .with_context(|| format!("{} {resolution} fetch for {symbol} failed", self.provider.name()))?;

        Ok(fetched)
    }

    async fn merge_and_store(
        &self,
        symbol: &str,
        cutoff: NaiveDate,
        fetched_daily: Vec<PriceBar>,
        fetched_weekly: Vec<PriceBar>,
    ) -> Result<CacheMetadata> {
        let stored_daily = self
            .storage
            .load_bars(symbol, Resolution::Daily, Some(cutoff))
            .await?;
        let stored_weekly = self
            .storage
            .load_bars(symbol, Resolution::Weekly, Some(week_start(cutoff)))
            .await?;

        let fetched_count = fetched_daily.len();
        let mut daily = merge_bars(stored_daily, fetched_daily);
        daily.retain(|b| b.date >= cutoff);
        let mut weekly = merge_bars(stored_weekly, fetched_weekly);
        weekly.retain(|b| b.date >= week_start(cutoff));

        apply_moving_averages(&mut daily, true);
        apply_moving_averages(&mut weekly, false);

        let meta = self
            .storage
            .replace_history(symbol, &daily, &weekly, Utc::now())
            .await?;

        info!(
            symbol,
            fetched = fetched_count,
            daily = meta.daily_count,
            weekly = meta.weekly_count,
            last_date = %meta.last_date,
            "Price cache updated"
        );
        Ok(meta)
    }
}
