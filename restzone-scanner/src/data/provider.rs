//! Market data provider abstraction.
//!
//! The price cache only depends on this trait, so the remote source can be
//! swapped (or mocked in tests) without touching the sync logic.

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use super::{RawBar, Resolution};

// ============================================================================
// Provider Error
// ============================================================================

/// Errors specific to data providers.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Connection failed or the request timed out
    #[error("Network error: {0}")]
    Network(String),

    /// Credentials rejected
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Rate limited{}", retry_suffix(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    /// Unknown symbol or no data for the range
    #[error("Data not available: {0}")]
    DataNotAvailable(String),

    /// Provider is temporarily unavailable
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Response could not be decoded
    #[error("Internal error: {0}")]
    Internal(String),
}

fn retry_suffix(retry_after_secs: &Option<u64>) -> String {
    retry_after_secs
        .map(|secs| format!(", retry after {secs} seconds"))
        .unwrap_or_default()
}

impl ProviderError {
    /// Check if the error is recoverable (worth retrying on a later run)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimited { .. } | Self::Unavailable(_)
        )
    }
}

impl From<ProviderError> for restzone_common::Error {
    fn from(err: ProviderError) -> Self {
        restzone_common::Error::Provider(err.to_string())
    }
}

// ============================================================================
// Provider Trait
// ============================================================================

/// Source of historical OHLCV rows.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &'static str;

    /// Fetch rows for `symbol` with dates in `[start, end]`.
    ///
    /// Rows may be unsorted, duplicated or incomplete; callers normalise.
    async fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        resolution: Resolution,
    ) -> Result<Vec<RawBar>, ProviderError>;
}
