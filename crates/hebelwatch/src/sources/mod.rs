//! Upstream data feeds: index and volatility quotes, plus the knock-out
//! listings the leverage averages are computed from.

mod listings;
mod quotes;

pub use listings::{average_leverage, parse_percent, ListingSnapshot, ProviderListing, SnapshotLeverageSource};
pub use quotes::YahooChartClient;

use crate::market::Underlying;
use async_trait::async_trait;
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("malformed quote payload for {ticker}: {message}")]
    Payload { ticker: String, message: String },
    #[error("listing snapshot {path} unreadable: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("listing snapshot {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Daily closing prices for a ticker, oldest first.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn daily_closes(&self, ticker: &str, range: &str) -> Result<Vec<f64>, SourceError>;
}

/// Knock-out side a leverage average is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Long,
    Short,
}

#[async_trait]
pub trait LeverageSource: Send + Sync {
    /// Average leverage of the listed products, `None` when no provider has any.
    async fn average_leverage(&self, underlying: Underlying, side: Side) -> Result<Option<f64>, SourceError>;

    /// Daily percent change of the underlying's volatility index, when the
    /// listing scraper captured one alongside the tables.
    async fn volatility_change(&self, _underlying: Underlying) -> Result<Option<f64>, SourceError> {
        Ok(None)
    }
}

/// Percent change between the last two closes.
pub fn percent_change(closes: &[f64]) -> Option<f64> {
    let [previous, current] = closes.get(closes.len().checked_sub(2)?..)? else {
        return None;
    };
    if *previous == 0.0 {
        return None;
    }
    Some((current - previous) / previous * 100.0)
}

/// Remembers the last usable change of a feed that sometimes drops out.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastKnownChange {
    last: Option<f64>,
}

impl LastKnownChange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts a fresh reading. Missing readings and a 0.0 that follows a
    /// non-zero value are treated as stale and answered with the last value.
    pub fn accept(&mut self, reading: Option<f64>) -> Option<f64> {
        match reading {
            None => self.last,
            Some(value) if value == 0.0 && self.last.is_some_and(|last| last != 0.0) => self.last,
            Some(value) => {
                self.last = Some(value);
                Some(value)
            }
        }
    }

    pub fn last(&self) -> Option<f64> {
        self.last
    }
}
