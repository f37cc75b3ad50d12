use super::{LeverageSource, Side, SourceError};
use crate::market::Underlying;
use async_trait::async_trait;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

const MIN_LEVERAGE: f64 = 1.0;
const MAX_LEVERAGE: f64 = 200.0;

/// Average of the first plausible leverage figure in each table row.
///
/// Cells may use a decimal comma; values outside 1..=200 are ignored as they
/// are strike prices, volumes or similar columns.
pub fn average_leverage<R, C>(rows: &[R]) -> Option<f64>
where
    R: AsRef<[C]>,
    C: AsRef<str>,
{
    let values: Vec<f64> = rows
        .iter()
        .filter_map(|row| {
            row.as_ref().iter().find_map(|cell| {
                cell.as_ref()
                    .trim()
                    .replace(',', ".")
                    .parse::<f64>()
                    .ok()
                    .filter(|value| (MIN_LEVERAGE..=MAX_LEVERAGE).contains(value))
            })
        })
        .collect();

    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

/// Parses a scraped percent cell such as `+1,23 %` or `-0.8%`.
pub fn parse_percent(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '%')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    cleaned.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Table rows scraped from one listing provider.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderListing {
    pub name: String,
    #[serde(default)]
    pub long: Vec<Vec<String>>,
    #[serde(default)]
    pub short: Vec<Vec<String>>,
}

impl ProviderListing {
    pub fn rows(&self, side: Side) -> &[Vec<String>] {
        match side {
            Side::Long => &self.long,
            Side::Short => &self.short,
        }
    }
}

/// Providers in preference order; later ones are fallbacks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingSnapshot {
    #[serde(default)]
    pub providers: Vec<ProviderListing>,
    /// Raw change cell of the volatility index page, e.g. `"+2,35 %"`.
    #[serde(default)]
    pub volatility_change: Option<String>,
}

impl ListingSnapshot {
    pub fn volatility_percent(&self) -> Option<f64> {
        let raw = self.volatility_change.as_deref()?;
        let value = parse_percent(raw);
        if value.is_none() {
            warn!(raw, "volatility change in snapshot is not a percentage");
        }
        value
    }

    pub fn average(&self, side: Side) -> Option<f64> {
        self.providers.iter().find_map(|provider| {
            let average = average_leverage(provider.rows(side));
            if average.is_none() {
                debug!(provider = %provider.name, ?side, "no leverage values, trying next provider");
            }
            average
        })
    }
}

/// Reads `<dir>/<slug>.json` snapshots produced by the listing scraper.
#[derive(Debug, Clone)]
pub struct SnapshotLeverageSource {
    dir: PathBuf,
}

impl SnapshotLeverageSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, underlying: Underlying) -> PathBuf {
        self.dir.join(format!("{}.json", underlying.slug()))
    }

    pub fn load(&self, underlying: Underlying) -> Result<Option<ListingSnapshot>, SourceError> {
        let path = self.path(underlying);
        if !path.exists() {
            warn!(path = %path.display(), "no listing snapshot yet");
            return Ok(None);
        }
        let raw = fs::read_to_string(&path).map_err(|source| SourceError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| SourceError::Json { path, source })
    }
}

#[async_trait]
impl LeverageSource for SnapshotLeverageSource {
    async fn average_leverage(&self, underlying: Underlying, side: Side) -> Result<Option<f64>, SourceError> {
        Ok(self
            .load(underlying)?
            .and_then(|snapshot| snapshot.average(side)))
    }

    async fn volatility_change(&self, underlying: Underlying) -> Result<Option<f64>, SourceError> {
        Ok(self
            .load(underlying)?
            .and_then(|snapshot| snapshot.volatility_percent()))
    }
}
