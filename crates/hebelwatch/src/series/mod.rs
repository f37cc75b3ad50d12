//! Rolling per-underlying observation series.

mod store;

pub use store::{AuditLog, LightLogEntry, SeriesStore, StoreError};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One poll result for an underlying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    pub long_avg: f64,
    pub short_avg: f64,
    pub index_change: f64,
    #[serde(rename = "short_vs_long_diff_prozent", default)]
    pub short_vs_long_diff_pct: Option<f64>,
    #[serde(default)]
    pub volatility_change: Option<f64>,
}

impl Observation {
    pub fn new(
        timestamp: NaiveDateTime,
        long_avg: f64,
        short_avg: f64,
        index_change: f64,
        volatility_change: Option<f64>,
    ) -> Self {
        let short_vs_long_diff_pct = if long_avg + short_avg > 0.0 && long_avg != 0.0 {
            Some((short_avg / long_avg - 1.0) * 100.0)
        } else {
            None
        };

        Self {
            timestamp,
            long_avg,
            short_avg,
            index_change,
            short_vs_long_diff_pct,
            volatility_change,
        }
    }
}

/// Time-ordered observations, oldest first, bounded by [`History::CAPACITY`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct History {
    rows: Vec<Observation>,
}

impl History {
    pub const CAPACITY: usize = 1000;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<Observation>) -> Self {
        let mut history = Self { rows };
        history.trim();
        history
    }

    pub fn push(&mut self, observation: Observation) {
        self.rows.push(observation);
        self.trim();
    }

    fn trim(&mut self) {
        if self.rows.len() > Self::CAPACITY {
            let excess = self.rows.len() - Self::CAPACITY;
            self.rows.drain(..excess);
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Observation] {
        &self.rows
    }

    pub fn last(&self) -> Option<&Observation> {
        self.rows.last()
    }

    /// The last two observations as `(previous, current)`.
    pub fn last_pair(&self) -> Option<(&Observation, &Observation)> {
        match self.rows.as_slice() {
            [.., previous, current] => Some((previous, current)),
            _ => None,
        }
    }

    /// Up to `n` most recent observations.
    pub fn tail(&self, n: usize) -> &[Observation] {
        let start = self.rows.len().saturating_sub(n);
        &self.rows[start..]
    }

    pub fn index_changes(&self) -> Vec<f64> {
        self.rows.iter().map(|row| row.index_change).collect()
    }

    /// Volatility changes with gaps forward-filled, then leading gaps back-filled.
    /// `None` when no row carries a volatility reading.
    pub fn volatility_series(&self) -> Option<Vec<f64>> {
        let first = self.rows.iter().find_map(|row| row.volatility_change)?;
        let mut carried = first;
        Some(
            self.rows
                .iter()
                .map(|row| {
                    if let Some(value) = row.volatility_change {
                        carried = value;
                    }
                    carried
                })
                .collect(),
        )
    }
}

pub(crate) mod timestamp_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const WRITE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
    const READ_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"];

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format(WRITE_FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
    }

    pub fn parse(raw: &str) -> Option<NaiveDateTime> {
        let trimmed = raw.trim();
        READ_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
    }
}
