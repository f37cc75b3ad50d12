//! Market calendar: rule-based dates, pluggable event sources and the
//! daily JSON cache behind the event light.

use super::Light;
use crate::market::{canonical_index, Underlying};
use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

const FOMC_2025: [&str; 8] = [
    "2025-01-29",
    "2025-03-19",
    "2025-05-07",
    "2025-06-18",
    "2025-07-30",
    "2025-09-17",
    "2025-11-05",
    "2025-12-17",
];

const ECB_2025: [&str; 8] = [
    "2025-01-23",
    "2025-03-13",
    "2025-04-10",
    "2025-06-12",
    "2025-07-17",
    "2025-09-11",
    "2025-10-30",
    "2025-12-11",
];

const EXPIRY_MONTHS: [u32; 4] = [3, 6, 9, 12];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "FED")]
    Fed,
    #[serde(rename = "ECB")]
    Ecb,
    TripleWitching,
    Rebalancing,
    IndexNotice,
    Earnings,
    #[serde(rename = "CPI")]
    Cpi,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub text: String,
    #[serde(default = "all_indices")]
    pub index: String,
}

fn all_indices() -> String {
    "ALL".to_string()
}

impl CalendarEvent {
    pub fn new(date: NaiveDate, kind: EventKind, text: impl Into<String>, index: &str) -> Self {
        Self {
            date,
            kind,
            text: text.into(),
            index: canonical_index(index),
        }
    }

    /// Whether the event matters for `underlying`: market-wide events,
    /// events on the same index, and every inflation print.
    pub fn concerns(&self, underlying: Underlying) -> bool {
        let index = canonical_index(&self.index);
        index == "ALL" || index == underlying.canonical_index() || self.kind == EventKind::Cpi
    }
}

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("calendar cache io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("calendar cache {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("event source {name} failed: {message}")]
    Source { name: String, message: String },
}

pub fn third_friday(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, Weekday::Fri, 3)
}

/// Quarterly expiry of futures and options (third Friday of Mar/Jun/Sep/Dec).
pub fn triple_witching(year: i32) -> Vec<CalendarEvent> {
    EXPIRY_MONTHS
        .iter()
        .filter_map(|month| third_friday(year, *month))
        .map(|date| {
            CalendarEvent::new(date, EventKind::TripleWitching, "Quarterly expiry (triple witching)", "ALL")
        })
        .collect()
}

/// DAX index rebalancing, assumed for the Monday after each expiry.
pub fn dax_rebalancing(year: i32) -> Vec<CalendarEvent> {
    EXPIRY_MONTHS
        .iter()
        .filter_map(|month| third_friday(year, *month))
        .map(|friday| {
            CalendarEvent::new(
                friday + Duration::days(3),
                EventKind::Rebalancing,
                "DAX/MDAX rebalancing (heuristic)",
                "DAX",
            )
        })
        .collect()
}

fn rate_decisions(year: i32) -> Vec<CalendarEvent> {
    if year != 2025 {
        return Vec::new();
    }

    let fed = FOMC_2025
        .iter()
        .map(|raw| (*raw, EventKind::Fed, "FED rate decision"));
    let ecb = ECB_2025
        .iter()
        .map(|raw| (*raw, EventKind::Ecb, "ECB rate decision"));

    fed.chain(ecb)
        .filter_map(|(raw, kind, text)| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .map(|date| CalendarEvent::new(date, kind, text, "ALL"))
        })
        .collect()
}

/// Events that can be derived without any network access.
pub fn rule_calendar(year: i32) -> Vec<CalendarEvent> {
    let mut events = rate_decisions(year);
    events.extend(triple_witching(year));
    events.extend(dax_rebalancing(year));
    events.sort_by_key(|event| event.date);
    events
}

/// Supplier of additional calendar entries (index reviews, earnings, CPI).
#[async_trait]
pub trait EventSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, year: i32) -> Result<Vec<CalendarEvent>, CalendarError>;
}

/// Reads hand-maintained or externally scraped events from a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileEventSource {
    path: PathBuf,
}

impl JsonFileEventSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl EventSource for JsonFileEventSource {
    fn name(&self) -> &str {
        "json-file"
    }

    async fn fetch(&self, year: i32) -> Result<Vec<CalendarEvent>, CalendarError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let events = read_events(&self.path)?;
        Ok(events
            .into_iter()
            .filter(|event| event.date.year() == year)
            .collect())
    }
}

fn read_events(path: &Path) -> Result<Vec<CalendarEvent>, CalendarError> {
    let raw = fs::read_to_string(path).map_err(|source| CalendarError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| CalendarError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Day-scoped calendar: served from `events_<date>.json` when present,
/// otherwise assembled from the rules and every source, then cached.
pub struct EventCalendar {
    dir: PathBuf,
    sources: Vec<Box<dyn EventSource>>,
}

impl EventCalendar {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            sources: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: impl EventSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn cache_path(&self, day: NaiveDate) -> PathBuf {
        self.dir.join(format!("events_{}.json", day.format("%Y-%m-%d")))
    }

    pub async fn events_for(&self, day: NaiveDate) -> Result<Vec<CalendarEvent>, CalendarError> {
        let path = self.cache_path(day);
        if path.exists() {
            match read_events(&path) {
                Ok(events) => {
                    debug!(path = %path.display(), count = events.len(), "calendar served from cache");
                    return Ok(events);
                }
                Err(err) => warn!(error = %err, "discarding unreadable calendar cache"),
            }
        }

        let mut events = rule_calendar(day.year());
        for source in &self.sources {
            match source.fetch(day.year()).await {
                Ok(extra) => events.extend(extra),
                Err(err) => warn!(source = source.name(), error = %err, "event source skipped"),
            }
        }

        self.store(&path, &events)?;
        info!(path = %path.display(), count = events.len(), "calendar assembled");
        Ok(events)
    }

    fn store(&self, path: &Path, events: &[CalendarEvent]) -> Result<(), CalendarError> {
        fs::create_dir_all(&self.dir).map_err(|source| CalendarError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let body = serde_json::to_string_pretty(events).map_err(|source| CalendarError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, body).map_err(|source| CalendarError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Event light: red for relevant events today, yellow for tomorrow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventLight {
    pub light: Light,
    pub color: &'static str,
    pub comment: String,
    pub events: Vec<CalendarEvent>,
}

impl EventLight {
    pub fn evaluate(events: &[CalendarEvent], underlying: Underlying, today: NaiveDate) -> Self {
        let tomorrow = today + Duration::days(1);
        let relevant = |day: NaiveDate| -> Vec<CalendarEvent> {
            events
                .iter()
                .filter(|event| event.date == day && event.concerns(underlying))
                .cloned()
                .collect()
        };

        let (light, matched) = match relevant(today) {
            hits if !hits.is_empty() => (Light::Red, hits),
            _ => match relevant(tomorrow) {
                hits if !hits.is_empty() => (Light::Yellow, hits),
                _ => (Light::Green, Vec::new()),
            },
        };

        let comment = if matched.is_empty() {
            "No market-relevant events.".to_string()
        } else {
            matched
                .iter()
                .map(|event| format!("{} ({})", event.text, event.date))
                .collect::<Vec<_>>()
                .join("\n")
        };

        Self {
            light,
            color: light.color(),
            comment,
            events: matched,
        }
    }
}
