use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use hebelwatch::config::MonitorConfig;
use hebelwatch::error::AppError;
use hebelwatch::market::{berlin_now, Underlying};
use hebelwatch::monitor::{Dashboard, Monitor};
use hebelwatch::signals::{EventCalendar, JsonFileEventSource};
use hebelwatch::sources::{LeverageSource, MarketDataSource, SnapshotLeverageSource, YahooChartClient};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// File in the events directory holding hand-maintained calendar entries.
pub(crate) const CUSTOM_EVENTS_FILE: &str = "custom_events.json";

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Shared handles behind the HTTP routes.
#[derive(Clone)]
pub(crate) struct WatchServices {
    pub(crate) monitor: Arc<Monitor>,
    pub(crate) dashboard: Arc<Dashboard>,
}

impl WatchServices {
    pub(crate) fn new(
        config: &MonitorConfig,
        quotes: Arc<dyn MarketDataSource>,
        listings: Arc<dyn LeverageSource>,
    ) -> Self {
        let calendar = EventCalendar::new(&config.events_dir)
            .with_source(JsonFileEventSource::new(config.events_dir.join(CUSTOM_EVENTS_FILE)));
        Self {
            monitor: Arc::new(Monitor::new(config, quotes.clone(), listings)),
            dashboard: Arc::new(Dashboard::new(config, calendar, quotes)),
        }
    }

    /// Wires the production sources: Yahoo quotes and scraper snapshots.
    pub(crate) fn from_config(config: &MonitorConfig) -> Result<Self, AppError> {
        let quotes = Arc::new(YahooChartClient::with_base_url(config.quotes_url.clone())?);
        let listings = Arc::new(SnapshotLeverageSource::new(&config.listings_dir));
        Ok(Self::new(config, quotes, listings))
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub(crate) fn parse_underlying(raw: &str) -> Result<Underlying, String> {
    Underlying::parse(raw).ok_or_else(|| {
        let known: Vec<&str> = Underlying::ALL.iter().map(|u| u.label()).collect();
        format!("unknown underlying '{raw}' (expected one of: {})", known.join(", "))
    })
}

/// Midday in Berlin on `day`, or the current Berlin time when no day is given.
pub(crate) fn berlin_moment(day: Option<NaiveDate>) -> DateTime<Tz> {
    day.and_then(|day| day.and_hms_opt(12, 0, 0))
        .and_then(|naive| naive.and_local_timezone(chrono_tz::Europe::Berlin).single())
        .unwrap_or_else(berlin_now)
}
