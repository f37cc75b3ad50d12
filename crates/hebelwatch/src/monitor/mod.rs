//! Background polling of the selected underlying and the operator controls
//! around it.

mod dashboard;

pub use dashboard::Dashboard;

use crate::config::{MonitorConfig, MIN_REFRESH_SECS};
use crate::error::AppError;
use crate::market::{berlin_now, Underlying};
use crate::series::{Observation, SeriesStore};
use crate::sources::{percent_change, LastKnownChange, LeverageSource, MarketDataSource, Side};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Index moves at or beyond this many percent are treated as bad quotes.
pub const MAX_INDEX_CHANGE: f64 = 10.0;
const CHANGE_RANGE: &str = "5d";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorState {
    pub underlying: Underlying,
    #[serde(rename = "refresh_secs", serialize_with = "as_secs")]
    pub refresh_interval: Duration,
    pub sound_enabled: bool,
    pub last_fetch: Option<NaiveDateTime>,
}

fn as_secs<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_secs())
}

/// Result of a single poll.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Recorded(Observation),
    MissingInputs {
        long: bool,
        short: bool,
        index: bool,
    },
    IndexOutOfRange(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Running(u64),
    Stopped,
}

/// Owns the polling loop and the operator state it reads from.
pub struct Monitor {
    state: RwLock<MonitorState>,
    store: SeriesStore,
    quotes: Arc<dyn MarketDataSource>,
    listings: Arc<dyn LeverageSource>,
    volatility_feeds: Mutex<HashMap<Underlying, LastKnownChange>>,
    control: watch::Sender<Control>,
    polling: AtomicBool,
}

impl Monitor {
    pub fn new(
        config: &MonitorConfig,
        quotes: Arc<dyn MarketDataSource>,
        listings: Arc<dyn LeverageSource>,
    ) -> Self {
        let (control, _) = watch::channel(Control::Running(0));
        Self {
            state: RwLock::new(MonitorState {
                underlying: config.underlying,
                refresh_interval: config.refresh_interval(),
                sound_enabled: config.sound_enabled,
                last_fetch: None,
            }),
            store: SeriesStore::new(&config.data_dir),
            quotes,
            listings,
            volatility_feeds: Mutex::new(HashMap::new()),
            control,
            polling: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &SeriesStore {
        &self.store
    }

    pub async fn snapshot(&self) -> MonitorState {
        self.state.read().await.clone()
    }

    /// Starts the polling loop; it runs until [`Monitor::stop`] is called.
    /// Only one loop may run at a time.
    pub fn spawn(self: &Arc<Self>) -> Result<JoinHandle<()>, AppError> {
        if self.polling.swap(true, Ordering::AcqRel) {
            return Err(AppError::InvalidInput("monitor loop is already running".to_string()));
        }

        // A stop left over from an earlier loop must not end this one.
        self.control.send_replace(Control::Running(0));
        let monitor = Arc::clone(self);
        let control = self.control.subscribe();
        Ok(tokio::spawn(async move {
            monitor.run(control).await;
            monitor.polling.store(false, Ordering::Release);
        }))
    }

    pub fn stop(&self) {
        self.control.send_replace(Control::Stopped);
    }

    async fn run(&self, mut control: watch::Receiver<Control>) {
        info!("monitor loop started");
        loop {
            if let Err(err) = self.poll_once().await {
                warn!(error = %err, "poll failed");
            }

            let interval = self.state.read().await.refresh_interval;
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = control.changed() => {
                    if changed.is_err() || *control.borrow_and_update() == Control::Stopped {
                        break;
                    }
                    debug!("monitor woken early");
                }
            }
        }
        info!("monitor loop stopped");
    }

    fn wake(&self) {
        self.control.send_modify(|control| {
            if let Control::Running(generation) = control {
                *generation = generation.wrapping_add(1);
            }
        });
    }

    pub async fn poll_once(&self) -> Result<TickOutcome, AppError> {
        self.poll_at(berlin_now().naive_local()).await
    }

    /// Gathers one observation for the selected underlying and stores it
    /// when every required input is present and plausible.
    pub async fn poll_at(&self, now: NaiveDateTime) -> Result<TickOutcome, AppError> {
        let underlying = self.state.read().await.underlying;

        let long = self.leverage(underlying, Side::Long).await;
        let short = self.leverage(underlying, Side::Short).await;
        let index = self.change(underlying.ticker()).await;
        let volatility = {
            let reading = match self.snapshot_volatility(underlying).await {
                Some(change) => Some(change),
                None => self.change(underlying.volatility_index().ticker).await,
            };
            let mut feeds = self.volatility_feeds.lock().await;
            feeds.entry(underlying).or_default().accept(reading)
        };

        let (long_avg, short_avg, index_change) = match (long, short, index) {
            (Some(long), Some(short), Some(index)) => (long, short, index),
            _ => {
                warn!(%underlying, ?long, ?short, ?index, "incomplete inputs, tick skipped");
                return Ok(TickOutcome::MissingInputs {
                    long: long.is_some(),
                    short: short.is_some(),
                    index: index.is_some(),
                });
            }
        };

        if index_change.abs() >= MAX_INDEX_CHANGE {
            warn!(%underlying, index_change, "implausible index change, tick skipped");
            return Ok(TickOutcome::IndexOutOfRange(index_change));
        }

        let observation = Observation::new(now, long_avg, short_avg, index_change, volatility);
        self.store.append(underlying, observation.clone())?;
        self.state.write().await.last_fetch = Some(now);
        info!(%underlying, long_avg, short_avg, index_change, ?volatility, "observation recorded");
        Ok(TickOutcome::Recorded(observation))
    }

    async fn leverage(&self, underlying: Underlying, side: Side) -> Option<f64> {
        match self.listings.average_leverage(underlying, side).await {
            Ok(value) => value,
            Err(err) => {
                warn!(%underlying, ?side, error = %err, "leverage listing unavailable");
                None
            }
        }
    }

    /// Volatility change scraped next to the listings; the quote feed is the fallback.
    async fn snapshot_volatility(&self, underlying: Underlying) -> Option<f64> {
        match self.listings.volatility_change(underlying).await {
            Ok(change) => change,
            Err(err) => {
                warn!(%underlying, error = %err, "volatility snapshot unavailable");
                None
            }
        }
    }

    async fn change(&self, ticker: &str) -> Option<f64> {
        match self.quotes.daily_closes(ticker, CHANGE_RANGE).await {
            Ok(closes) => percent_change(&closes),
            Err(err) => {
                warn!(ticker, error = %err, "quote unavailable");
                None
            }
        }
    }

    pub async fn select_underlying(&self, underlying: Underlying) {
        let changed = {
            let mut state = self.state.write().await;
            let changed = state.underlying != underlying;
            state.underlying = underlying;
            changed
        };
        if changed {
            info!(%underlying, "underlying selected");
            self.wake();
        }
    }

    pub async fn set_refresh_secs(&self, seconds: u64) -> Result<(), AppError> {
        if seconds < MIN_REFRESH_SECS {
            return Err(AppError::InvalidInput(format!(
                "refresh interval must be at least {MIN_REFRESH_SECS} seconds"
            )));
        }
        self.state.write().await.refresh_interval = Duration::from_secs(seconds);
        info!(seconds, "refresh interval changed");
        self.wake();
        Ok(())
    }

    pub async fn set_sound(&self, enabled: bool) {
        self.state.write().await.sound_enabled = enabled;
        debug!(enabled, "sound toggled");
    }

    /// Clears every stored series, the audit logs and the cached volatility.
    pub async fn reset(&self) -> Result<(), AppError> {
        self.store.reset()?;
        self.volatility_feeds.lock().await.clear();
        self.state.write().await.last_fetch = None;
        info!(dir = %self.store.dir().display(), "series reset");
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::{FakeListings, FakeQuotes};
    use super::*;
    use crate::series::fixtures::start;
    use std::path::Path;
    use tempfile::tempdir;

    fn config(dir: &Path) -> MonitorConfig {
        MonitorConfig {
            data_dir: dir.join("CSV"),
            events_dir: dir.join("ereignisse"),
            listings_dir: dir.join("listings"),
            quotes_url: "http://quotes.test".into(),
            refresh_secs: 60,
            underlying: Underlying::Dax,
            sound_enabled: true,
        }
    }

    fn monitor(dir: &Path) -> (Arc<Monitor>, Arc<FakeQuotes>, Arc<FakeListings>) {
        let quotes = Arc::new(FakeQuotes::default());
        let listings = Arc::new(FakeListings::default());
        quotes.set("^GDAXI", &[23000.0, 23115.0]);
        quotes.set("^VDAX", &[20.0, 19.0]);
        listings.set(Underlying::Dax, 10.0, 12.0);
        let monitor = Monitor::new(&config(dir), quotes.clone(), listings.clone());
        (Arc::new(monitor), quotes, listings)
    }

    #[tokio::test]
    async fn complete_tick_is_recorded() {
        let dir = tempdir().expect("tempdir");
        let (monitor, _, _) = monitor(dir.path());

        let outcome = monitor.poll_at(start()).await.expect("tick");
        let TickOutcome::Recorded(observation) = outcome else {
            panic!("expected a recorded observation, got {outcome:?}");
        };
        assert!((observation.index_change - 0.5).abs() < 1e-9);
        assert!((observation.volatility_change.expect("vola") + 5.0).abs() < 1e-9);
        assert!((observation.short_vs_long_diff_pct.expect("spread") - 20.0).abs() < 1e-9);

        assert_eq!(monitor.store().load(Underlying::Dax).expect("load").len(), 1);
        assert_eq!(monitor.snapshot().await.last_fetch, Some(start()));
    }

    #[tokio::test]
    async fn implausible_index_moves_are_discarded() {
        let dir = tempdir().expect("tempdir");
        let (monitor, quotes, _) = monitor(dir.path());
        quotes.set("^GDAXI", &[100.0, 111.0]);

        let outcome = monitor.poll_at(start()).await.expect("tick");
        assert!(matches!(outcome, TickOutcome::IndexOutOfRange(_)));
        assert!(monitor.store().load(Underlying::Dax).expect("load").is_empty());
        assert_eq!(monitor.snapshot().await.last_fetch, None);
    }

    #[tokio::test]
    async fn missing_leverage_skips_the_tick() {
        let dir = tempdir().expect("tempdir");
        let (monitor, _, _) = monitor(dir.path());
        monitor.select_underlying(Underlying::Nasdaq).await;

        let outcome = monitor.poll_at(start()).await.expect("tick");
        assert_eq!(
            outcome,
            TickOutcome::MissingInputs {
                long: false,
                short: false,
                index: false
            }
        );
    }

    #[tokio::test]
    async fn volatility_dropout_reuses_last_reading() {
        let dir = tempdir().expect("tempdir");
        let (monitor, quotes, _) = monitor(dir.path());
        monitor.poll_at(start()).await.expect("first tick");

        quotes.clear("^VDAX");
        let outcome = monitor
            .poll_at(start() + chrono::Duration::seconds(5))
            .await
            .expect("second tick");
        let TickOutcome::Recorded(observation) = outcome else {
            panic!("expected a recorded observation");
        };
        assert!((observation.volatility_change.expect("carried") + 5.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn scraped_volatility_wins_over_quotes() {
        let dir = tempdir().expect("tempdir");
        let (monitor, quotes, listings) = monitor(dir.path());
        quotes.clear("^VDAX");
        listings.set_volatility(Underlying::Dax, 2.4);

        let outcome = monitor.poll_at(start()).await.expect("tick");
        let TickOutcome::Recorded(observation) = outcome else {
            panic!("expected a recorded observation");
        };
        assert_eq!(observation.volatility_change, Some(2.4));
    }

    #[tokio::test]
    async fn interval_below_minimum_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let (monitor, _, _) = monitor(dir.path());

        let err = monitor.set_refresh_secs(4).await.expect_err("too short");
        assert!(matches!(err, AppError::InvalidInput(_)));
        monitor.set_refresh_secs(15).await.expect("accepted");
        assert_eq!(monitor.snapshot().await.refresh_interval, Duration::from_secs(15));
    }

    #[tokio::test]
    async fn reset_clears_series_and_last_fetch() {
        let dir = tempdir().expect("tempdir");
        let (monitor, _, _) = monitor(dir.path());
        monitor.poll_at(start()).await.expect("tick");

        monitor.reset().await.expect("reset");
        assert!(monitor.store().load(Underlying::Dax).expect("load").is_empty());
        assert_eq!(monitor.snapshot().await.last_fetch, None);
    }

    #[tokio::test]
    async fn switching_underlying_wakes_the_loop() {
        let dir = tempdir().expect("tempdir");
        let (monitor, quotes, listings) = monitor(dir.path());
        quotes.set("^GSPC", &[6000.0, 6030.0]);
        listings.set(Underlying::Sp500, 14.0, 11.0);

        let handle = monitor.spawn().expect("first loop");
        wait_for_rows(&monitor, Underlying::Dax).await;

        monitor.select_underlying(Underlying::Sp500).await;
        wait_for_rows(&monitor, Underlying::Sp500).await;

        monitor.stop();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop stops")
            .expect("loop task joins");
    }

    #[tokio::test]
    async fn only_one_loop_runs_and_restart_after_stop_works() {
        let dir = tempdir().expect("tempdir");
        let (monitor, _, _) = monitor(dir.path());

        monitor.stop();
        let handle = monitor.spawn().expect("stale stop is ignored");
        assert!(matches!(monitor.spawn(), Err(AppError::InvalidInput(_))));
        wait_for_rows(&monitor, Underlying::Dax).await;
        assert!(!handle.is_finished());

        monitor.stop();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop stops")
            .expect("loop task joins");

        let restarted = monitor.spawn().expect("restart after stop");
        monitor.stop();
        tokio::time::timeout(Duration::from_secs(5), restarted)
            .await
            .expect("restarted loop stops")
            .expect("loop task joins");
    }

    async fn wait_for_rows(monitor: &Monitor, underlying: Underlying) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if !monitor.store().load(underlying).expect("load").is_empty() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("observation recorded in time");
    }
}
