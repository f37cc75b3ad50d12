use crate::config::MonitorConfig;
use crate::error::AppError;
use crate::market::Underlying;
use crate::series::{AuditLog, History, SeriesStore};
use crate::signals::events::{rule_calendar, EventCalendar};
use crate::signals::rsi::{relative_strength_index, DEFAULT_PERIOD};
use crate::signals::{
    AlarmTracker, Assessment, AssessmentInputs, DynamicThresholds, LeverageAssessment, LeverageAssessor,
};
use crate::sources::MarketDataSource;
use chrono::{DateTime, Datelike, NaiveDateTime};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

const RSI_RANGE: &str = "3mo";

/// Turns stored series, the calendar and daily closes into assessments.
///
/// Keeps one leverage assessor per underlying and a single alarm tracker, so
/// repeated requests for the same observation neither re-log nor re-alarm.
pub struct Dashboard {
    store: SeriesStore,
    audit: AuditLog,
    calendar: EventCalendar,
    quotes: Arc<dyn MarketDataSource>,
    assessors: Mutex<HashMap<Underlying, LeverageAssessor>>,
    alarm: Mutex<AlarmTracker>,
}

impl Dashboard {
    pub fn new(config: &MonitorConfig, calendar: EventCalendar, quotes: Arc<dyn MarketDataSource>) -> Self {
        Self {
            store: SeriesStore::new(&config.data_dir),
            audit: AuditLog::new(&config.data_dir),
            calendar,
            quotes,
            assessors: Mutex::new(HashMap::new()),
            alarm: Mutex::new(AlarmTracker::new()),
        }
    }

    pub fn history(&self, underlying: Underlying) -> Result<History, AppError> {
        Ok(self.store.load(underlying)?)
    }

    pub async fn assess(
        &self,
        underlying: Underlying,
        now: DateTime<Tz>,
        last_fetch: Option<NaiveDateTime>,
        sound_enabled: bool,
    ) -> Result<Assessment, AppError> {
        let history = self.store.load(underlying)?;
        let thresholds = DynamicThresholds::from_history(&history);
        let leverage = self.leverage(underlying, &history, &thresholds).await;

        let today = now.date_naive();
        let events = match self.calendar.events_for(today).await {
            Ok(events) => events,
            Err(err) => {
                warn!(error = %err, "calendar unavailable, using rule-based dates only");
                rule_calendar(today.year())
            }
        };

        let rsi = match self.quotes.daily_closes(underlying.ticker(), RSI_RANGE).await {
            Ok(closes) => relative_strength_index(&closes, DEFAULT_PERIOD),
            Err(err) => {
                warn!(%underlying, error = %err, "daily closes unavailable for RSI");
                None
            }
        };

        let mut assessment = Assessment::build(AssessmentInputs {
            underlying,
            history: &history,
            thresholds,
            leverage,
            events: &events,
            rsi,
            now,
            last_fetch,
        });
        self.alarm.lock().await.apply(&mut assessment, sound_enabled);
        Ok(assessment)
    }

    async fn leverage(
        &self,
        underlying: Underlying,
        history: &History,
        thresholds: &DynamicThresholds,
    ) -> Option<LeverageAssessment> {
        let (previous, current) = history.last_pair()?;
        let (assessment, fresh) = {
            let mut assessors = self.assessors.lock().await;
            assessors
                .entry(underlying)
                .or_default()
                .evaluate(previous, current, thresholds)
        };

        if fresh {
            if let Err(err) = self.audit.record_light(&assessment.log_entry()) {
                warn!(error = %err, "light log not written");
            }
            if let Err(err) = self.audit.record_index(current.timestamp, current.index_change) {
                warn!(error = %err, "index log not written");
            }
        }
        Some(assessment)
    }

    /// Forgets leverage state and the last alarm pair.
    pub async fn reset(&self) {
        self.assessors.lock().await.clear();
        self.alarm.lock().await.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::fakes::FakeQuotes;
    use crate::series::fixtures::history;
    use crate::signals::{AlarmCue, Light};
    use chrono::TimeZone;
    use chrono_tz::Europe::Berlin;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn config(dir: &Path) -> MonitorConfig {
        MonitorConfig {
            data_dir: dir.join("CSV"),
            events_dir: dir.join("ereignisse"),
            listings_dir: dir.join("listings"),
            quotes_url: "http://quotes.test".into(),
            refresh_secs: 5,
            underlying: Underlying::Dax,
            sound_enabled: true,
        }
    }

    fn now() -> DateTime<Tz> {
        Berlin
            .with_ymd_and_hms(2025, 9, 24, 11, 0, 0)
            .single()
            .expect("unambiguous")
    }

    fn dashboard(dir: &Path, quotes: Arc<FakeQuotes>) -> Dashboard {
        let config = config(dir);
        Dashboard::new(&config, EventCalendar::new(&config.events_dir), quotes)
    }

    fn seed(dir: &Path, rows: &[(f64, f64, f64, Option<f64>)]) {
        let store = SeriesStore::new(dir.join("CSV"));
        for row in history(rows).rows() {
            store.append(Underlying::Dax, row.clone()).expect("append");
        }
    }

    #[tokio::test]
    async fn empty_series_waits_for_data() {
        let dir = tempdir().expect("tempdir");
        let dashboard = dashboard(dir.path(), Arc::new(FakeQuotes::default()));

        let assessment = dashboard
            .assess(Underlying::Dax, now(), None, true)
            .await
            .expect("assessment");
        assert_eq!(assessment.leverage_light, Light::Gray);
        assert_eq!(assessment.rsi.light, Light::Gray);
        assert_eq!(assessment.observations, 0);
        assert!(dir.path().join("ereignisse/events_2025-09-24.json").exists());
    }

    #[tokio::test]
    async fn crash_alarm_is_logged_once_per_observation() {
        let dir = tempdir().expect("tempdir");
        seed(dir.path(), &[(10.0, 12.0, 0.1, None), (10.0, 10.0, -0.3, None)]);
        let dashboard = dashboard(dir.path(), Arc::new(FakeQuotes::default()));

        let first = dashboard
            .assess(Underlying::Dax, now(), None, true)
            .await
            .expect("assessment");
        assert_eq!(first.leverage_light, Light::Red);
        assert_eq!(first.alarm, Some(AlarmCue::Single));

        let second = dashboard
            .assess(Underlying::Dax, now(), None, true)
            .await
            .expect("assessment");
        assert_eq!(second.alarm, None);

        let log = fs::read_to_string(dir.path().join("CSV/log_ampel.csv")).expect("light log");
        assert_eq!(log.lines().count(), 2);
    }

    #[tokio::test]
    async fn rsi_comes_from_daily_closes() {
        let dir = tempdir().expect("tempdir");
        let quotes = Arc::new(FakeQuotes::default());
        let closes: Vec<f64> = (0..40).map(|i| 20000.0 + i as f64 * 25.0).collect();
        quotes.set("^GDAXI", &closes);
        let dashboard = dashboard(dir.path(), quotes);

        let assessment = dashboard
            .assess(Underlying::Dax, now(), None, false)
            .await
            .expect("assessment");
        assert_eq!(assessment.rsi.light, Light::Red);
        assert_eq!(assessment.rsi.value, Some(100.0));
    }
}
