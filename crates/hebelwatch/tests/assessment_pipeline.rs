use chrono::{Duration, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Europe::Berlin;
use hebelwatch::market::Underlying;
use hebelwatch::series::{History, Observation, SeriesStore};
use hebelwatch::signals::events::rule_calendar;
use hebelwatch::signals::leverage::Annotation;
use hebelwatch::signals::{
    Assessment, AssessmentInputs, DynamicThresholds, EventKind, LeverageAssessor, LeverageVerdict, Light,
};
use std::fs;
use tempfile::tempdir;

fn session_start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 9, 19)
        .and_then(|day| day.and_hms_opt(9, 30, 0))
        .expect("valid session start")
}

fn observation(step: i64, long: f64, short: f64, index: f64, vola: f64) -> Observation {
    Observation::new(
        session_start() + Duration::seconds(5 * step),
        long,
        short,
        index,
        Some(vola),
    )
}

#[test]
fn stored_series_drives_all_four_lights() {
    let dir = tempdir().expect("tempdir");
    let store = SeriesStore::new(dir.path());

    for step in 0..24 {
        let vola = if step < 20 { -1.0 } else { 0.8 + step as f64 * 0.05 };
        store
            .append(Underlying::Dax, observation(step, 11.0, 12.5, 0.2, vola))
            .expect("append");
    }
    store
        .append(Underlying::Dax, observation(24, 11.0, 10.6, 0.2, 2.5))
        .expect("append");

    let history = store.load(Underlying::Dax).expect("load");
    assert_eq!(history.len(), 25);

    let thresholds = DynamicThresholds::from_history(&history);
    let (previous, current) = history.last_pair().expect("two rows");
    let mut assessor = LeverageAssessor::new();
    let (leverage, fresh) = assessor.evaluate(previous, current, &thresholds);
    assert!(fresh);
    assert_eq!(leverage.verdict, LeverageVerdict::CrashAlarm);

    let now = Berlin
        .with_ymd_and_hms(2025, 9, 19, 11, 45, 0)
        .single()
        .expect("unambiguous");
    let events = rule_calendar(2025);
    let assessment = Assessment::build(AssessmentInputs {
        underlying: Underlying::Dax,
        history: &history,
        thresholds,
        leverage: Some(leverage),
        events: &events,
        rsi: Some(64.0),
        now,
        last_fetch: Some(current.timestamp),
    });

    assert_eq!(
        assessment.lights(),
        [Light::Red, Light::Red, Light::Red, Light::Orange]
    );
    assert_eq!(assessment.events.events[0].kind, EventKind::TripleWitching);
    assert!(assessment.market_status.open);

    let json = serde_json::to_value(&assessment).expect("serializes");
    assert_eq!(json["underlying"], "Dax");
    assert_eq!(json["volatility"]["light"], "red");
    assert_eq!(json["rsi"]["color"], "#FFA500");
}

#[test]
fn held_alert_survives_a_calm_follow_up() {
    let mut history = History::new();
    history.push(observation(0, 10.0, 12.0, 0.1, 0.0));
    history.push(observation(1, 9.5, 10.5, 0.1, 0.0));
    history.push(observation(2, 9.5, 10.6, 0.1, 0.0));

    let thresholds = DynamicThresholds::standard();
    let mut assessor = LeverageAssessor::new();
    let rows = history.rows();

    let (alarm, _) = assessor.evaluate(&rows[0], &rows[1], &thresholds);
    assert_eq!(alarm.verdict, LeverageVerdict::CrashAlarm);
    assert!(alarm.annotations.contains(&Annotation::BothFalling));

    let (held, _) = assessor.evaluate(&rows[1], &rows[2], &thresholds);
    assert_eq!(held.verdict, LeverageVerdict::CrashAlarm);
    assert_eq!(held.held_for, Some(9));
}

#[test]
fn store_keeps_the_newest_thousand_rows() {
    let dir = tempdir().expect("tempdir");
    let store = SeriesStore::new(dir.path());
    let mut history = History::new();
    for step in 0..1005 {
        history.push(observation(step, 10.0, 12.0, 0.1, 0.0));
    }
    assert_eq!(history.len(), History::CAPACITY);
    assert_eq!(history.rows()[0].timestamp, session_start() + Duration::seconds(25));

    store
        .append(Underlying::Nasdaq, observation(0, 10.0, 12.0, 0.1, 0.0))
        .expect("append");
    store.reset().expect("reset");
    let content = fs::read_to_string(store.path(Underlying::Nasdaq)).expect("header kept");
    assert_eq!(content.lines().count(), 1);
}
