use crate::infra::{berlin_moment, parse_date, parse_underlying, CUSTOM_EVENTS_FILE};
use chrono::{Datelike, Duration, NaiveDate};
use clap::Args;
use hebelwatch::config::MonitorConfig;
use hebelwatch::error::AppError;
use hebelwatch::market::Underlying;
use hebelwatch::series::{History, SeriesStore};
use hebelwatch::signals::events::rule_calendar;
use hebelwatch::signals::rsi::{relative_strength_index, DEFAULT_PERIOD};
use hebelwatch::signals::{
    Assessment, AssessmentInputs, CalendarEvent, DynamicThresholds, EventCalendar, EventLight,
    JsonFileEventSource, LeverageAssessor,
};
use std::fs;
use std::path::{Path, PathBuf};

const UPCOMING_DAYS: i64 = 14;

#[derive(Args, Debug)]
pub(crate) struct AssessArgs {
    /// Index the series belongs to (e.g. Dax, "S&P 500", SX5E)
    #[arg(long, value_parser = parse_underlying)]
    pub(crate) underlying: Underlying,
    /// Series CSV written by the monitor (hebel_<index>.csv)
    #[arg(long)]
    pub(crate) csv: PathBuf,
    /// Evaluation date for the calendar light (defaults to today)
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// File with one daily close per line, oldest first, for the RSI light
    #[arg(long)]
    pub(crate) rsi_closes: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct CalendarArgs {
    /// Day to evaluate (defaults to today)
    #[arg(long, value_parser = parse_date)]
    pub(crate) date: Option<NaiveDate>,
    /// Index the event light is evaluated for
    #[arg(long, value_parser = parse_underlying)]
    pub(crate) underlying: Option<Underlying>,
    /// Skip the events cache and only print rule-based dates
    #[arg(long)]
    pub(crate) rules_only: bool,
}

pub(crate) fn run_assess(args: AssessArgs) -> Result<(), AppError> {
    let AssessArgs {
        underlying,
        csv,
        today,
        rsi_closes,
    } = args;

    let history = SeriesStore::load_path(&csv)?;
    let now = berlin_moment(today);
    let rsi = match rsi_closes {
        Some(path) => relative_strength_index(&read_closes(&path)?, DEFAULT_PERIOD),
        None => None,
    };

    let assessment = assess_history(underlying, &history, now, rsi);
    render_assessment(&assessment);
    Ok(())
}

fn assess_history(
    underlying: Underlying,
    history: &History,
    now: chrono::DateTime<chrono_tz::Tz>,
    rsi: Option<f64>,
) -> Assessment {
    let thresholds = DynamicThresholds::from_history(history);
    let leverage = history.last_pair().map(|(previous, current)| {
        let (assessment, _) = LeverageAssessor::new().evaluate(previous, current, &thresholds);
        assessment
    });
    let events = rule_calendar(now.year());

    Assessment::build(AssessmentInputs {
        underlying,
        history,
        thresholds,
        leverage,
        events: &events,
        rsi,
        now,
        last_fetch: history.last().map(|row| row.timestamp),
    })
}

fn read_closes(path: &Path) -> Result<Vec<f64>, AppError> {
    let raw = fs::read_to_string(path)?;
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.replace(',', ".")
                .parse::<f64>()
                .map_err(|_| AppError::InvalidInput(format!("'{line}' in {} is not a price", path.display())))
        })
        .collect()
}

fn render_assessment(assessment: &Assessment) {
    println!(
        "HebelWatch assessment for {} ({} observations)",
        assessment.underlying, assessment.observations
    );
    println!(
        "Index change: {}   {}",
        assessment.index.display, assessment.market_comment
    );
    println!(
        "Thresholds: {:?} (short crash {:.1}%, short warning {:.1}%, long push {:.1}%)",
        assessment.thresholds.tier,
        assessment.thresholds.short_crash,
        assessment.thresholds.short_warning,
        assessment.thresholds.long_warn
    );
    println!();

    let lights = [
        ("Light 1 (volatility)", assessment.volatility.light, assessment.volatility.comment.as_str()),
        ("Light 2 (leverage trend)", assessment.leverage_light, assessment.leverage_comment.as_str()),
        ("Light 3 (events)", assessment.events.light, assessment.events.comment.as_str()),
        ("Light 4 (RSI, 14 days)", assessment.rsi.light, assessment.rsi.comment.as_str()),
    ];
    for (title, light, comment) in lights {
        println!("{title:<26} {:<7} {comment}", light.label());
    }

    println!();
    println!("{}", assessment.regime.activity_text);
    if let Some(trend) = &assessment.regime.intraday_trend {
        println!("{trend}");
    }
}

pub(crate) async fn run_calendar(args: CalendarArgs) -> Result<(), AppError> {
    let CalendarArgs {
        date,
        underlying,
        rules_only,
    } = args;

    let day = berlin_moment(date).date_naive();
    let events = if rules_only {
        rule_calendar(day.year())
    } else {
        let config = MonitorConfig::from_env()?;
        EventCalendar::new(&config.events_dir)
            .with_source(JsonFileEventSource::new(config.events_dir.join(CUSTOM_EVENTS_FILE)))
            .events_for(day)
            .await?
    };

    let underlying = underlying.unwrap_or(Underlying::Dax);
    let light = EventLight::evaluate(&events, underlying, day);
    println!("Event light for {underlying} on {day}: {}", light.light.label());
    println!("  {}", light.comment.replace('\n', "\n  "));

    let upcoming = upcoming(&events, underlying, day);
    if !upcoming.is_empty() {
        println!("\nNext {UPCOMING_DAYS} days");
        for event in upcoming {
            println!("  {}  {:<28} {}", event.date, event.text, event.index);
        }
    }
    Ok(())
}

fn upcoming(events: &[CalendarEvent], underlying: Underlying, day: NaiveDate) -> Vec<&CalendarEvent> {
    let until = day + Duration::days(UPCOMING_DAYS);
    let mut upcoming: Vec<&CalendarEvent> = events
        .iter()
        .filter(|event| event.date >= day && event.date <= until && event.concerns(underlying))
        .collect();
    upcoming.sort_by_key(|event| event.date);
    upcoming
}

#[cfg(test)]
mod tests {
    use super::*;
    use hebelwatch::series::Observation;
    use hebelwatch::signals::Light;
    use std::io::Write;

    fn history(rows: &[(f64, f64)]) -> History {
        let start = parse_date("2025-09-24")
            .expect("date")
            .and_hms_opt(10, 0, 0)
            .expect("time");
        History::from_rows(
            rows.iter()
                .enumerate()
                .map(|(i, (long, short))| {
                    Observation::new(start + Duration::seconds(5 * i as i64), *long, *short, 0.2, None)
                })
                .collect(),
        )
    }

    #[test]
    fn offline_assessment_evaluates_last_pair() {
        let now = berlin_moment(Some(parse_date("2025-09-24").expect("date")));
        let assessment = assess_history(Underlying::Dax, &history(&[(10.0, 12.0), (10.0, 12.1)]), now, None);
        assert_eq!(assessment.leverage_light, Light::Green);
        assert_eq!(assessment.events.light, Light::Green);
        assert_eq!(assessment.rsi.light, Light::Gray);
    }

    #[test]
    fn closes_file_accepts_decimal_commas() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "100,5\n101\n\n102.25").expect("write closes");
        assert_eq!(read_closes(file.path()).expect("parsed"), vec![100.5, 101.0, 102.25]);
    }

    #[test]
    fn upcoming_lists_relevant_events_in_order() {
        let day = parse_date("2025-09-15").expect("date");
        let events = rule_calendar(2025);
        let dax: Vec<_> = upcoming(&events, Underlying::Dax, day)
            .into_iter()
            .map(|event| event.date.to_string())
            .collect();
        assert_eq!(dax, vec!["2025-09-17", "2025-09-19", "2025-09-22"]);

        let nasdaq = upcoming(&events, Underlying::Nasdaq, day);
        assert_eq!(nasdaq.len(), 2);
    }
}
