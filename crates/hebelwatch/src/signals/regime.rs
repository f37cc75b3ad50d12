use crate::series::History;
use chrono::Duration;
use serde::Serialize;

const ACTIVITY_MIN_ROWS: usize = 11;
const ACTIVITY_WINDOW: usize = 10;
const TREND_MIN_ROWS: usize = 180;
const TREND_WINDOW: usize = 60;
const SIDEWAYS_RANGE: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    ExtremelyCalm,
    Calm,
    Active,
    HighVolatility,
}

impl Activity {
    pub const fn text(self) -> &'static str {
        match self {
            Self::ExtremelyCalm => "Extremely calm - very low volatility",
            Self::Calm => "Calm market - slight movement",
            Self::Active => "Active - moderate volatility",
            Self::HighVolatility => "High volatility",
        }
    }

    /// Suggested number of rows for a chart window at this activity level.
    pub const fn sample_window(self) -> usize {
        match self {
            Self::ExtremelyCalm => 76,
            Self::Calm => 54,
            Self::Active => 36,
            Self::HighVolatility => 24,
        }
    }
}

/// Market activity and intraday trend derived from the index column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegimeReading {
    pub activity: Activity,
    pub activity_score: f64,
    pub activity_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intraday_trend: Option<String>,
}

impl RegimeReading {
    pub fn evaluate(history: &History) -> Self {
        let activity_score = activity_score(history);
        let activity = if activity_score < 0.15 {
            Activity::ExtremelyCalm
        } else if activity_score < 0.3 {
            Activity::Calm
        } else if activity_score < 0.4 {
            Activity::Active
        } else {
            Activity::HighVolatility
        };

        Self {
            activity,
            activity_score,
            activity_text: format!("Currently: {}", activity.text()),
            intraday_trend: intraday_trend(history),
        }
    }
}

/// Mean absolute relative change of the index column over the last rows, in percent.
fn activity_score(history: &History) -> f64 {
    if history.len() < ACTIVITY_MIN_ROWS {
        return 0.0;
    }

    let values = history.tail(ACTIVITY_WINDOW + 1);
    let changes: Vec<f64> = values
        .windows(2)
        .map(|pair| ((pair[1].index_change - pair[0].index_change) / pair[0].index_change).abs())
        .filter(|change| change.is_finite())
        .collect();

    if changes.is_empty() {
        0.0
    } else {
        changes.iter().sum::<f64>() / changes.len() as f64 * 100.0
    }
}

fn intraday_trend(history: &History) -> Option<String> {
    let (first, last) = (history.rows().first()?, history.last()?);
    if history.len() < TREND_MIN_ROWS || last.timestamp - first.timestamp < Duration::minutes(20) {
        return None;
    }

    let recent = history.tail(TREND_WINDOW);
    let (min, max) = recent
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), row| {
            (lo.min(row.index_change), hi.max(row.index_change))
        });

    (max - min < SIDEWAYS_RANGE).then(|| "Intraday: sideways (< 0.3 %)".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::fixtures::history;

    #[test]
    fn short_history_reads_as_extremely_calm() {
        let reading = RegimeReading::evaluate(&history(&[(10.0, 12.0, 0.5, None); 5]));
        assert_eq!(reading.activity, Activity::ExtremelyCalm);
        assert_eq!(reading.activity_score, 0.0);
        assert!(reading.intraday_trend.is_none());
    }

    #[test]
    fn activity_uses_relative_index_moves() {
        let rows: Vec<_> = (0..12)
            .map(|i| (10.0, 12.0, if i % 2 == 0 { 1.0 } else { 1.0035 }, None))
            .collect();
        let reading = RegimeReading::evaluate(&history(&rows));
        assert_eq!(reading.activity, Activity::Active);
        assert_eq!(reading.activity.sample_window(), 36);
    }

    #[test]
    fn zero_baselines_are_skipped() {
        let mut rows: Vec<_> = (0..11).map(|_| (10.0, 12.0, 0.0, None)).collect();
        rows.push((10.0, 12.0, 0.5, None));
        let reading = RegimeReading::evaluate(&history(&rows));
        assert_eq!(reading.activity_score, 0.0);
    }

    #[test]
    fn long_flat_session_reads_sideways() {
        let rows: Vec<_> = (0..300)
            .map(|i| (10.0, 12.0, 0.1 + (i % 3) as f64 * 0.05, None))
            .collect();
        let reading = RegimeReading::evaluate(&history(&rows));
        assert_eq!(
            reading.intraday_trend.as_deref(),
            Some("Intraday: sideways (< 0.3 %)")
        );
    }

    #[test]
    fn short_time_span_has_no_trend() {
        let rows: Vec<_> = (0..200).map(|_| (10.0, 12.0, 0.1, None)).collect();
        let reading = RegimeReading::evaluate(&history(&rows));
        assert!(reading.intraday_trend.is_none());
    }
}
