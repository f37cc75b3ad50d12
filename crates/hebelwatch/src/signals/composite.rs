use super::events::{CalendarEvent, EventLight};
use super::leverage::LeverageAssessment;
use super::regime::RegimeReading;
use super::rsi::RsiLight;
use super::thresholds::DynamicThresholds;
use super::volatility::VolatilityLight;
use super::Light;
use crate::market::{market_status, MarketStatus, Underlying};
use crate::series::{History, Observation};
use chrono::{DateTime, NaiveDateTime};
use chrono_tz::Tz;
use serde::Serialize;

const WAITING_FOR_DATA: &str = "Waiting for data";
const MIN_AXIS_SPAN: f64 = 1.0;
const AXIS_PADDING: f64 = 0.1;

/// Latest index move, coloured by sign.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexSnapshot {
    pub change: Option<f64>,
    pub display: String,
    pub color: &'static str,
}

impl IndexSnapshot {
    pub fn from_history(history: &History) -> Self {
        match history.last() {
            Some(row) => Self {
                change: Some(row.index_change),
                display: format!("{:.2}%", row.index_change),
                color: if row.index_change < 0.0 {
                    "red"
                } else if row.index_change > 0.0 {
                    "green"
                } else {
                    "gray"
                },
            },
            None => Self {
                change: None,
                display: "N/A".to_string(),
                color: "gray",
            },
        }
    }
}

/// Everything one assessment is computed from.
pub struct AssessmentInputs<'a> {
    pub underlying: Underlying,
    pub history: &'a History,
    pub thresholds: DynamicThresholds,
    pub leverage: Option<LeverageAssessment>,
    pub events: &'a [CalendarEvent],
    pub rsi: Option<f64>,
    pub now: DateTime<Tz>,
    pub last_fetch: Option<NaiveDateTime>,
}

/// Full traffic-light picture for one underlying at one moment.
#[derive(Debug, Clone, Serialize)]
pub struct Assessment {
    pub underlying: Underlying,
    pub generated_at: NaiveDateTime,
    pub index: IndexSnapshot,
    pub market_status: MarketStatus,
    pub market_comment: String,
    pub thresholds: DynamicThresholds,
    pub volatility: VolatilityLight,
    pub leverage_light: Light,
    pub leverage_comment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leverage: Option<LeverageAssessment>,
    pub events: EventLight,
    pub rsi: RsiLight,
    pub regime: RegimeReading,
    pub observations: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_fetch: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alarm: Option<AlarmCue>,
}

impl Assessment {
    pub fn build(inputs: AssessmentInputs<'_>) -> Self {
        let AssessmentInputs {
            underlying,
            history,
            thresholds,
            leverage,
            events,
            rsi,
            now,
            last_fetch,
        } = inputs;

        let market_status = market_status(underlying, now);
        let (leverage_light, leverage_comment) = match &leverage {
            Some(assessment) => (assessment.light, assessment.comment.clone()),
            None => (Light::Gray, WAITING_FOR_DATA.to_string()),
        };

        Self {
            underlying,
            generated_at: now.naive_local(),
            index: IndexSnapshot::from_history(history),
            market_comment: market_status.describe(),
            market_status,
            thresholds,
            volatility: VolatilityLight::evaluate(history, underlying),
            leverage_light,
            leverage_comment,
            leverage,
            events: EventLight::evaluate(events, underlying, now.date_naive()),
            rsi: RsiLight::classify(rsi),
            regime: RegimeReading::evaluate(history),
            observations: history.len(),
            last_fetch,
            alarm: None,
        }
    }

    pub fn lights(&self) -> [Light; 4] {
        [
            self.volatility.light,
            self.leverage_light,
            self.events.light,
            self.rsi.light,
        ]
    }
}

/// Audible cue requested by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmCue {
    /// Exactly one of the volatility and leverage lights is red.
    Single,
    /// Both are red.
    Double,
}

/// Emits a cue only when the red state of the volatility/leverage pair changes.
#[derive(Debug, Clone, Default)]
pub struct AlarmTracker {
    previous: Option<(bool, bool)>,
}

impl AlarmTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the current pair; the state advances even while muted.
    pub fn observe(&mut self, volatility_red: bool, leverage_red: bool, sound_enabled: bool) -> Option<AlarmCue> {
        let current = (volatility_red, leverage_red);
        if self.previous == Some(current) {
            return None;
        }
        self.previous = Some(current);

        if !sound_enabled {
            return None;
        }
        match current {
            (true, true) => Some(AlarmCue::Double),
            (true, false) | (false, true) => Some(AlarmCue::Single),
            (false, false) => None,
        }
    }

    /// Applies [`AlarmTracker::observe`] to an assessment's lights.
    pub fn apply(&mut self, assessment: &mut Assessment, sound_enabled: bool) {
        assessment.alarm = self.observe(
            assessment.volatility.light.is_red(),
            assessment.leverage_light.is_red(),
            sound_enabled,
        );
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}

/// Chart data for the leverage/index plot.
#[derive(Debug, Clone, Serialize)]
pub struct ChartFrame<'a> {
    pub underlying: Underlying,
    pub volatility_label: &'static str,
    pub rows: &'a [Observation],
    /// Range of the secondary (percent) axis.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent_axis: Option<(f64, f64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<&'static str>,
}

impl<'a> ChartFrame<'a> {
    pub fn new(underlying: Underlying, history: &'a History, include_volatility: bool) -> Self {
        let placeholder = match history.len() {
            0 => Some("Waiting for first data..."),
            1 => Some("Waiting for enough data..."),
            _ => None,
        };

        let percent_axis = placeholder.is_none().then(|| {
            let mut values = history.index_changes();
            if include_volatility {
                values.extend(history.rows().iter().filter_map(|row| row.volatility_change));
            }
            axis_range(&values)
        });

        Self {
            underlying,
            volatility_label: underlying.volatility_index().label,
            rows: history.rows(),
            percent_axis,
            placeholder,
        }
    }
}

/// Padded axis range that never spans less than one percentage point.
fn axis_range(values: &[f64]) -> (f64, f64) {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), value| {
            (lo.min(*value), hi.max(*value))
        });
    if !min.is_finite() || !max.is_finite() {
        return (-MIN_AXIS_SPAN / 2.0 - AXIS_PADDING, MIN_AXIS_SPAN / 2.0 + AXIS_PADDING);
    }

    if max - min < MIN_AXIS_SPAN {
        let center = (min + max) / 2.0;
        (
            center - MIN_AXIS_SPAN / 2.0 - AXIS_PADDING,
            center + MIN_AXIS_SPAN / 2.0 + AXIS_PADDING,
        )
    } else {
        (min - AXIS_PADDING, max + AXIS_PADDING)
    }
}
