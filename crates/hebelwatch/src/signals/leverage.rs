//! Trend light: what the issuers' average long/short leverage says about
//! their market expectation.
//!
//! Banks price knock-outs so that their own risk stays small. When they expect
//! a falling market they offer shorts with less leverage, pushing the short
//! average below the long average, and vice versa.

use super::thresholds::DynamicThresholds;
use super::Light;
use crate::series::{LightLogEntry, Observation};
use chrono::NaiveDateTime;
use serde::Serialize;

/// Relative gap (percent of the mean leverage) below which banks count as undecided.
const UNCERTAIN_SPREAD_PCT: f64 = 9.0;
const BOTH_FALLING_HOLD: u32 = 10;
const CROSSOVER_HOLD: u32 = 36;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeverageVerdict {
    BearishBias,
    BullishBias,
    Neutral,
    CrashAlarm,
    EarlyWarning,
    LongPush,
}

impl LeverageVerdict {
    pub const fn light(self) -> Light {
        match self {
            Self::BearishBias | Self::CrashAlarm => Light::Red,
            Self::BullishBias => Light::Green,
            Self::Neutral => Light::Yellow,
            Self::EarlyWarning | Self::LongPush => Light::Orange,
        }
    }

    /// Verdicts that may be held across evaluations.
    pub const fn is_alert(self) -> bool {
        matches!(self, Self::CrashAlarm | Self::EarlyWarning)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Annotation {
    BothFalling,
    Crossover,
    BanksUncertain,
}

impl Annotation {
    pub const fn text(self) -> &'static str {
        match self {
            Self::BothFalling => {
                "Caution: both leverages falling - banks may be withdrawing or expect high volatility"
            }
            Self::Crossover => "Leverage crossover detected - bank positioning has flipped",
            Self::BanksUncertain => {
                "Banks uncertain - small gap between long and short leverage"
            }
        }
    }

    /// Evaluations an alert carrying this annotation stays on the light.
    pub const fn hold(self) -> Option<u32> {
        match self {
            Self::BothFalling => Some(BOTH_FALLING_HOLD),
            Self::Crossover => Some(CROSSOVER_HOLD),
            Self::BanksUncertain => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeverageAssessment {
    pub light: Light,
    pub color: &'static str,
    pub verdict: LeverageVerdict,
    pub rel_delta_long: f64,
    pub rel_delta_short: f64,
    pub annotations: Vec<Annotation>,
    pub comment: String,
    /// Remaining evaluations of a held alert, when this verdict is being held.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub held_for: Option<u32>,
    pub evaluated_at: NaiveDateTime,
}

impl LeverageAssessment {
    pub fn log_entry(&self) -> LightLogEntry {
        LightLogEntry {
            timestamp: self.evaluated_at,
            delta_long: self.rel_delta_long,
            delta_short: self.rel_delta_short,
            ampel: self.light.label().to_string(),
            kommentar: self.comment.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct HeldAlert {
    assessment: LeverageAssessment,
    remaining: u32,
}

/// Stateful evaluator for one underlying.
///
/// Re-evaluating the same observation returns the cached result without
/// advancing the hold counter or crossover tracking.
#[derive(Debug, Clone, Default)]
pub struct LeverageAssessor {
    previous_spread: Option<f64>,
    held: Option<HeldAlert>,
    last: Option<LeverageAssessment>,
}

impl LeverageAssessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates `current` against `previous`. The boolean is `false` when the
    /// result came from the cache.
    pub fn evaluate(
        &mut self,
        previous: &Observation,
        current: &Observation,
        thresholds: &DynamicThresholds,
    ) -> (LeverageAssessment, bool) {
        if let Some(last) = &self.last {
            if last.evaluated_at == current.timestamp {
                return (last.clone(), false);
            }
        }

        let fresh = self.fresh_assessment(previous, current, thresholds);
        let result = self.apply_hold(fresh);
        self.last = Some(result.clone());
        (result, true)
    }

    fn fresh_assessment(
        &mut self,
        previous: &Observation,
        current: &Observation,
        thresholds: &DynamicThresholds,
    ) -> LeverageAssessment {
        let (long_now, long_prev) = (current.long_avg, previous.long_avg);
        let (short_now, short_prev) = (current.short_avg, previous.short_avg);
        let factor = thresholds.leverage_volatility_factor;

        let rel_delta_long = relative_delta(long_now, long_prev) * factor;
        let rel_delta_short = relative_delta(short_now, short_prev) * factor;

        let base = if long_now > short_now {
            LeverageVerdict::BearishBias
        } else if long_now < short_now {
            LeverageVerdict::BullishBias
        } else {
            LeverageVerdict::Neutral
        };

        let verdict = if rel_delta_short <= thresholds.short_crash {
            LeverageVerdict::CrashAlarm
        } else if rel_delta_short <= thresholds.short_warning {
            LeverageVerdict::EarlyWarning
        } else if rel_delta_long >= thresholds.long_warn {
            LeverageVerdict::LongPush
        } else {
            base
        };

        let mut annotations = Vec::new();
        if long_now < long_prev && short_now < short_prev {
            annotations.push(Annotation::BothFalling);
        }

        let spread = short_now - long_now;
        if let Some(previous_spread) = self.previous_spread {
            if previous_spread * spread < 0.0 {
                annotations.push(Annotation::Crossover);
            }
        }
        self.previous_spread = Some(spread);

        let mean_leverage = (short_now.abs() + long_now.abs()) / 2.0;
        if mean_leverage > 0.0 && spread.abs() / mean_leverage * 100.0 < UNCERTAIN_SPREAD_PCT {
            annotations.push(Annotation::BanksUncertain);
        }

        let mut comment = verdict_text(verdict, rel_delta_long, rel_delta_short, thresholds);
        for annotation in &annotations {
            comment.push_str(" | ");
            comment.push_str(annotation.text());
        }

        let light = verdict.light();
        LeverageAssessment {
            light,
            color: light.color(),
            verdict,
            rel_delta_long,
            rel_delta_short,
            annotations,
            comment,
            held_for: None,
            evaluated_at: current.timestamp,
        }
    }

    fn apply_hold(&mut self, fresh: LeverageAssessment) -> LeverageAssessment {
        if fresh.verdict.is_alert() {
            self.held = fresh
                .annotations
                .iter()
                .filter_map(|annotation| annotation.hold())
                .max()
                .map(|remaining| HeldAlert {
                    assessment: fresh.clone(),
                    remaining,
                });
            return fresh;
        }

        let Some(held) = self.held.as_mut() else {
            return fresh;
        };

        held.remaining = held.remaining.saturating_sub(1);
        let remaining = held.remaining;
        let assessment = LeverageAssessment {
            rel_delta_long: fresh.rel_delta_long,
            rel_delta_short: fresh.rel_delta_short,
            held_for: Some(remaining),
            evaluated_at: fresh.evaluated_at,
            ..held.assessment.clone()
        };

        if remaining == 0 {
            self.held = None;
        }
        assessment
    }
}

fn relative_delta(now: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        0.0
    } else {
        (now - previous) / previous * 100.0
    }
}

fn verdict_text(
    verdict: LeverageVerdict,
    rel_delta_long: f64,
    rel_delta_short: f64,
    thresholds: &DynamicThresholds,
) -> String {
    match verdict {
        LeverageVerdict::BearishBias => "Alarm: long leverage above short leverage - banks expect a falling market and offer smaller shorts".to_string(),
        LeverageVerdict::BullishBias => "Positive: short leverage above long leverage - banks expect a rising market and offer smaller longs".to_string(),
        LeverageVerdict::Neutral => "Neutral: long and short leverage equal".to_string(),
        LeverageVerdict::CrashAlarm => format!(
            "Crash alarm: shorts down {:.1}% (volatility {:.1}x)",
            rel_delta_short.abs(),
            thresholds.leverage_volatility_factor
        ),
        LeverageVerdict::EarlyWarning => format!(
            "Early warning: shorts down {:.1}% (threshold {}%)",
            rel_delta_short.abs(),
            thresholds.short_warning
        ),
        LeverageVerdict::LongPush => format!(
            "Long push: {:.1}% (threshold {}%)",
            rel_delta_long, thresholds.long_warn
        ),
    }
}
