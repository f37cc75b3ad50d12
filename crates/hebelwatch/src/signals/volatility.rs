use super::Light;
use crate::market::Underlying;
use crate::series::History;
use chrono::NaiveDateTime;
use serde::Serialize;

const MIN_ROWS: usize = 20;
const WINDOW: usize = 654;

/// Volatility light: does the volatility index move more than the index itself?
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolatilityLight {
    pub light: Light,
    pub color: &'static str,
    pub label: &'static str,
    /// Position of the current change inside the window's min/max range.
    pub rel_pos: f64,
    pub comment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub above_index_since: Option<NaiveDateTime>,
}

impl VolatilityLight {
    fn new(light: Light, label: &'static str, rel_pos: f64, comment: String) -> Self {
        Self {
            light,
            color: light.color(),
            label,
            rel_pos,
            comment,
            above_index_since: None,
        }
    }

    pub fn evaluate(history: &History, underlying: Underlying) -> Self {
        let label = underlying.volatility_index().label;

        let volatility = match history.volatility_series() {
            Some(series) if history.len() >= MIN_ROWS => series,
            _ => {
                return Self::new(
                    Light::Gray,
                    label,
                    0.5,
                    format!("Not enough data yet (min. {MIN_ROWS} data points)."),
                )
            }
        };

        let start = volatility.len().saturating_sub(WINDOW);
        let rows = &history.rows()[start..];
        let window = &volatility[start..];

        let v_now = window[window.len() - 1];
        let i_now = rows[rows.len() - 1].index_change;
        let (min, max) = window
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), value| {
                (lo.min(*value), hi.max(*value))
            });
        let rel_pos = if max != min { (v_now - min) / (max - min) } else { 0.5 };
        let details = format!("change: {v_now:.2} %, min: {min:.2} %, max: {max:.2} %");

        if v_now < i_now && rel_pos < 0.6 {
            return Self::new(
                Light::Green,
                label,
                rel_pos,
                format!("{label} - volatility below index - relaxed ({details})"),
            );
        }
        if v_now < i_now && rel_pos >= 0.75 {
            return Self::new(
                Light::Orange,
                label,
                rel_pos,
                format!("{label} - volatility below index (good) but trending up ({details})"),
            );
        }
        if v_now > i_now && rel_pos < 0.45 {
            return Self::new(
                Light::Orange,
                label,
                rel_pos,
                format!("{label} - volatility above index but clearly receding - easing possible ({details})"),
            );
        }
        if v_now > i_now {
            let since = rows
                .iter()
                .zip(window)
                .rev()
                .take_while(|(row, vola)| **vola > row.index_change)
                .last()
                .map(|(row, _)| row.timestamp);
            let since_text = since
                .map(|ts| ts.format("%H:%M").to_string())
                .unwrap_or_else(|| "-".to_string());
            let mut light = Self::new(
                Light::Red,
                label,
                rel_pos,
                format!("{label} - volatility above index - warning! (red since {since_text}, {details})"),
            );
            light.above_index_since = since;
            return light;
        }

        Self::new(
            Light::Yellow,
            label,
            rel_pos,
            format!("{label} - volatility tracking the index - neutral ({details})"),
        )
    }
}
