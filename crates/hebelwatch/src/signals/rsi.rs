use super::Light;
use serde::Serialize;

pub const DEFAULT_PERIOD: usize = 14;

/// Wilder RSI of the last close.
///
/// Gains and losses are smoothed exponentially with `alpha = 1 / period`,
/// seeded with the first (zero) difference. Returns `None` when fewer closes
/// than `period` are available or when the series never moves.
pub fn relative_strength_index(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let alpha = 1.0 / period as f64;
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;

    for pair in closes.windows(2) {
        let delta = pair[1] - pair[0];
        let gain = delta.max(0.0);
        let loss = (-delta).max(0.0);
        avg_gain = (1.0 - alpha) * avg_gain + alpha * gain;
        avg_loss = (1.0 - alpha) * avg_loss + alpha * loss;
    }

    if avg_loss == 0.0 {
        return (avg_gain > 0.0).then_some(100.0);
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// RSI light over the index's daily closes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RsiLight {
    pub light: Light,
    pub color: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    pub title: &'static str,
    pub comment: String,
}

impl RsiLight {
    pub fn classify(value: Option<f64>) -> Self {
        let (light, title, comment) = match value {
            None => (
                Light::Gray,
                "RSI unavailable",
                "Not enough data for RSI".to_string(),
            ),
            Some(rsi) if rsi >= 70.0 => (
                Light::Red,
                "RSI indicator",
                format!("Risk: crash within 14 days likely! RSI={rsi:.1}%"),
            ),
            Some(rsi) if rsi >= 62.0 => (
                Light::Orange,
                "RSI indicator",
                format!("Warning: market overheated (RSI {rsi:.1}%), crash risk elevated"),
            ),
            Some(rsi) => (
                Light::Green,
                "RSI indicator",
                format!("RSI uncritical ({rsi:.1}%)"),
            ),
        };

        Self {
            light,
            color: light.color(),
            value,
            title,
            comment,
        }
    }

    pub fn from_closes(closes: &[f64]) -> Self {
        Self::classify(relative_strength_index(closes, DEFAULT_PERIOD))
    }
}
