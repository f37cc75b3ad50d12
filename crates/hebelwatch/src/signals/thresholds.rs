use crate::series::History;
use serde::Serialize;

/// Rows needed before the thresholds adapt to observed index volatility.
const ADAPTIVE_MIN_ROWS: usize = 10;
const VOLATILITY_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdTier {
    Default,
    Calm,
    Normal,
    Volatile,
}

/// Leverage-change thresholds scaled to how nervous the index currently is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DynamicThresholds {
    pub tier: ThresholdTier,
    pub short_crash: f64,
    pub short_warning: f64,
    pub long_warn: f64,
    pub bullish: f64,
    pub index_confirm: f64,
    pub leverage_volatility_factor: f64,
    /// Mean |index change| of the last rows, when enough rows exist.
    pub index_volatility: Option<f64>,
    /// Mean absolute relative change of the long/short averages.
    pub leverage_volatility: Option<f64>,
}

impl DynamicThresholds {
    const fn tier(tier: ThresholdTier) -> Self {
        let (short_crash, short_warning, long_warn, bullish, index_confirm, factor) = match tier {
            ThresholdTier::Default => (-10.0, -8.0, 15.0, 10.0, 0.2, 1.0),
            ThresholdTier::Calm => (-8.0, -6.0, 12.0, 8.0, 0.15, 0.8),
            ThresholdTier::Normal => (-10.0, -8.0, 15.0, 10.0, 0.25, 1.0),
            ThresholdTier::Volatile => (-12.0, -10.0, 18.0, 12.0, 0.35, 1.2),
        };
        Self {
            tier,
            short_crash,
            short_warning,
            long_warn,
            bullish,
            index_confirm,
            leverage_volatility_factor: factor,
            index_volatility: None,
            leverage_volatility: None,
        }
    }

    pub const fn standard() -> Self {
        Self::tier(ThresholdTier::Default)
    }

    pub fn from_history(history: &History) -> Self {
        if history.len() < ADAPTIVE_MIN_ROWS {
            return Self::standard();
        }

        let recent = history.tail(VOLATILITY_WINDOW);
        let index_volatility =
            recent.iter().map(|row| row.index_change.abs()).sum::<f64>() / recent.len() as f64;

        let tier = if index_volatility < 0.3 {
            ThresholdTier::Calm
        } else if index_volatility < 0.5 {
            ThresholdTier::Normal
        } else {
            ThresholdTier::Volatile
        };

        Self {
            index_volatility: Some(index_volatility),
            leverage_volatility: leverage_volatility(history),
            ..Self::tier(tier)
        }
    }
}

fn leverage_volatility(history: &History) -> Option<f64> {
    let rows = history.rows();
    let column_mean = |pick: fn(&crate::series::Observation) -> f64| -> Option<f64> {
        let changes: Vec<f64> = rows
            .windows(2)
            .filter_map(|pair| {
                let (previous, current) = (pick(&pair[0]), pick(&pair[1]));
                (previous != 0.0).then(|| ((current - previous) / previous).abs())
            })
            .filter(|change| change.is_finite())
            .collect();
        (!changes.is_empty()).then(|| changes.iter().sum::<f64>() / changes.len() as f64)
    };

    match (column_mean(|row| row.long_avg), column_mean(|row| row.short_avg)) {
        (Some(long), Some(short)) => Some((long + short) / 2.0),
        (Some(single), None) | (None, Some(single)) => Some(single),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::fixtures::history;

    fn flat_history(rows: usize, index_change: f64) -> History {
        let data: Vec<_> = (0..rows).map(|_| (10.0, 12.0, index_change, None)).collect();
        history(&data)
    }

    #[test]
    fn short_history_uses_default_tier() {
        let thresholds = DynamicThresholds::from_history(&flat_history(9, 2.0));
        assert_eq!(thresholds.tier, ThresholdTier::Default);
        assert_eq!(thresholds.short_crash, -10.0);
        assert!(thresholds.index_volatility.is_none());
    }

    #[test]
    fn tier_follows_mean_absolute_index_change() {
        let calm = DynamicThresholds::from_history(&flat_history(12, -0.1));
        assert_eq!(calm.tier, ThresholdTier::Calm);
        assert_eq!(calm.leverage_volatility_factor, 0.8);

        let normal = DynamicThresholds::from_history(&flat_history(12, 0.4));
        assert_eq!(normal.tier, ThresholdTier::Normal);
        assert_eq!(normal.index_confirm, 0.25);

        let volatile = DynamicThresholds::from_history(&flat_history(12, -0.9));
        assert_eq!(volatile.tier, ThresholdTier::Volatile);
        assert_eq!(volatile.short_warning, -10.0);
    }

    #[test]
    fn only_the_last_ten_rows_count() {
        let mut data: Vec<_> = (0..5).map(|_| (10.0, 12.0, 3.0, None)).collect();
        data.extend((0..10).map(|_| (10.0, 12.0, 0.1, None)));
        let thresholds = DynamicThresholds::from_history(&history(&data));
        assert_eq!(thresholds.tier, ThresholdTier::Calm);
    }

    #[test]
    fn leverage_volatility_is_reported() {
        let data: Vec<_> = (0..10)
            .map(|i| (if i % 2 == 0 { 10.0 } else { 11.0 }, 12.0, 0.1, None))
            .collect();
        let thresholds = DynamicThresholds::from_history(&history(&data));
        let value = thresholds.leverage_volatility.expect("computed");
        assert!(value > 0.0 && value < 0.1);
    }
}
