//! Traffic-light signal engine.
//!
//! Four independent lights are derived from the stored series and the calendar:
//! volatility (1), leverage trend (2), calendar events (3) and RSI (4). The
//! [`composite`] module aggregates them into one [`Assessment`].

pub mod composite;
pub mod events;
pub mod leverage;
pub mod regime;
pub mod rsi;
pub mod thresholds;
pub mod volatility;

pub use composite::{AlarmCue, AlarmTracker, Assessment, AssessmentInputs, ChartFrame, IndexSnapshot};
pub use events::{
    CalendarError, CalendarEvent, EventCalendar, EventKind, EventLight, EventSource, JsonFileEventSource,
};
pub use leverage::{LeverageAssessment, LeverageAssessor, LeverageVerdict};
pub use regime::{Activity, RegimeReading};
pub use rsi::RsiLight;
pub use thresholds::DynamicThresholds;
pub use volatility::VolatilityLight;

use serde::{Serialize, Serializer};

/// Colour of a single traffic light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Light {
    Green,
    Yellow,
    Orange,
    Red,
    Gray,
}

impl Light {
    /// CSS colour the dashboard paints the light with.
    pub const fn color(self) -> &'static str {
        match self {
            Self::Green => "#90EE90",
            Self::Yellow => "yellow",
            Self::Orange => "#FFA500",
            Self::Red => "red",
            Self::Gray => "gray",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Orange => "orange",
            Self::Red => "red",
            Self::Gray => "gray",
        }
    }

    pub const fn is_red(self) -> bool {
        matches!(self, Self::Red)
    }
}

impl Serialize for Light {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}
