//! Catalogue of the watched indices and their trading sessions.

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Europe::Berlin;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index whose knock-out listings are monitored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Underlying {
    #[serde(rename = "Dax", alias = "DAX")]
    Dax,
    #[serde(rename = "S&P 500", alias = "SP500")]
    Sp500,
    #[serde(rename = "EURO STOXX 50", alias = "SX5E")]
    EuroStoxx50,
    #[serde(rename = "Dow Jones", alias = "DJIA")]
    DowJones,
    #[serde(rename = "Nasdaq", alias = "NDX")]
    Nasdaq,
}

impl Underlying {
    pub const ALL: [Underlying; 5] = [
        Underlying::Dax,
        Underlying::Sp500,
        Underlying::EuroStoxx50,
        Underlying::DowJones,
        Underlying::Nasdaq,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Dax => "Dax",
            Self::Sp500 => "S&P 500",
            Self::EuroStoxx50 => "EURO STOXX 50",
            Self::DowJones => "Dow Jones",
            Self::Nasdaq => "Nasdaq",
        }
    }

    /// Case-insensitive lookup accepting the usual ticker aliases.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_uppercase();
        let underlying = match normalized.as_str() {
            "DAX" => Self::Dax,
            "S&P 500" | "S&P500" | "SP500" | "SPX" => Self::Sp500,
            "EURO STOXX 50" | "EUROSTOXX50" | "ESTOXX50" | "SX5E" => Self::EuroStoxx50,
            "DOW JONES" | "DJIA" | "DJI" => Self::DowJones,
            "NASDAQ" | "NASDAQ-100" | "NASDAQ 100" | "NDX" => Self::Nasdaq,
            _ => return None,
        };
        Some(underlying)
    }

    /// Label with spaces replaced, used for file names.
    pub fn slug(self) -> String {
        self.label().replace(' ', "_")
    }

    pub const fn ticker(self) -> &'static str {
        match self {
            Self::Dax => "^GDAXI",
            Self::Sp500 => "^GSPC",
            Self::EuroStoxx50 => "^STOXX50E",
            Self::DowJones => "^DJI",
            Self::Nasdaq => "^IXIC",
        }
    }

    pub const fn volatility_index(self) -> VolatilityIndex {
        match self {
            Self::Dax => VolatilityIndex {
                label: "VDAX",
                ticker: "^VDAX",
            },
            Self::Sp500 => VolatilityIndex {
                label: "VIX",
                ticker: "^VIX",
            },
            Self::EuroStoxx50 => VolatilityIndex {
                label: "VSTOXX",
                ticker: "^V2TX",
            },
            Self::DowJones => VolatilityIndex {
                label: "VXD",
                ticker: "^VXD",
            },
            Self::Nasdaq => VolatilityIndex {
                label: "VXN",
                ticker: "^VXN",
            },
        }
    }

    pub const fn region(self) -> MarketRegion {
        match self {
            Self::Sp500 | Self::DowJones | Self::Nasdaq => MarketRegion::Usa,
            Self::Dax | Self::EuroStoxx50 => MarketRegion::Europe,
        }
    }

    /// Name used by calendar events to address this index.
    pub fn canonical_index(self) -> String {
        canonical_index(self.label())
    }
}

impl fmt::Display for Underlying {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VolatilityIndex {
    pub label: &'static str,
    pub ticker: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegion {
    Usa,
    Europe,
}

impl MarketRegion {
    /// Session bounds in Berlin wall-clock time.
    pub fn session(self) -> (NaiveTime, NaiveTime) {
        let (open, close) = match self {
            Self::Usa => ((15, 30), (22, 0)),
            Self::Europe => ((9, 0), (17, 30)),
        };
        (
            NaiveTime::from_hms_opt(open.0, open.1, 0).unwrap_or(NaiveTime::MIN),
            NaiveTime::from_hms_opt(close.0, close.1, 0).unwrap_or(NaiveTime::MIN),
        )
    }

    pub fn hours_label(self) -> String {
        let (open, close) = self.session();
        format!("{}-{} CET", open.format("%H:%M"), close.format("%H:%M"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarketStatus {
    pub open: bool,
    pub hours: String,
}

impl MarketStatus {
    pub fn describe(&self) -> String {
        if self.open {
            format!("Exchange open ({})", self.hours)
        } else {
            format!("Exchange closed ({})", self.hours)
        }
    }
}

/// Session status of the underlying's home market at `now`.
pub fn market_status(underlying: Underlying, now: DateTime<Tz>) -> MarketStatus {
    let region = underlying.region();
    let (open, close) = region.session();
    let local = now.with_timezone(&Berlin).time();
    MarketStatus {
        open: open <= local && local <= close,
        hours: region.hours_label(),
    }
}

pub fn berlin_now() -> DateTime<Tz> {
    Utc::now().with_timezone(&Berlin)
}

/// Maps the spellings used by calendar publishers onto one canonical name.
pub fn canonical_index(name: &str) -> String {
    let normalized = name.trim().to_ascii_uppercase();
    let canonical = match normalized.as_str() {
        "" => return String::new(),
        "DAX" => "DAX",
        "EURO STOXX 50" | "EUROSTOXX50" | "ESTOXX50" | "SX5E" => "EURO STOXX 50",
        "S&P 500" | "SP500" | "S&P500" | "SPX" => "S&P 500",
        "DOW JONES" | "DJIA" | "DJI" => "DOW JONES",
        "ALL" => "ALL",
        _ => return normalized,
    };
    canonical.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn berlin(hour: u32, minute: u32) -> DateTime<Tz> {
        Berlin
            .with_ymd_and_hms(2025, 9, 24, hour, minute, 0)
            .single()
            .expect("unambiguous local time")
    }

    #[test]
    fn parse_accepts_aliases_case_insensitively() {
        assert_eq!(Underlying::parse("dax"), Some(Underlying::Dax));
        assert_eq!(Underlying::parse(" spx "), Some(Underlying::Sp500));
        assert_eq!(Underlying::parse("Euro Stoxx 50"), Some(Underlying::EuroStoxx50));
        assert_eq!(Underlying::parse("nasdaq"), Some(Underlying::Nasdaq));
        assert_eq!(Underlying::parse("ftse"), None);
    }

    #[test]
    fn slug_replaces_spaces() {
        assert_eq!(Underlying::EuroStoxx50.slug(), "EURO_STOXX_50");
        assert_eq!(Underlying::Dax.slug(), "Dax");
    }

    #[test]
    fn european_session_is_inclusive() {
        assert!(market_status(Underlying::Dax, berlin(9, 0)).open);
        assert!(market_status(Underlying::Dax, berlin(17, 30)).open);
        assert!(!market_status(Underlying::Dax, berlin(17, 31)).open);
    }

    #[test]
    fn us_session_uses_berlin_clock() {
        let status = market_status(Underlying::Nasdaq, berlin(10, 0));
        assert!(!status.open);
        assert_eq!(status.hours, "15:30-22:00 CET");
        assert!(market_status(Underlying::Nasdaq, berlin(16, 0)).open);
    }

    #[test]
    fn canonical_index_folds_publisher_spellings() {
        assert_eq!(canonical_index("sx5e"), "EURO STOXX 50");
        assert_eq!(canonical_index("SPX"), "S&P 500");
        assert_eq!(canonical_index("Dax"), "DAX");
        assert_eq!(canonical_index("nikkei"), "NIKKEI");
        assert_eq!(Underlying::DowJones.canonical_index(), "DOW JONES");
    }
}
