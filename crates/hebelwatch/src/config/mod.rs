use crate::market::Underlying;
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Shortest refresh interval the monitor accepts, in seconds.
pub const MIN_REFRESH_SECS: u64 = 5;

pub const DEFAULT_QUOTES_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub monitor: MonitorConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "8050".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            monitor: MonitorConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Where series live and how the polling loop starts out.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub data_dir: PathBuf,
    pub events_dir: PathBuf,
    /// Leverage listing snapshots written by the scraper.
    pub listings_dir: PathBuf,
    pub quotes_url: String,
    pub refresh_secs: u64,
    pub underlying: Underlying,
    pub sound_enabled: bool,
}

impl MonitorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_dir = env::var("HEBEL_DATA_DIR").unwrap_or_else(|_| "CSV".to_string());
        let events_dir = env::var("HEBEL_EVENTS_DIR").unwrap_or_else(|_| "ereignisse".to_string());
        let listings_dir =
            env::var("HEBEL_LISTINGS_DIR").unwrap_or_else(|_| "listings".to_string());
        let quotes_url =
            env::var("HEBEL_QUOTES_URL").unwrap_or_else(|_| DEFAULT_QUOTES_URL.to_string());

        let refresh_secs = match env::var("HEBEL_REFRESH_SECS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs >= MIN_REFRESH_SECS)
                .ok_or(ConfigError::InvalidRefreshInterval(raw))?,
            Err(_) => MIN_REFRESH_SECS,
        };

        let underlying = match env::var("HEBEL_UNDERLYING") {
            Ok(raw) => Underlying::parse(&raw).ok_or(ConfigError::UnknownUnderlying(raw))?,
            Err(_) => Underlying::Dax,
        };

        let sound_enabled = env::var("HEBEL_SOUND")
            .map(|raw| !matches!(raw.trim().to_ascii_lowercase().as_str(), "0" | "false" | "off"))
            .unwrap_or(true);

        Ok(Self {
            data_dir: PathBuf::from(data_dir),
            events_dir: PathBuf::from(events_dir),
            listings_dir: PathBuf::from(listings_dir),
            quotes_url: quotes_url.trim_end_matches('/').to_string(),
            refresh_secs,
            underlying,
            sound_enabled,
        })
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_secs)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidRefreshInterval(String),
    UnknownUnderlying(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidRefreshInterval(raw) => write!(
                f,
                "HEBEL_REFRESH_SECS must be a whole number of seconds >= {MIN_REFRESH_SECS}, got '{raw}'"
            ),
            ConfigError::UnknownUnderlying(raw) => {
                write!(f, "HEBEL_UNDERLYING '{raw}' is not a supported index")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidRefreshInterval(_)
            | ConfigError::UnknownUnderlying(_) => None,
        }
    }
}
