use crate::config::TelemetryConfig;
use std::fmt;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

/// HTTP client internals that flood the log at debug level on every poll.
const NOISY_TARGETS: [&str; 3] = ["hyper", "hyper_util", "reqwest"];

#[derive(Debug)]
pub enum TelemetryError {
    InvalidFilter { directives: String, source: ParseError },
    Install(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::InvalidFilter { directives, .. } => {
                write!(f, "APP_LOG_LEVEL '{directives}' is not a valid tracing filter")
            }
            TelemetryError::Install(err) => write!(f, "log subscriber not installed: {err}"),
        }
    }
}

impl std::error::Error for TelemetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TelemetryError::InvalidFilter { source, .. } => Some(source),
            TelemetryError::Install(err) => Some(&**err),
        }
    }
}

/// Expands a bare level into directives that keep the HTTP client quiet.
/// Anything that already names targets is passed through untouched.
fn directives(level: &str) -> String {
    let level = level.trim();
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }

    let mut directives = level.to_string();
    for target in NOISY_TARGETS {
        directives.push_str(&format!(",{target}=warn"));
    }
    directives
}

fn build_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let directives = directives(&config.log_level);
    EnvFilter::try_new(&directives).map_err(|source| TelemetryError::InvalidFilter { directives, source })
}

/// Installs the global subscriber. `RUST_LOG` wins over `APP_LOG_LEVEL`.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = build_filter(config)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::Install)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_level_quiets_http_client() {
        assert_eq!(
            directives(" debug "),
            "debug,hyper=warn,hyper_util=warn,reqwest=warn"
        );
    }

    #[test]
    fn explicit_directives_pass_through() {
        assert_eq!(directives("hebelwatch=trace"), "hebelwatch=trace");
        assert_eq!(directives("info,tower=debug"), "info,tower=debug");
    }

    #[test]
    fn invalid_level_names_the_setting() {
        let err = EnvFilter::try_new("hebelwatch=loud")
            .map_err(|source| TelemetryError::InvalidFilter {
                directives: "hebelwatch=loud".into(),
                source,
            })
            .expect_err("malformed directive");
        assert!(err.to_string().contains("APP_LOG_LEVEL"));
    }
}
