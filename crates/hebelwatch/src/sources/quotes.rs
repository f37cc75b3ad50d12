use super::{MarketDataSource, SourceError};
use crate::config::DEFAULT_QUOTES_URL;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Daily closes from the Yahoo v8 chart endpoint.
#[derive(Debug, Clone)]
pub struct YahooChartClient {
    base_url: String,
    client: reqwest::Client,
}

impl YahooChartClient {
    pub fn new() -> Result<Self, SourceError> {
        Self::with_base_url(DEFAULT_QUOTES_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, SourceError> {
        let base_url = base_url.into();
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("Mozilla/5.0 (compatible; hebelwatch)")
            .build()
            .map_err(|source| SourceError::Http {
                url: base_url.clone(),
                source,
            })?;
        Ok(Self { base_url, client })
    }

    fn chart_url(&self, ticker: &str, range: &str) -> String {
        let symbol = ticker.trim().replace('$', "").replace('^', "%5E");
        format!("{}/{symbol}?range={range}&interval=1d", self.base_url)
    }
}

#[async_trait]
impl MarketDataSource for YahooChartClient {
    async fn daily_closes(&self, ticker: &str, range: &str) -> Result<Vec<f64>, SourceError> {
        let url = self.chart_url(ticker, range);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| SourceError::Http {
                url: url.clone(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(SourceError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        let body = response.text().await.map_err(|source| SourceError::Http {
            url: url.clone(),
            source,
        })?;
        let closes = parse_chart(ticker, &body)?;
        debug!(ticker, count = closes.len(), "daily closes fetched");
        Ok(closes)
    }
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

/// Extracts the non-null closes of the first chart result.
fn parse_chart(ticker: &str, body: &str) -> Result<Vec<f64>, SourceError> {
    let payload_error = |message: String| SourceError::Payload {
        ticker: ticker.to_string(),
        message,
    };

    let envelope: ChartEnvelope =
        serde_json::from_str(body).map_err(|err| payload_error(err.to_string()))?;

    if let Some(error) = envelope.chart.error {
        return Err(payload_error(
            error.description.unwrap_or_else(|| "chart error".to_string()),
        ));
    }

    let quote = envelope
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .and_then(|result| result.indicators.quote.into_iter().next())
        .ok_or_else(|| payload_error("empty chart result".to_string()))?;

    Ok(quote.close.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_closes_and_skips_nulls() {
        let body = r#"{"chart":{"result":[{"meta":{"symbol":"^GDAXI"},"timestamp":[1,2,3],
            "indicators":{"quote":[{"close":[23000.5,null,23100.0]}]}}],"error":null}}"#;
        assert_eq!(parse_chart("^GDAXI", body).expect("parsed"), vec![23000.5, 23100.0]);
    }

    #[test]
    fn chart_errors_surface_as_payload_errors() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found"}}}"#;
        let err = parse_chart("^NOPE", body).expect_err("chart error");
        assert!(err.to_string().contains("No data found"));
    }

    #[test]
    fn chart_url_encodes_index_symbols() {
        let client = YahooChartClient::with_base_url("http://quotes.test/chart").expect("client");
        assert_eq!(
            client.chart_url("^GDAXI", "5d"),
            "http://quotes.test/chart/%5EGDAXI?range=5d&interval=1d"
        );
    }
}
