use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use diary_core::error::CollaboratorError;
use diary_core::weather::{CurrentWeatherResponse, WeatherProvider, WeatherReport, city_query};

const CURRENT_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

pub struct OpenWeatherClient {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl OpenWeatherClient {
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Ok(Self {
            client: http_client(Duration::from_secs(10))?,
            api_key,
        })
    }
}

/// Shared HTTP client settings for outbound calls.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(format!("health-diary/{}", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(5))
        .build()
        .context("Failed to build HTTP client")
}

/// Map a transport failure onto the collaborator error kinds. The request URL
/// is dropped first since its query string carries the API key.
pub(crate) fn transport_error(err: reqwest::Error) -> CollaboratorError {
    let err = err.without_url();
    if err.is_timeout() {
        CollaboratorError::Timeout
    } else if err.is_connect() {
        CollaboratorError::Connection(err.to_string())
    } else if let Some(status) = err.status() {
        CollaboratorError::Http {
            status: status.as_u16(),
            message: err.to_string(),
        }
    } else if err.is_decode() {
        CollaboratorError::Decode(err.to_string())
    } else {
        CollaboratorError::Connection(err.to_string())
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherClient {
    async fn current(&self, city: &str) -> Result<WeatherReport, CollaboratorError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or(CollaboratorError::MissingKey("OpenWeatherMap"))?;
        let query = city_query(city);
        debug!(city, query, "fetching current weather");

        let resp = self
            .client
            .get(CURRENT_URL)
            .query(&[
                ("q", query),
                ("appid", key),
                ("units", "metric"),
                ("lang", "zh_tw"),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        let body = resp.text().await.map_err(transport_error)?;
        let parsed: Result<CurrentWeatherResponse, _> = serde_json::from_str(&body);

        if !status.is_success() {
            let message = parsed
                .ok()
                .and_then(|r| r.message)
                .unwrap_or_else(|| status.to_string());
            warn!(city, status = status.as_u16(), %message, "weather request failed");
            return Err(CollaboratorError::Http {
                status: status.as_u16(),
                message,
            });
        }

        parsed
            .map_err(|e| CollaboratorError::Decode(e.to_string()))?
            .into_report(city)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_key_fails_without_request() {
        let client = OpenWeatherClient::new(None).unwrap();
        let err = client.current("花蓮縣").await.unwrap_err();
        assert!(matches!(err, CollaboratorError::MissingKey("OpenWeatherMap")));
    }

    #[tokio::test]
    async fn transport_errors_do_not_expose_the_key() {
        let client = http_client(Duration::from_secs(2)).unwrap();
        let err = client
            .get("http://127.0.0.1:1/data/2.5/weather")
            .query(&[("q", "Hualien"), ("appid", "SECRETKEY123")])
            .send()
            .await
            .unwrap_err();

        let mapped = transport_error(err);
        assert!(matches!(
            mapped,
            CollaboratorError::Connection(_) | CollaboratorError::Timeout
        ));
        assert!(!mapped.to_string().contains("SECRETKEY123"));
        assert!(!mapped.user_message().contains("SECRETKEY123"));
    }

    // --- Integration tests (hit real OpenWeatherMap API) ---

    #[tokio::test]
    #[ignore = "hits OpenWeatherMap API"]
    async fn current_weather_for_taiwan_city() {
        let key = std::env::var("OPENWEATHER_API_KEY").ok();
        let client = OpenWeatherClient::new(key).unwrap();
        let report = client.current("臺北市").await.unwrap();
        assert_eq!(report.city, "臺北市");
        assert!(report.is_available());
        assert!(!report.description.is_empty());
    }

    #[tokio::test]
    #[ignore = "hits OpenWeatherMap API"]
    async fn unknown_city_is_http_error() {
        let key = std::env::var("OPENWEATHER_API_KEY").ok();
        let client = OpenWeatherClient::new(key).unwrap();
        let err = client.current("Nowhereville-xyz").await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Http { status: 404, .. }));
    }
}
