//! Current-weather lookup: wire types for the OpenWeatherMap API and the
//! provider trait implemented by the HTTP client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;

/// Shown instead of a description or temperature when the lookup fails.
pub const UNAVAILABLE: &str = "N/A";

pub const DEFAULT_CITY: &str = "花蓮縣";

/// Taiwan cities and counties with the English name the weather API expects.
pub const TAIWAN_CITIES: [(&str, &str); 22] = [
    ("台北市", "Taipei"),
    ("新北市", "New Taipei"),
    ("桃園市", "Taoyuan"),
    ("台中市", "Taichung"),
    ("台南市", "Tainan"),
    ("高雄市", "Kaohsiung"),
    ("基隆市", "Keelung"),
    ("新竹市", "Hsinchu"),
    ("嘉義市", "Chiayi"),
    ("新竹縣", "Hsinchu County"),
    ("苗栗縣", "Miaoli County"),
    ("彰化縣", "Changhua County"),
    ("南投縣", "Nantou County"),
    ("雲林縣", "Yunlin County"),
    ("嘉義縣", "Chiayi County"),
    ("屏東縣", "Pingtung County"),
    ("宜蘭縣", "Yilan County"),
    ("花蓮縣", "Hualien"),
    ("台東縣", "Taitung County"),
    ("澎湖縣", "Penghu"),
    ("金門縣", "Kinmen"),
    ("連江縣", "Lienchiang"),
];

/// Map a listed Chinese city name to its API query; anything else passes through.
#[must_use]
pub fn city_query(city: &str) -> &str {
    let city = city.trim();
    TAIWAN_CITIES
        .iter()
        .find(|(zh, _)| *zh == city)
        .map_or(city, |(_, en)| *en)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub city: String,
    pub description: String,
    pub temperature_c: Option<f64>,
}

impl WeatherReport {
    #[must_use]
    pub fn unavailable(city: &str) -> Self {
        Self {
            city: city.to_string(),
            description: UNAVAILABLE.to_string(),
            temperature_c: None,
        }
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.temperature_c.is_some()
    }

    /// Temperature column value; 0 when unavailable.
    #[must_use]
    pub fn temperature_or_zero(&self) -> f64 {
        self.temperature_c.unwrap_or(0.0)
    }
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn current(&self, city: &str) -> Result<WeatherReport, CollaboratorError>;
}

// --- OpenWeatherMap wire types ---

#[derive(Debug, Deserialize)]
pub struct CurrentWeatherResponse {
    /// Numeric on success, sometimes a string on errors.
    pub cod: Option<serde_json::Value>,
    pub message: Option<String>,
    #[serde(default)]
    pub weather: Vec<WeatherCondition>,
    pub main: Option<MainReadings>,
}

#[derive(Debug, Deserialize)]
pub struct WeatherCondition {
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct MainReadings {
    pub temp: f64,
}

impl CurrentWeatherResponse {
    fn status(&self) -> Option<u16> {
        match self.cod.as_ref()? {
            serde_json::Value::Number(n) => n.as_u64().and_then(|v| u16::try_from(v).ok()),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn into_report(self, city: &str) -> Result<WeatherReport, CollaboratorError> {
        let status = self.status().unwrap_or(200);
        if status != 200 {
            return Err(CollaboratorError::Service(
                self.message.unwrap_or_else(|| format!("status {status}")),
            ));
        }
        let description = self
            .weather
            .into_iter()
            .next()
            .map(|w| w.description)
            .ok_or(CollaboratorError::Empty)?;
        let main = self.main.ok_or(CollaboratorError::Empty)?;
        Ok(WeatherReport {
            city: city.to_string(),
            description,
            temperature_c: Some(main.temp),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn city_query_maps_known_names() {
        assert_eq!(city_query("花蓮縣"), "Hualien");
        assert_eq!(city_query(" 台北市 "), "Taipei");
        assert_eq!(city_query("Tokyo"), "Tokyo");
    }

    #[test]
    fn success_response_becomes_report() {
        let json = r#"{"cod":200,"weather":[{"description":"多雲"}],"main":{"temp":26.4}}"#;
        let resp: CurrentWeatherResponse = serde_json::from_str(json).unwrap();
        let report = resp.into_report("花蓮縣").unwrap();
        assert_eq!(report.description, "多雲");
        assert_eq!(report.temperature_c, Some(26.4));
        assert!(report.is_available());
    }

    #[test]
    fn error_cod_as_string() {
        let json = r#"{"cod":"404","message":"city not found"}"#;
        let resp: CurrentWeatherResponse = serde_json::from_str(json).unwrap();
        let err = resp.into_report("Nowhere").unwrap_err();
        assert!(matches!(err, CollaboratorError::Service(ref m) if m == "city not found"));
    }

    #[test]
    fn missing_readings_is_empty() {
        let json = r#"{"cod":200,"weather":[]}"#;
        let resp: CurrentWeatherResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(resp.into_report("x"), Err(CollaboratorError::Empty)));
    }

    #[test]
    fn unavailable_report() {
        let report = WeatherReport::unavailable("花蓮縣");
        assert_eq!(report.description, "N/A");
        assert!(!report.is_available());
        assert_eq!(report.temperature_or_zero(), 0.0);
    }
}
