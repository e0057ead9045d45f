//! Current weather from OpenWeatherMap

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::ProviderError;

/// Normalized current conditions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherReport {
    pub city: String,
    pub country: String,
    pub temperature: f64,
    pub feels_like: f64,
    pub humidity: i64,
    pub pressure: f64,
    pub wind_speed: f64,
    /// Degrees
    pub wind_direction: i64,
    /// Kilometres
    pub visibility: Option<f64>,
    pub weather_main: String,
    pub weather_description: String,
    pub weather_icon: String,
    pub sunrise: Option<DateTime<Utc>>,
    pub sunset: Option<DateTime<Utc>>,
    pub data_time: DateTime<Utc>,
    pub provider: String,
    pub api_response: Value,
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Current conditions for a city; `units` is metric, imperial or kelvin
    async fn current(&self, city: &str, country: Option<&str>, units: &str) -> Result<WeatherReport, ProviderError>;
}

/// OpenWeatherMap `/weather` client
pub struct OpenWeather {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenWeather {
    pub fn new(http: reqwest::Client, base_url: String, api_key: Option<String>) -> Self {
        Self { http, base_url, api_key }
    }
}

#[derive(Debug, Deserialize)]
struct OwmResponse {
    name: String,
    dt: i64,
    main: OwmMain,
    #[serde(default)]
    wind: OwmWind,
    visibility: Option<f64>,
    #[serde(default)]
    weather: Vec<OwmCondition>,
    #[serde(default)]
    sys: OwmSys,
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: f64,
    feels_like: f64,
    humidity: i64,
    pressure: f64,
}

#[derive(Debug, Default, Deserialize)]
struct OwmWind {
    #[serde(default)]
    speed: f64,
    #[serde(default)]
    deg: i64,
}

#[derive(Debug, Deserialize)]
struct OwmCondition {
    main: String,
    description: String,
    icon: String,
}

#[derive(Debug, Default, Deserialize)]
struct OwmSys {
    #[serde(default)]
    country: String,
    sunrise: Option<i64>,
    sunset: Option<i64>,
}

fn from_epoch(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

/// Convert a raw OpenWeatherMap body into a report
pub fn parse_openweather(body: Value) -> Result<WeatherReport, ProviderError> {
    let raw: OwmResponse =
        serde_json::from_value(body.clone()).map_err(|e| ProviderError::Malformed(e.to_string()))?;
    let condition = raw
        .weather
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Malformed("missing weather conditions".to_string()))?;

    Ok(WeatherReport {
        city: raw.name,
        country: raw.sys.country,
        temperature: raw.main.temp,
        feels_like: raw.main.feels_like,
        humidity: raw.main.humidity,
        pressure: raw.main.pressure,
        wind_speed: raw.wind.speed,
        wind_direction: raw.wind.deg,
        visibility: raw.visibility.map(|m| m / 1000.0),
        weather_main: condition.main,
        weather_description: condition.description,
        weather_icon: condition.icon,
        sunrise: raw.sys.sunrise.and_then(from_epoch),
        sunset: raw.sys.sunset.and_then(from_epoch),
        data_time: from_epoch(raw.dt).unwrap_or_else(Utc::now),
        provider: "openweather".to_string(),
        api_response: body,
    })
}

#[async_trait]
impl WeatherProvider for OpenWeather {
    async fn current(&self, city: &str, country: Option<&str>, units: &str) -> Result<WeatherReport, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured("Weather API key"))?;

        let location = match country.filter(|c| !c.is_empty()) {
            Some(country) => format!("{},{}", city, country),
            None => city.to_string(),
        };
        // OpenWeatherMap reports kelvin when no unit is given
        let mut params = vec![("q", location.as_str()), ("appid", api_key), ("lang", "zh_cn")];
        if units != "kelvin" {
            params.push(("units", units));
        }

        debug!(city = %location, "Querying OpenWeatherMap");
        let response = self
            .http
            .get(format!("{}/weather", self.base_url.trim_end_matches('/')))
            .query(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(status, text));
        }

        parse_openweather(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_openweather() {
        let body = json!({
            "name": "Beijing",
            "dt": 1700000000,
            "main": {"temp": 12.5, "feels_like": 10.1, "humidity": 40, "pressure": 1016},
            "wind": {"speed": 3.2, "deg": 270},
            "visibility": 10000,
            "weather": [{"main": "Clear", "description": "clear sky", "icon": "01d"}],
            "sys": {"country": "CN", "sunrise": 1699990000, "sunset": 1700030000}
        });
        let report = parse_openweather(body).unwrap();
        assert_eq!(report.city, "Beijing");
        assert_eq!(report.country, "CN");
        assert_eq!(report.visibility, Some(10.0));
        assert_eq!(report.wind_direction, 270);
        assert_eq!(report.weather_icon, "01d");
        assert_eq!(report.data_time.timestamp(), 1700000000);
    }

    #[test]
    fn test_parse_rejects_missing_conditions() {
        let body = json!({
            "name": "X", "dt": 0,
            "main": {"temp": 1.0, "feels_like": 1.0, "humidity": 1, "pressure": 1.0},
            "weather": []
        });
        assert!(matches!(parse_openweather(body), Err(ProviderError::Malformed(_))));
    }
}
