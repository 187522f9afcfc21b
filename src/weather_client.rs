use anyhow::{Context, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, SkywatchError};
use crate::weather::WeatherReading;

/// Source of the current weather at the receiver
#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// `Ok(None)` when the source answered without the fields we need
    async fn current(&self) -> Result<Option<WeatherReading>>;
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: Option<f64>,
    pressure: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwmWind {
    speed: Option<f64>,
    deg: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwmRain {
    #[serde(rename = "1h")]
    one_hour: Option<f64>,
}

/// Subset of the OpenWeatherMap current-weather response
#[derive(Debug, Deserialize)]
pub struct OwmResponse {
    main: Option<OwmMain>,
    wind: Option<OwmWind>,
    /// Metres
    visibility: Option<f64>,
    rain: Option<OwmRain>,
}

impl OwmResponse {
    /// Temperature, pressure and wind are required; visibility defaults to
    /// 10 km and precipitation to 0 mm.
    pub fn into_reading(self) -> Option<WeatherReading> {
        let main = self.main?;
        let wind = self.wind?;
        Some(WeatherReading {
            temperature: main.temp?,
            wind_speed: wind.speed?,
            wind_direction: wind.deg?,
            visibility: self.visibility.unwrap_or(10_000.0) / 1000.0,
            precipitation: self.rain.and_then(|r| r.one_hour).unwrap_or(0.0),
            pressure: main.pressure?,
        })
    }
}

#[derive(Clone)]
pub struct OpenWeatherClient {
    client: Client,
    base_url: String,
    api_key: String,
    latitude: f64,
    longitude: f64,
    timeout: Duration,
}

impl OpenWeatherClient {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        latitude: f64,
        longitude: f64,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            latitude,
            longitude,
            timeout,
        }
    }

    async fn fetch(&self) -> anyhow::Result<OwmResponse> {
        let url = format!("{}/data/2.5/weather", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .query(&[
                ("lat", self.latitude.to_string()),
                ("lon", self.longitude.to_string()),
                ("appid", self.api_key.clone()),
                ("units", "metric".to_string()),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .context("Failed to send request to OpenWeatherMap")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("OpenWeatherMap returned HTTP {}", status));
        }

        response
            .json::<OwmResponse>()
            .await
            .context("Failed to parse OpenWeatherMap response")
    }
}

#[async_trait]
impl WeatherSource for OpenWeatherClient {
    async fn current(&self) -> Result<Option<WeatherReading>> {
        let body = self
            .fetch()
            .await
            .map_err(|e| SkywatchError::transient_fetch("fetch weather", e))?;
        let reading = body.into_reading();
        if reading.is_none() {
            debug!("Weather response lacked required fields");
        }
        Ok(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> OwmResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_full_response() {
        let reading = parse(
            r#"{"coord":{"lon":-82.95,"lat":40.12},
                "main":{"temp":21.4,"feels_like":21.0,"pressure":1016,"humidity":60},
                "visibility":8000,
                "wind":{"speed":4.6,"deg":230,"gust":7.2},
                "rain":{"1h":0.38},
                "name":"Westerville"}"#,
        )
        .into_reading()
        .unwrap();

        assert_eq!(
            reading,
            WeatherReading {
                temperature: 21.4,
                wind_speed: 4.6,
                wind_direction: 230.0,
                visibility: 8.0,
                precipitation: 0.38,
                pressure: 1016.0,
            }
        );
    }

    #[test]
    fn test_optional_fields_default() {
        let reading = parse(r#"{"main":{"temp":-3.0,"pressure":1030},"wind":{"speed":0.5,"deg":0}}"#)
            .into_reading()
            .unwrap();
        assert_eq!(reading.visibility, 10.0);
        assert_eq!(reading.precipitation, 0.0);
    }

    #[test]
    fn test_missing_required_field_is_no_data() {
        assert!(parse(r#"{"main":{"temp":12.0,"pressure":1012},"wind":{"speed":3.1}}"#)
            .into_reading()
            .is_none());
        assert!(parse(r#"{"cod":401,"message":"Invalid API key"}"#)
            .into_reading()
            .is_none());
    }
}
