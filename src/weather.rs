use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::{archived_weather_conditions, weather_conditions};

/// One weather observation as returned by the weather source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherReading {
    /// °C
    pub temperature: f64,
    /// m/s
    pub wind_speed: f64,
    /// Degrees
    pub wind_direction: f64,
    /// Kilometres
    pub visibility: f64,
    /// mm over the last hour
    pub precipitation: f64,
    /// hPa
    pub pressure: f64,
}

#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Serialize)]
#[diesel(table_name = weather_conditions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct WeatherCondition {
    pub id: i32,
    pub observed_at: NaiveDateTime,
    pub temperature: f64,
    pub wind_speed: f64,
    pub wind_direction: f64,
    pub visibility: f64,
    pub precipitation: f64,
    pub pressure: f64,
}

impl WeatherCondition {
    pub fn to_archived(&self, archived_at: NaiveDateTime) -> NewArchivedWeatherCondition {
        NewArchivedWeatherCondition {
            observed_at: self.observed_at,
            temperature: self.temperature,
            wind_speed: self.wind_speed,
            wind_direction: self.wind_direction,
            visibility: self.visibility,
            precipitation: self.precipitation,
            pressure: self.pressure,
            archived_at,
        }
    }
}

#[derive(Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = weather_conditions)]
pub struct NewWeatherCondition {
    pub observed_at: NaiveDateTime,
    pub temperature: f64,
    pub wind_speed: f64,
    pub wind_direction: f64,
    pub visibility: f64,
    pub precipitation: f64,
    pub pressure: f64,
}

impl NewWeatherCondition {
    pub fn from_reading(reading: &WeatherReading, observed_at: DateTime<Utc>) -> Self {
        Self {
            observed_at: observed_at.naive_utc(),
            temperature: reading.temperature,
            wind_speed: reading.wind_speed,
            wind_direction: reading.wind_direction,
            visibility: reading.visibility,
            precipitation: reading.precipitation,
            pressure: reading.pressure,
        }
    }
}

#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Serialize)]
#[diesel(table_name = archived_weather_conditions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ArchivedWeatherCondition {
    pub id: i32,
    pub observed_at: NaiveDateTime,
    pub temperature: f64,
    pub wind_speed: f64,
    pub wind_direction: f64,
    pub visibility: f64,
    pub precipitation: f64,
    pub pressure: f64,
    pub archived_at: NaiveDateTime,
}

#[derive(Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = archived_weather_conditions)]
pub struct NewArchivedWeatherCondition {
    pub observed_at: NaiveDateTime,
    pub temperature: f64,
    pub wind_speed: f64,
    pub wind_direction: f64,
    pub visibility: f64,
    pub precipitation: f64,
    pub pressure: f64,
    pub archived_at: NaiveDateTime,
}
