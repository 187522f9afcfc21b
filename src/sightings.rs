use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::reference_data::AircraftReference;
use crate::schema::{aircraft_sightings, archived_aircraft_sightings};

/// Barometric altitude as reported by tar1090: feet, or the literal "ground"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BaroAltitude {
    Feet(f64),
    Other(String),
}

impl BaroAltitude {
    pub fn feet(&self) -> Option<f64> {
        match self {
            BaroAltitude::Feet(ft) => Some(*ft),
            BaroAltitude::Other(_) => None,
        }
    }
}

/// One element of the feed's `aircraft` array, exactly as received.
///
/// Every field except `hex` may be missing or null; unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAircraft {
    #[serde(default)]
    pub hex: String,
    #[serde(default)]
    pub flight: Option<String>,
    #[serde(default)]
    pub alt_geom: Option<f64>,
    #[serde(default)]
    pub alt_baro: Option<BaroAltitude>,
    #[serde(default)]
    pub gs: Option<f64>,
    #[serde(default)]
    pub track: Option<f64>,
    #[serde(default)]
    pub squawk: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
}

impl RawAircraft {
    /// Normalize into a snapshot; `None` when the entry carries no hex code
    pub fn normalize(&self) -> Option<AircraftSnapshot> {
        let hex = self.hex.trim().to_uppercase();
        if hex.is_empty() {
            return None;
        }

        let altitude = self
            .alt_geom
            .or_else(|| self.alt_baro.as_ref().and_then(BaroAltitude::feet))
            .map(|ft| ft.round() as i32);

        Some(AircraftSnapshot {
            hex,
            flight: non_blank(self.flight.as_deref()).map(|f| f.to_uppercase()),
            altitude,
            ground_speed: self.gs.map(|gs| gs.round() as i32),
            track: self.track,
            squawk: non_blank(self.squawk.as_deref()).map(str::to_string),
            latitude: self.lat,
            longitude: self.lon,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// A normalized aircraft state vector from one poll
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AircraftSnapshot {
    pub hex: String,
    pub flight: Option<String>,
    /// Feet
    pub altitude: Option<i32>,
    /// Knots
    pub ground_speed: Option<i32>,
    pub track: Option<f64>,
    pub squawk: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl AircraftSnapshot {
    pub fn new(hex: &str) -> Self {
        Self {
            hex: hex.trim().to_uppercase(),
            ..Default::default()
        }
    }

    /// Callsign, or empty when none was broadcast
    pub fn callsign(&self) -> &str {
        self.flight.as_deref().unwrap_or("")
    }
}

/// Active-table row
#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Serialize)]
#[diesel(table_name = aircraft_sightings)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Sighting {
    pub id: i32,
    pub hex_code: String,
    pub flight_number: Option<String>,
    pub altitude: Option<i32>,
    pub ground_speed: Option<i32>,
    pub track: Option<f64>,
    pub operator: Option<String>,
    pub aircraft_type: Option<String>,
    pub image_url: Option<String>,
    pub observed_at: NaiveDateTime,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub squawk_code: Option<String>,
}

impl Sighting {
    pub fn observed_at_utc(&self) -> DateTime<Utc> {
        self.observed_at.and_utc()
    }

    pub fn to_archived(&self, archived_at: NaiveDateTime) -> NewArchivedSighting {
        NewArchivedSighting {
            hex_code: self.hex_code.clone(),
            flight_number: self.flight_number.clone(),
            altitude: self.altitude,
            ground_speed: self.ground_speed,
            track: self.track,
            operator: self.operator.clone(),
            aircraft_type: self.aircraft_type.clone(),
            image_url: self.image_url.clone(),
            observed_at: self.observed_at,
            latitude: self.latitude,
            longitude: self.longitude,
            squawk_code: self.squawk_code.clone(),
            archived_at,
        }
    }
}

#[derive(Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = aircraft_sightings)]
#[diesel(treat_none_as_default_value = false)]
pub struct NewSighting {
    pub hex_code: String,
    pub flight_number: Option<String>,
    pub altitude: Option<i32>,
    pub ground_speed: Option<i32>,
    pub track: Option<f64>,
    pub operator: Option<String>,
    pub aircraft_type: Option<String>,
    pub image_url: Option<String>,
    pub observed_at: NaiveDateTime,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub squawk_code: Option<String>,
}

impl NewSighting {
    /// Build the row to insert, joining operator/type/image from the reference table
    pub fn from_snapshot(
        snapshot: &AircraftSnapshot,
        reference: Option<&AircraftReference>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            hex_code: snapshot.hex.to_uppercase(),
            flight_number: snapshot.flight.clone(),
            altitude: snapshot.altitude,
            ground_speed: snapshot.ground_speed,
            track: snapshot.track,
            operator: reference.and_then(|r| r.operator.clone()),
            aircraft_type: reference.and_then(|r| r.aircraft_type.clone()),
            image_url: reference.and_then(|r| r.image_link.clone()),
            observed_at: observed_at.naive_utc(),
            latitude: snapshot.latitude,
            longitude: snapshot.longitude,
            squawk_code: snapshot.squawk.clone(),
        }
    }
}

#[derive(Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = archived_aircraft_sightings)]
#[diesel(treat_none_as_default_value = false)]
pub struct NewArchivedSighting {
    pub hex_code: String,
    pub flight_number: Option<String>,
    pub altitude: Option<i32>,
    pub ground_speed: Option<i32>,
    pub track: Option<f64>,
    pub operator: Option<String>,
    pub aircraft_type: Option<String>,
    pub image_url: Option<String>,
    pub observed_at: NaiveDateTime,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub squawk_code: Option<String>,
    pub archived_at: NaiveDateTime,
}
