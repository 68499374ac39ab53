use chrono::{DateTime, Utc};
use serde::Serialize;

use super::record::RawRecord;
use crate::error::IncompleteFix;

/// A position fix taken from one TPV report
///
/// Only constructed from a TPV record carrying finite `lat` and `lon`.
/// Fields are read-only; a newer fix replaces an older one as a whole.
///
/// Reference: [json_tpv_read](https://gitlab.com/gpsd/gpsd/-/blob/master/libgps/libgps_json.c?ref_type=heads#L34)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fix {
    latitude: f64,
    longitude: f64,
    altitude_meters: f64,
    timestamp: String,
}

impl Fix {
    /// Extracts a fix from a decoded TPV record
    ///
    /// `lat` and `lon` are required and taken verbatim. `alt` defaults to 0.0
    /// when absent or unusable, `time` to an empty string.
    pub fn from_tpv(record: &RawRecord) -> Result<Fix, IncompleteFix> {
        let latitude = coordinate(record, "lat")?;
        let longitude = coordinate(record, "lon")?;
        let altitude_meters = record
            .get("alt")
            .and_then(serde_json::Value::as_f64)
            .filter(|alt| alt.is_finite())
            .unwrap_or(0.0);
        let timestamp = record
            .get("time")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(Fix {
            latitude,
            longitude,
            altitude_meters,
            timestamp,
        })
    }

    /// Latitude in degrees (positive = North)
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude in degrees (positive = East)
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Altitude in meters, 0.0 when the report had none
    pub fn altitude_meters(&self) -> f64 {
        self.altitude_meters
    }

    /// Time of fix exactly as GPSD reported it; empty when unknown
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Time of fix as a UTC instant, if the timestamp is valid ISO 8601
    pub fn parsed_time(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

impl TryFrom<&RawRecord> for Fix {
    type Error = IncompleteFix;

    fn try_from(record: &RawRecord) -> Result<Self, Self::Error> {
        Fix::from_tpv(record)
    }
}

impl core::fmt::Display for Fix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Latitude: {}, Longitude: {}, Time: {}, Altitude: {}",
            self.latitude, self.longitude, self.timestamp, self.altitude_meters
        )
    }
}

fn coordinate(record: &RawRecord, field: &'static str) -> Result<f64, IncompleteFix> {
    let value = record.get(field).ok_or(IncompleteFix::Missing(field))?;
    let value = value.as_f64().ok_or(IncompleteFix::NotNumeric(field))?;
    if !value.is_finite() {
        return Err(IncompleteFix::NotFinite(field));
    }
    Ok(value)
}
