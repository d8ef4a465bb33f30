// src/gps/nmea.rs
//! GGA sentence encoding and parsing

use super::data::{Coordinate, FixQuality, FixSample};
use crate::error::{GpsError, Result};
use chrono::Timelike;
use std::fmt;

/// Talker and message identifiers accepted as fix sentences.
pub const FIX_SENTENCE_IDS: [&str; 2] = ["$GNGGA", "$GPGGA"];

/// Fields up to and including the fix quality must be present.
const MIN_GGA_FIELDS: usize = 7;

/// A checksummed NMEA sentence, without the line terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence(String);

impl Sentence {
    /// Build a sentence from its payload (the text between `$` and `*`).
    pub fn from_payload(payload: &str) -> Self {
        Self(format!("${}*{:02X}", payload, checksum(payload)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn payload(&self) -> &str {
        let end = self.0.len() - 3;
        &self.0[1..end]
    }

    /// Wire form with the CRLF terminator.
    pub fn to_line(&self) -> String {
        format!("{}\r\n", self.0)
    }
}

impl fmt::Display for Sentence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// XOR of every byte in the payload.
pub fn checksum(payload: &str) -> u8 {
    payload.bytes().fold(0, |acc, b| acc ^ b)
}

/// Split a coordinate magnitude into whole degrees and minutes rounded to
/// four decimals, carrying into the degrees when the minutes round up to 60.
fn degrees_minutes(value: f64) -> (u32, f64) {
    let magnitude = value.abs();
    let mut degrees = magnitude.trunc() as u32;
    let mut minutes = ((magnitude - degrees as f64) * 60.0 * 10_000.0).round() / 10_000.0;
    if minutes >= 60.0 {
        degrees += 1;
        minutes = 0.0;
    }
    (degrees, minutes)
}

/// Latitude as `DDMM.mmmm` plus hemisphere.
pub fn format_latitude(latitude: f64) -> (String, char) {
    let (degrees, minutes) = degrees_minutes(latitude);
    let hemisphere = if latitude >= 0.0 { 'N' } else { 'S' };
    (format!("{:02}{:07.4}", degrees, minutes), hemisphere)
}

/// Longitude as `DDDMM.mmmm` plus hemisphere.
pub fn format_longitude(longitude: f64) -> (String, char) {
    let (degrees, minutes) = degrees_minutes(longitude);
    let hemisphere = if longitude >= 0.0 { 'E' } else { 'W' };
    (format!("{:03}{:07.4}", degrees, minutes), hemisphere)
}

/// Render a sample as a `$GNGGA` sentence.
///
/// The sample's coordinate must be valid; formatting itself cannot fail.
pub fn encode_gga(sample: &FixSample) -> Sentence {
    debug_assert!(sample.coordinate.is_valid());

    let ts = sample.timestamp;
    let time = format!(
        "{:02}{:02}{:02}.{:02}",
        ts.hour(),
        ts.minute(),
        ts.second(),
        (ts.timestamp_subsec_millis() / 10).min(99)
    );
    let (lat, lat_dir) = format_latitude(sample.coordinate.latitude);
    let (lon, lon_dir) = format_longitude(sample.coordinate.longitude);
    let dgps_age = sample
        .dgps_age
        .map(|age| format!("{:.1}", age))
        .unwrap_or_default();
    let station = sample.dgps_station_id.as_deref().unwrap_or("");

    let payload = format!(
        "GNGGA,{},{},{},{},{},{},{:02},{:.1},{:.1},M,{:.1},M,{},{}",
        time,
        lat,
        lat_dir,
        lon,
        lon_dir,
        sample.quality.code(),
        sample.satellites,
        sample.hdop,
        sample.altitude,
        sample.geoid_height,
        dgps_age,
        station
    );

    Sentence::from_payload(&payload)
}

/// Whether the line carries one of the recognised fix sentence identifiers.
pub fn is_fix_sentence(line: &str) -> bool {
    FIX_SENTENCE_IDS.iter().any(|id| line.contains(id))
}

/// Check the trailing `*hh` checksum and return the payload between `$` and `*`.
pub fn verify_checksum(line: &str) -> Result<&str> {
    let line = line.trim();
    let start = line
        .find('$')
        .ok_or_else(|| GpsError::Parse("missing '$' start marker".to_string()))?;
    let body = &line[start + 1..];
    let (payload, hex) = body
        .rsplit_once('*')
        .ok_or_else(|| GpsError::Parse("missing '*' checksum delimiter".to_string()))?;

    if hex.len() != 2 {
        return Err(GpsError::Parse(format!("malformed checksum '{}'", hex)));
    }
    let found = u8::from_str_radix(hex, 16)
        .map_err(|_| GpsError::Parse(format!("malformed checksum '{}'", hex)))?;
    let expected = checksum(payload);

    if expected != found {
        return Err(GpsError::Checksum { expected, found });
    }
    Ok(payload)
}

/// Convert a `DDMM.mmmm` / `DDDMM.mmmm` field and its hemisphere letter to
/// signed decimal degrees, rounded to 7 places.
pub fn nmea_to_decimal(value: &str, hemisphere: &str) -> Result<f64> {
    let raw = value
        .parse::<f64>()
        .map_err(|_| GpsError::Parse(format!("invalid coordinate '{}'", value)))?;
    if !raw.is_finite() || raw < 0.0 {
        return Err(GpsError::Parse(format!("invalid coordinate '{}'", value)));
    }

    let degrees = (raw / 100.0).trunc();
    let minutes = raw - degrees * 100.0;
    if minutes >= 60.0 {
        return Err(GpsError::Parse(format!("minutes out of range in '{}'", value)));
    }

    let (sign, limit) = match hemisphere {
        "N" => (1.0, 90.0),
        "S" => (-1.0, 90.0),
        "E" => (1.0, 180.0),
        "W" => (-1.0, 180.0),
        other => return Err(GpsError::Parse(format!("invalid hemisphere '{}'", other))),
    };

    let decimal = degrees + minutes / 60.0;
    if decimal > limit {
        return Err(GpsError::Parse(format!("coordinate '{}{}' out of range", value, hemisphere)));
    }

    Ok(sign * (decimal * 1e7).round() / 1e7)
}

/// Fields extracted from a validated GGA sentence.
#[derive(Debug, Clone, PartialEq)]
pub struct GgaFix {
    pub utc_time: String,
    pub coordinate: Coordinate,
    pub quality: FixQuality,
    pub satellites: Option<u8>,
    pub hdop: Option<f64>,
    pub altitude: Option<f64>,
    pub geoid_height: Option<f64>,
    pub dgps_age: Option<f64>,
    pub dgps_station_id: Option<String>,
}

fn optional<T: std::str::FromStr>(parts: &[&str], index: usize) -> Option<T> {
    parts
        .get(index)
        .filter(|field| !field.is_empty())
        .and_then(|field| field.parse().ok())
}

/// Parse a GGA line. The checksum is verified before any field is read.
pub fn parse_gga(line: &str) -> Result<GgaFix> {
    let payload = verify_checksum(line)?;
    let parts: Vec<&str> = payload.split(',').collect();

    if !matches!(parts[0], "GNGGA" | "GPGGA") {
        return Err(GpsError::Parse(format!("not a GGA sentence: {}", parts[0])));
    }
    if parts.len() < MIN_GGA_FIELDS {
        return Err(GpsError::Parse(format!(
            "expected at least {} fields, got {}",
            MIN_GGA_FIELDS,
            parts.len()
        )));
    }

    let latitude = nmea_to_decimal(parts[2], parts[3])?;
    let longitude = nmea_to_decimal(parts[4], parts[5])?;
    let code = parts[6]
        .parse::<u8>()
        .map_err(|_| GpsError::Parse(format!("invalid fix quality '{}'", parts[6])))?;

    Ok(GgaFix {
        utc_time: parts[1].to_string(),
        coordinate: Coordinate::new(latitude, longitude),
        quality: FixQuality::from_code(code),
        satellites: optional(&parts, 7),
        hdop: optional(&parts, 8),
        altitude: optional(&parts, 9),
        geoid_height: optional(&parts, 11),
        dgps_age: optional(&parts, 13),
        dgps_station_id: optional(&parts, 14),
    })
}
