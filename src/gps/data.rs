// src/gps/data.rs
//! Fix data structures shared by the simulator, the encoder and the receiver

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A position in decimal degrees.
///
/// Latitude must lie in `[-90, 90]` and longitude in `[-180, 180]`; the
/// encoder relies on this and does not re-check it in release builds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        debug_assert!((-90.0..=90.0).contains(&latitude), "latitude {} out of range", latitude);
        debug_assert!((-180.0..=180.0).contains(&longitude), "longitude {} out of range", longitude);
        Self { latitude, longitude }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

/// How a position was computed, as carried in field 6 of a GGA sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FixQuality {
    NoFix,
    Fix2D3D,
    DGNSS,
    RTKFixed,
    RTKFloat,
    DeadReckoning,
    Unknown(u8),
}

impl FixQuality {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => FixQuality::NoFix,
            1 => FixQuality::Fix2D3D,
            2 => FixQuality::DGNSS,
            4 => FixQuality::RTKFixed,
            5 => FixQuality::RTKFloat,
            6 => FixQuality::DeadReckoning,
            other => FixQuality::Unknown(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            FixQuality::NoFix => 0,
            FixQuality::Fix2D3D => 1,
            FixQuality::DGNSS => 2,
            FixQuality::RTKFixed => 4,
            FixQuality::RTKFloat => 5,
            FixQuality::DeadReckoning => 6,
            FixQuality::Unknown(code) => *code,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            FixQuality::NoFix => "No Fix",
            FixQuality::Fix2D3D => "2D/3D Fix",
            FixQuality::DGNSS => "DGNSS",
            FixQuality::RTKFixed => "RTK Fix",
            FixQuality::RTKFloat => "RTK Float",
            FixQuality::DeadReckoning => "Dead Reckoning",
            FixQuality::Unknown(_) => "Unknown",
        }
    }

    /// True when the fix used corrections from a reference station.
    pub fn is_differential(&self) -> bool {
        matches!(self, FixQuality::DGNSS | FixQuality::RTKFixed | FixQuality::RTKFloat)
    }

    pub fn is_rtk(&self) -> bool {
        matches!(self, FixQuality::RTKFixed | FixQuality::RTKFloat)
    }

    /// Satellites in use for a realistic fix of this quality (inclusive).
    pub fn satellite_range(&self) -> (u8, u8) {
        if self.is_rtk() {
            (10, 16)
        } else if *self == FixQuality::DGNSS {
            (8, 12)
        } else {
            (6, 10)
        }
    }

    /// Horizontal dilution of precision for a realistic fix of this quality (inclusive).
    pub fn hdop_range(&self) -> (f64, f64) {
        if self.is_rtk() {
            (0.5, 1.2)
        } else if *self == FixQuality::DGNSS {
            (0.8, 2.0)
        } else {
            (1.5, 4.0)
        }
    }
}

impl fmt::Display for FixQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// One simulated receiver output, produced once per tick and consumed by the encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct FixSample {
    pub timestamp: DateTime<Utc>,
    pub coordinate: Coordinate,
    pub quality: FixQuality,
    pub satellites: u8,
    pub hdop: f64,
    pub altitude: f64,
    pub geoid_height: f64,
    pub dgps_age: Option<f64>,
    pub dgps_station_id: Option<String>,
}

/// Rate an HDOP value the way field tools usually label it.
pub fn hdop_rating(hdop: f64) -> &'static str {
    match hdop {
        h if h <= 1.0 => "Excellent",
        h if h <= 2.0 => "Good",
        h if h <= 5.0 => "Moderate",
        h if h <= 10.0 => "Fair",
        _ => "Poor",
    }
}

pub const LOG_HEADER: &str = "Timestamp,Latitude,Longitude,Fix_Status,Fix_Description";

/// One row of the receiver's CSV log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub latitude: f64,
    pub longitude: f64,
    pub fix_status: u8,
    pub fix_description: String,
}

impl LogRecord {
    pub fn new(timestamp: DateTime<Local>, coordinate: Coordinate, quality: FixQuality) -> Self {
        Self {
            timestamp,
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
            fix_status: quality.code(),
            fix_description: quality.description().to_string(),
        }
    }

    /// Format the record as a CSV row matching [`LOG_HEADER`], without the line ending.
    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.latitude,
            self.longitude,
            self.fix_status,
            self.fix_description
        )
    }
}
