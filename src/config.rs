// src/config.rs
//! Configuration management with file-based storage

use crate::error::{GpsError, Result};
use crate::gps::data::{Coordinate, FixQuality};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Largest jitter radius, in degrees, that keeps one longitude wrap sufficient.
pub const MAX_JITTER_RADIUS: f64 = 90.0;

/// Weight of one fix quality in the simulator's draw.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityWeight {
    pub quality: FixQuality,
    pub weight: u32,
}

/// Tuning constants for the fix simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub base_latitude: f64,
    pub base_longitude: f64,
    /// Maximum jitter applied independently to latitude and longitude, in degrees.
    pub jitter_radius: f64,
    pub quality_weights: Vec<QualityWeight>,
    pub altitude_range: (f64, f64),
    pub geoid_height_range: (f64, f64),
    pub dgps_age_range: (f64, f64),
    pub station_id_range: (u16, u16),
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            // Munich
            base_latitude: 48.1351,
            base_longitude: 11.5820,
            jitter_radius: 0.001,
            quality_weights: vec![
                QualityWeight { quality: FixQuality::Fix2D3D, weight: 2 },
                QualityWeight { quality: FixQuality::DGNSS, weight: 2 },
                QualityWeight { quality: FixQuality::RTKFixed, weight: 1 },
                QualityWeight { quality: FixQuality::RTKFloat, weight: 1 },
            ],
            altitude_range: (515.0, 550.0),
            geoid_height_range: (46.0, 48.0),
            dgps_age_range: (1.0, 15.0),
            station_id_range: (1000, 1999),
        }
    }
}

impl SimulatorConfig {
    pub fn base(&self) -> Coordinate {
        Coordinate {
            latitude: self.base_latitude,
            longitude: self.base_longitude,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.base().is_valid() {
            return Err(GpsError::Config(format!(
                "base position {} is outside valid latitude/longitude ranges",
                self.base()
            )));
        }
        if !(0.0..=MAX_JITTER_RADIUS).contains(&self.jitter_radius) {
            return Err(GpsError::Config(format!(
                "jitter radius must be between 0 and {} degrees, got {}",
                MAX_JITTER_RADIUS,
                self.jitter_radius
            )));
        }
        if self.quality_weights.iter().all(|w| w.weight == 0) {
            return Err(GpsError::Config(
                "at least one fix quality needs a positive weight".to_string(),
            ));
        }

        let ranges = [
            ("altitude_range", self.altitude_range),
            ("geoid_height_range", self.geoid_height_range),
            ("dgps_age_range", self.dgps_age_range),
        ];
        for (name, (min, max)) in ranges {
            if !(min <= max) {
                return Err(GpsError::Config(format!("{} is inverted: [{}, {}]", name, min, max)));
            }
        }
        if self.station_id_range.0 > self.station_id_range.1 || self.station_id_range.1 > 9999 {
            return Err(GpsError::Config(format!(
                "station_id_range must be ordered and at most four digits: {:?}",
                self.station_id_range
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub tick_interval_ms: u64,
    pub write_timeout_ms: u64,
    pub simulator: SimulatorConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 33,
            tick_interval_ms: 500,
            write_timeout_ms: 1000,
            simulator: SimulatorConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub reconnect_backoff_ms: u64,
    pub log_dir: PathBuf,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 33,
            connect_timeout_ms: 10_000,
            read_timeout_ms: 30_000,
            reconnect_backoff_ms: 2_000,
            log_dir: PathBuf::from("."),
        }
    }
}

impl ReceiverConfig {
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Set the read timeout from whole seconds, saturating on overflow.
    pub fn set_read_timeout_secs(&mut self, secs: u64) {
        self.read_timeout_ms = secs.saturating_mul(1000);
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub receiver: ReceiverConfig,
}

impl AppConfig {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from_file(&Self::get_config_path()?)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to_file(&Self::get_config_path()?)
    }

    /// Load from a config file, falling back to defaults when it does not exist
    pub fn load_from_file(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(config_path)
            .map_err(|e| GpsError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| GpsError::Config(format!("Failed to parse config file: {}", e)))?;

        config.server.simulator.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, config_path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| GpsError::Config(format!("Failed to create config directory: {}", e)))?;
        }

        let contents = serde_json::to_string_pretty(self)?;

        std::fs::write(config_path, contents)
            .map_err(|e| GpsError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Get config file path
    pub fn get_config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .map_err(|_| GpsError::Config("HOME environment variable not set".to_string()))?;

        Ok(PathBuf::from(home).join(".config").join("gnss-mock").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("gnss-mock-config-{}-{}", std::process::id(), name))
            .join("config.json")
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind_address(), "0.0.0.0:33");
        assert_eq!(config.server.tick_interval(), Duration::from_millis(500));
        assert_eq!(config.receiver.reconnect_backoff(), Duration::from_secs(2));
        assert!(config.server.simulator.validate().is_ok());
    }

    #[test]
    fn test_default_weights_favour_plain_fixes() {
        let weights = SimulatorConfig::default().quality_weights;
        let total: u32 = weights.iter().map(|w| w.weight).sum();
        let rtk: u32 = weights.iter().filter(|w| w.quality.is_rtk()).map(|w| w.weight).sum();
        assert_eq!(total, 6);
        assert_eq!(rtk, 2);
    }

    #[test]
    fn test_save_and_load() {
        let path = temp_path("roundtrip");
        let mut config = AppConfig::default();
        config.server.port = 2101;
        config.receiver.host = "10.42.0.30".to_string();

        config.save_to_file(&path).unwrap();
        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let loaded = AppConfig::load_from_file(&temp_path("missing")).unwrap();
        assert_eq!(loaded, AppConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let path = temp_path("partial");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"server":{"port":4000}}"#).unwrap();

        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.server.port, 4000);
        assert_eq!(loaded.server.host, "0.0.0.0");
        assert_eq!(loaded.receiver, ReceiverConfig::default());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_invalid_simulator_rejected() {
        let mut sim = SimulatorConfig::default();
        sim.base_latitude = 91.0;
        assert!(matches!(sim.validate(), Err(GpsError::Config(_))));

        let mut sim = SimulatorConfig::default();
        sim.jitter_radius = -0.1;
        assert!(sim.validate().is_err());

        let mut sim = SimulatorConfig::default();
        sim.jitter_radius = 1000.0;
        assert!(matches!(sim.validate(), Err(GpsError::Config(_))));

        let mut sim = SimulatorConfig::default();
        sim.jitter_radius = f64::NAN;
        assert!(sim.validate().is_err());

        let mut sim = SimulatorConfig::default();
        sim.jitter_radius = MAX_JITTER_RADIUS;
        assert!(sim.validate().is_ok());

        let mut sim = SimulatorConfig::default();
        sim.quality_weights.iter_mut().for_each(|w| w.weight = 0);
        assert!(sim.validate().is_err());

        let mut sim = SimulatorConfig::default();
        sim.altitude_range = (600.0, 500.0);
        assert!(sim.validate().is_err());
    }

    #[test]
    fn test_read_timeout_secs_saturates() {
        let mut receiver = ReceiverConfig::default();
        receiver.set_read_timeout_secs(45);
        assert_eq!(receiver.read_timeout(), Duration::from_secs(45));

        receiver.set_read_timeout_secs(u64::MAX);
        assert_eq!(receiver.read_timeout_ms, u64::MAX);
    }
}
