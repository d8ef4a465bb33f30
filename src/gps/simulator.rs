// src/gps/simulator.rs
//! Synthetic fix generation around a base position

use super::data::{Coordinate, FixQuality, FixSample};
use crate::{
    config::SimulatorConfig,
    error::{GpsError, Result},
};
use chrono::{DateTime, Utc};
use rand::{
    distributions::{Distribution, WeightedIndex},
    Rng,
};

/// Produces jittered fixes around a fixed base position.
///
/// The simulator itself never changes after construction; all variation
/// comes from the random source passed to [`FixSimulator::next_sample`].
#[derive(Debug, Clone)]
pub struct FixSimulator {
    config: SimulatorConfig,
    qualities: Vec<FixQuality>,
    weights: WeightedIndex<u32>,
}

impl FixSimulator {
    pub fn new(config: SimulatorConfig) -> Result<Self> {
        config.validate()?;

        let qualities = config.quality_weights.iter().map(|w| w.quality).collect();
        let weights = WeightedIndex::new(config.quality_weights.iter().map(|w| w.weight))
            .map_err(|e| GpsError::Config(format!("Invalid fix quality weights: {}", e)))?;

        Ok(Self {
            config,
            qualities,
            weights,
        })
    }

    pub fn base(&self) -> Coordinate {
        self.config.base()
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Draw one sample stamped with `timestamp`.
    pub fn next_sample<R: Rng + ?Sized>(&self, rng: &mut R, timestamp: DateTime<Utc>) -> FixSample {
        let radius = self.config.jitter_radius;
        let base = self.base();
        let latitude = (base.latitude + rng.gen_range(-radius..=radius)).clamp(-90.0, 90.0);
        let longitude = wrap_longitude(base.longitude + rng.gen_range(-radius..=radius));

        let quality = self.qualities[self.weights.sample(rng)];
        let (min_sats, max_sats) = quality.satellite_range();
        let (min_hdop, max_hdop) = quality.hdop_range();

        // Values are rounded to the precision they are sent with.
        let satellites = rng.gen_range(min_sats..=max_sats);
        let hdop = round1(rng.gen_range(min_hdop..=max_hdop));
        let altitude = round1(draw(rng, self.config.altitude_range));
        let geoid_height = round1(draw(rng, self.config.geoid_height_range));

        let (dgps_age, dgps_station_id) = if quality.is_differential() {
            let (min_id, max_id) = self.config.station_id_range;
            (
                Some(round1(draw(rng, self.config.dgps_age_range))),
                Some(format!("{:04}", rng.gen_range(min_id..=max_id))),
            )
        } else {
            (None, None)
        };

        FixSample {
            timestamp,
            coordinate: Coordinate::new(latitude, longitude),
            quality,
            satellites,
            hdop,
            altitude,
            geoid_height,
            dgps_age,
            dgps_station_id,
        }
    }
}

fn draw<R: Rng + ?Sized>(rng: &mut R, (min, max): (f64, f64)) -> f64 {
    rng.gen_range(min..=max)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn wrap_longitude(longitude: f64) -> f64 {
    if longitude > 180.0 {
        longitude - 360.0
    } else if longitude < -180.0 {
        longitude + 360.0
    } else {
        longitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{QualityWeight, MAX_JITTER_RADIUS};
    use rand::{rngs::StdRng, SeedableRng};
    use std::collections::HashMap;

    fn munich() -> FixSimulator {
        FixSimulator::new(SimulatorConfig::default()).unwrap()
    }

    #[test]
    fn test_jitter_stays_within_radius() {
        let simulator = munich();
        let mut rng = StdRng::seed_from_u64(1);

        for _ in 0..2000 {
            let sample = simulator.next_sample(&mut rng, Utc::now());
            let c = sample.coordinate;
            assert!((48.1341..=48.1361).contains(&c.latitude), "latitude {}", c.latitude);
            assert!((11.5810..=11.5830).contains(&c.longitude), "longitude {}", c.longitude);
        }
    }

    #[test]
    fn test_quality_dependent_ranges() {
        let simulator = munich();
        let mut rng = StdRng::seed_from_u64(2);

        for _ in 0..2000 {
            let sample = simulator.next_sample(&mut rng, Utc::now());
            match sample.quality.code() {
                4 | 5 => {
                    assert!((10..=16).contains(&sample.satellites));
                    assert!((0.5..=1.2).contains(&sample.hdop));
                }
                2 => {
                    assert!((8..=12).contains(&sample.satellites));
                    assert!((0.8..=2.0).contains(&sample.hdop));
                }
                _ => {
                    assert!((6..=10).contains(&sample.satellites));
                    assert!((1.5..=4.0).contains(&sample.hdop));
                }
            }
            assert!((515.0..=550.0).contains(&sample.altitude));
            assert!((46.0..=48.0).contains(&sample.geoid_height));
        }
    }

    #[test]
    fn test_differential_fields_only_for_corrected_fixes() {
        let simulator = munich();
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..500 {
            let sample = simulator.next_sample(&mut rng, Utc::now());
            if sample.quality.is_differential() {
                let age = sample.dgps_age.unwrap();
                let id: u16 = sample.dgps_station_id.as_deref().unwrap().parse().unwrap();
                assert!((1.0..=15.0).contains(&age));
                assert!((1000..=1999).contains(&id));
            } else {
                assert!(sample.dgps_age.is_none());
                assert!(sample.dgps_station_id.is_none());
            }
        }
    }

    #[test]
    fn test_weighted_distribution() {
        let simulator = munich();
        let mut rng = StdRng::seed_from_u64(4);
        let mut counts: HashMap<FixQuality, u32> = HashMap::new();

        for _ in 0..6000 {
            *counts.entry(simulator.next_sample(&mut rng, Utc::now()).quality).or_default() += 1;
        }

        assert_eq!(counts.len(), 4);
        assert!(counts[&FixQuality::Fix2D3D] > counts[&FixQuality::RTKFixed]);
        assert!(counts[&FixQuality::DGNSS] > counts[&FixQuality::RTKFloat]);
        assert!(!counts.contains_key(&FixQuality::NoFix));
    }

    #[test]
    fn test_simulator_state_is_unchanged() {
        let simulator = munich();
        let before = simulator.config().clone();
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..10 {
            simulator.next_sample(&mut rng, Utc::now());
        }
        assert_eq!(simulator.config(), &before);

        // Same seed, same stream
        let now = Utc::now();
        let a = simulator.next_sample(&mut StdRng::seed_from_u64(9), now);
        let b = simulator.next_sample(&mut StdRng::seed_from_u64(9), now);
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_radius_pins_position() {
        let config = SimulatorConfig {
            jitter_radius: 0.0,
            quality_weights: vec![QualityWeight { quality: FixQuality::RTKFixed, weight: 1 }],
            ..SimulatorConfig::default()
        };
        let simulator = FixSimulator::new(config).unwrap();
        let sample = simulator.next_sample(&mut StdRng::seed_from_u64(6), Utc::now());

        assert_eq!(sample.coordinate, simulator.base());
        assert_eq!(sample.quality, FixQuality::RTKFixed);
    }

    #[test]
    fn test_edges_are_clamped() {
        let config = SimulatorConfig {
            base_latitude: 90.0,
            base_longitude: 180.0,
            jitter_radius: 0.5,
            ..SimulatorConfig::default()
        };
        let simulator = FixSimulator::new(config).unwrap();
        let mut rng = StdRng::seed_from_u64(8);

        for _ in 0..200 {
            assert!(simulator.next_sample(&mut rng, Utc::now()).coordinate.is_valid());
        }
    }

    #[test]
    fn test_widest_radius_stays_valid() {
        let config = SimulatorConfig {
            base_latitude: -90.0,
            base_longitude: -180.0,
            jitter_radius: MAX_JITTER_RADIUS,
            ..SimulatorConfig::default()
        };
        let simulator = FixSimulator::new(config).unwrap();
        let mut rng = StdRng::seed_from_u64(21);

        for _ in 0..500 {
            assert!(simulator.next_sample(&mut rng, Utc::now()).coordinate.is_valid());
        }
    }

    #[test]
    fn test_oversized_radius_rejected() {
        let config = SimulatorConfig {
            jitter_radius: 1000.0,
            ..SimulatorConfig::default()
        };
        assert!(matches!(FixSimulator::new(config), Err(GpsError::Config(_))));
    }
}
