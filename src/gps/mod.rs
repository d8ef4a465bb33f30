// src/gps/mod.rs
//! Fix data, simulation and NMEA encoding

pub mod data;
pub mod nmea;
pub mod simulator;

pub use data::{Coordinate, FixQuality, FixSample};
pub use simulator::FixSimulator;
