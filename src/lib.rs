// src/lib.rs
//! GNSS Mock Library
//! 
//! A TCP server that streams simulated GGA fix sentences to every connected
//! client, and a receiver that logs the stream while reconnecting on its own.

pub mod broadcast;
pub mod config;
pub mod error;
pub mod gps;
pub mod receiver;
pub mod recorder;
pub mod server;

// Re-export main types for convenience
pub use broadcast::{Broadcaster, TickReport};
pub use config::{AppConfig, ReceiverConfig, ServerConfig, SimulatorConfig};
pub use error::{GpsError, Result};
pub use gps::data::{Coordinate, FixQuality, FixSample, LogRecord};
pub use receiver::{ReceiverState, StreamReceiver};
pub use recorder::{CsvLog, RecordSink};
pub use server::{MockServer, ServerState};
