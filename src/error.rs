// src/error.rs
//! Error types for the mock stream server and receiver

use std::fmt;

pub type Result<T> = std::result::Result<T, GpsError>;

#[derive(Debug)]
pub enum GpsError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Connection(String),
    Bind(String),
    Parse(String),
    Checksum { expected: u8, found: u8 },
    Config(String),
    Other(String),
}

impl GpsError {
    /// Protocol faults discard a single line; everything else is about the transport.
    pub fn is_protocol_fault(&self) -> bool {
        matches!(self, GpsError::Parse(_) | GpsError::Checksum { .. })
    }
}

impl fmt::Display for GpsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpsError::Io(e) => write!(f, "IO error: {}", e),
            GpsError::Json(e) => write!(f, "JSON error: {}", e),
            GpsError::Connection(msg) => write!(f, "Connection error: {}", msg),
            GpsError::Bind(msg) => write!(f, "Bind error: {}", msg),
            GpsError::Parse(msg) => write!(f, "Parse error: {}", msg),
            GpsError::Checksum { expected, found } => write!(
                f,
                "Checksum mismatch: computed {:02X}, sentence carries {:02X}",
                expected, found
            ),
            GpsError::Config(msg) => write!(f, "Config error: {}", msg),
            GpsError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for GpsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpsError::Io(e) => Some(e),
            GpsError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for GpsError {
    fn from(error: std::io::Error) -> Self {
        GpsError::Io(error)
    }
}

impl From<serde_json::Error> for GpsError {
    fn from(error: serde_json::Error) -> Self {
        GpsError::Json(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_display() {
        let err = GpsError::Checksum { expected: 0x4A, found: 0x0F };
        assert_eq!(
            err.to_string(),
            "Checksum mismatch: computed 4A, sentence carries 0F"
        );
        assert!(err.is_protocol_fault());
    }

    #[test]
    fn test_transport_errors_are_not_protocol_faults() {
        let io = GpsError::from(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"));
        assert!(!io.is_protocol_fault());
        assert!(!GpsError::Connection("reset".to_string()).is_protocol_fault());
    }
}
