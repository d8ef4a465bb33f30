// src/receiver.rs
//! Auto-reconnecting client that logs GGA fixes from a TCP stream

use crate::{
    config::ReceiverConfig,
    error::{GpsError, Result},
    gps::{
        data::{hdop_rating, LogRecord},
        nmea,
    },
    recorder::RecordSink,
    server::wait_for_shutdown,
};
use chrono::Local;
use std::convert::Infallible;
use tokio::{
    io::AsyncReadExt,
    net::TcpStream,
    sync::watch,
    time::{sleep, timeout},
};

const READ_BUFFER_SIZE: usize = 1024;

/// Longest line kept while waiting for its terminator.
pub const MAX_LINE_LENGTH: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    pub connect_attempts: u64,
    pub sessions: u64,
    pub records_written: u64,
    pub lines_discarded: u64,
}

/// Splits a byte stream into lines. Bytes after the last terminator stay
/// buffered until more data arrives.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
    overflowed: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Next complete, non-empty line with its terminator stripped.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let Some(end) = self.pending.iter().position(|&b| b == b'\n') else {
                if self.pending.len() > MAX_LINE_LENGTH {
                    self.pending.clear();
                    self.overflowed = true;
                }
                return None;
            };

            let raw: Vec<u8> = self.pending.drain(..=end).collect();
            if std::mem::take(&mut self.overflowed) {
                // Tail of a line that was already dropped
                continue;
            }

            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();
            if !line.is_empty() {
                return Some(line.to_string());
            }
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Consumes the fix stream of one upstream server, forever.
pub struct StreamReceiver<S> {
    config: ReceiverConfig,
    sink: S,
    state: ReceiverState,
    stats: ReceiverStats,
}

impl<S: RecordSink> StreamReceiver<S> {
    pub fn new(config: ReceiverConfig, sink: S) -> Self {
        Self {
            config,
            sink,
            state: ReceiverState::Disconnected,
            stats: ReceiverStats::default(),
        }
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn stats(&self) -> ReceiverStats {
        self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Connect, consume, and reconnect after every fault until `shutdown` is raised.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let backoff = self.config.reconnect_backoff();
        log::info!("Starting GNSS client with automatic reconnection...");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let outcome = tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                outcome = self.session() => outcome,
            };
            self.state = ReceiverState::Disconnected;

            match outcome {
                Ok(never) => match never {},
                Err(e) => log::warn!("Connection lost or failed: {}", e),
            }

            log::info!("Reconnecting in {:?}...", backoff);
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                _ = sleep(backoff) => {}
            }
        }

        self.state = ReceiverState::Disconnected;
        log::info!("Receiver stopped");
    }

    /// One connection lifetime. Only ever ends with the fault that closed it.
    async fn session(&mut self) -> Result<Infallible> {
        let address = self.config.server_address();
        self.state = ReceiverState::Connecting;
        self.stats.connect_attempts += 1;
        log::info!("Connecting to {}...", address);

        let mut stream = timeout(self.config.connect_timeout(), TcpStream::connect(&address))
            .await
            .map_err(|_| GpsError::Connection(format!("Timed out connecting to {}", address)))?
            .map_err(|e| GpsError::Connection(format!("Failed to connect to {}: {}", address, e)))?;

        self.state = ReceiverState::Connected;
        self.stats.sessions += 1;
        log::info!("Connected to {}. Waiting for NMEA data...", address);

        // A fresh buffer per connection: partial lines never survive a reconnect.
        let mut lines = LineBuffer::new();
        let mut buf = [0u8; READ_BUFFER_SIZE];

        loop {
            let n = timeout(self.config.read_timeout(), stream.read(&mut buf))
                .await
                .map_err(|_| {
                    GpsError::Connection(format!("No data received for {:?}", self.config.read_timeout()))
                })??;

            if n == 0 {
                return Err(GpsError::Connection("Server closed the connection".to_string()));
            }

            lines.extend(&buf[..n]);
            while let Some(line) = lines.next_line() {
                self.handle_line(&line);
            }
        }
    }

    fn handle_line(&mut self, line: &str) {
        if !nmea::is_fix_sentence(line) {
            log::trace!("Ignoring line: {}", line);
            return;
        }

        let fix = match nmea::parse_gga(line) {
            Ok(fix) => fix,
            Err(e) => {
                self.stats.lines_discarded += 1;
                log::warn!("Discarding sentence '{}': {}", line, e);
                return;
            }
        };

        let record = LogRecord::new(Local::now(), fix.coordinate, fix.quality);
        if let Err(e) = self.sink.write_record(&record) {
            log::error!("Failed to write log record: {}", e);
            return;
        }
        self.stats.records_written += 1;

        let hdop = fix
            .hdop
            .map(|h| format!("{:.1} ({})", h, hdop_rating(h)))
            .unwrap_or_else(|| "N/A".to_string());
        log::info!(
            "Position: {}, {} | Fix: {} | Sats: {} | HDOP: {}",
            record.latitude,
            record.longitude,
            record.fix_description,
            fix.satellites.map_or("N/A".to_string(), |s| s.to_string()),
            hdop
        );
    }
}
