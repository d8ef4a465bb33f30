// src/recorder.rs
//! Append-only persistence of parsed fixes

use crate::{
    error::{GpsError, Result},
    gps::data::{LogRecord, LOG_HEADER},
};
use chrono::Local;
use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

/// Destination for parsed fix records.
pub trait RecordSink {
    fn write_record(&mut self, record: &LogRecord) -> Result<()>;
}

impl RecordSink for Vec<LogRecord> {
    fn write_record(&mut self, record: &LogRecord) -> Result<()> {
        self.push(record.clone());
        Ok(())
    }
}

/// CSV log written one row at a time. Each row reaches the file before
/// `write_record` returns, so an interrupted run keeps everything already logged.
pub struct CsvLog {
    path: PathBuf,
    file: File,
}

impl CsvLog {
    /// Create `gps_log_<timestamp>.csv` in `dir` and write the header.
    pub fn create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .map_err(|e| GpsError::Other(format!("Failed to create log directory {}: {}", dir.display(), e)))?;

        let file_name = format!("gps_log_{}.csv", Local::now().format("%Y%m%d_%H%M%S"));
        Self::create_at(&dir.join(file_name))
    }

    /// Create (or truncate) the log at an explicit path.
    pub fn create_at(path: &Path) -> Result<Self> {
        let mut file = File::create(path)?;
        writeln!(file, "{}", LOG_HEADER)?;
        file.flush()?;

        // Reopen in append mode so rows always land at the end
        let file = OpenOptions::new().append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSink for CsvLog {
    fn write_record(&mut self, record: &LogRecord) -> Result<()> {
        let row = format!("{}\n", record.to_csv_row());
        self.file.write_all(row.as_bytes())?;
        self.file.flush()?;
        Ok(())
    }
}
