// src/main.rs
//! GNSS Mock - simulated fix stream server and logging receiver

use anyhow::Context;
use clap::{Parser, Subcommand};
use gnss_mock::{config::AppConfig, *};
use std::{future::Future, path::PathBuf};
use tokio::sync::watch;

#[derive(Debug, Parser)]
#[command(name = "gnss-mock", version, about = "Stream simulated GGA fixes over TCP and log them")]
struct Cli {
    /// Config file (defaults to ~/.config/gnss-mock/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level: error, warn, info, debug, trace
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the mock fix server
    Serve {
        /// Interface to listen on
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
        /// Jitter radius around the base position, in degrees
        #[arg(long)]
        radius: Option<f64>,
        /// Milliseconds between sentences
        #[arg(long)]
        interval_ms: Option<u64>,
        #[arg(long, requires = "base_lon", allow_hyphen_values = true)]
        base_lat: Option<f64>,
        #[arg(long, requires = "base_lat", allow_hyphen_values = true)]
        base_lon: Option<f64>,
    },
    /// Connect to a server and log every fix to CSV
    Receive {
        /// Server address
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
        /// Seconds without data before the connection is considered dead
        #[arg(long)]
        read_timeout: Option<u64>,
        /// Milliseconds to wait between reconnect attempts
        #[arg(long)]
        backoff_ms: Option<u64>,
        /// Directory for the CSV log
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },
    /// Write the effective configuration to the config file
    WriteConfig,
}

/// Initializes the logger using env_logger with the given level
fn init_logger(level: &str) {
    let log_level = match level.to_lowercase().as_str() {
        "error" => log::LevelFilter::Error,
        "warn" => log::LevelFilter::Warn,
        "info" => log::LevelFilter::Info,
        "debug" => log::LevelFilter::Debug,
        "trace" => log::LevelFilter::Trace,
        _ => log::LevelFilter::Info,
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp_micros()
        .format_module_path(false)
        .format_target(false)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> AppConfig {
    let loaded = match path {
        Some(path) => AppConfig::load_from_file(path),
        None => AppConfig::load(),
    };
    loaded.unwrap_or_else(|e| {
        log::warn!("{}; using defaults", e);
        AppConfig::default()
    })
}

/// Raise the shutdown flag on Ctrl+C
fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    shutdown_on(tokio::signal::ctrl_c())
}

/// Raise the shutdown flag once `signal` fires. A signal that fails to
/// register leaves the flag down for good.
fn shutdown_on<F>(signal: F) -> watch::Receiver<bool>
where
    F: Future<Output = std::io::Result<()>> + Send + 'static,
{
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = signal.await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            // Holding the sender keeps receivers waiting
            std::future::pending::<()>().await;
        }
        log::info!("Ctrl+C received");
        let _ = tx.send(true);
    });
    rx
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logger(&cli.log_level);

    let mut config = load_config(cli.config.as_ref());

    match cli.command {
        Command::Serve {
            host,
            port,
            radius,
            interval_ms,
            base_lat,
            base_lon,
        } => {
            let server_config = &mut config.server;
            if let Some(host) = host {
                server_config.host = host;
            }
            if let Some(port) = port {
                server_config.port = port;
            }
            if let Some(radius) = radius {
                server_config.simulator.jitter_radius = radius;
            }
            if let Some(interval_ms) = interval_ms {
                server_config.tick_interval_ms = interval_ms;
            }
            if let (Some(lat), Some(lon)) = (base_lat, base_lon) {
                server_config.simulator.base_latitude = lat;
                server_config.simulator.base_longitude = lon;
            }

            let server = MockServer::new(config.server.clone()).context("Invalid server configuration")?;
            let mut stop = shutdown_on_ctrl_c();

            tokio::select! {
                result = server.run() => result.context("Server failed to start")?,
                _ = stop.wait_for(|stopped| *stopped) => {}
            }
            server.stop().await;
        }
        Command::Receive {
            host,
            port,
            read_timeout,
            backoff_ms,
            log_dir,
        } => {
            let receiver_config = &mut config.receiver;
            if let Some(host) = host {
                receiver_config.host = host;
            }
            if let Some(port) = port {
                receiver_config.port = port;
            }
            if let Some(secs) = read_timeout {
                receiver_config.set_read_timeout_secs(secs);
            }
            if let Some(backoff_ms) = backoff_ms {
                receiver_config.reconnect_backoff_ms = backoff_ms;
            }
            if let Some(log_dir) = log_dir {
                receiver_config.log_dir = log_dir;
            }

            let csv_log = CsvLog::create(&config.receiver.log_dir).context("Failed to create CSV log")?;
            log::info!("CSV log: {}", csv_log.path().display());

            let mut receiver = StreamReceiver::new(config.receiver.clone(), csv_log);
            receiver.run(shutdown_on_ctrl_c()).await;

            let stats = receiver.stats();
            log::info!(
                "{} record(s) written over {} session(s), {} sentence(s) discarded",
                stats.records_written,
                stats.sessions,
                stats.lines_discarded
            );
        }
        Command::WriteConfig => {
            let path = match cli.config {
                Some(path) => path,
                None => AppConfig::get_config_path()?,
            };
            config.save_to_file(&path)?;
            println!("Configuration written to {}", path.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_failed_signal_does_not_shut_down() {
        let mut stop = shutdown_on(async {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "no signal handler"))
        });
        let waited = tokio::time::timeout(Duration::from_millis(100), stop.wait_for(|stopped| *stopped)).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_signal_raises_shutdown() {
        let mut stop = shutdown_on(async { Ok(()) });
        assert!(stop.wait_for(|stopped| *stopped).await.is_ok());
    }
}
