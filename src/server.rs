// src/server.rs
//! TCP accept loop and periodic broadcast scheduling

use crate::{
    broadcast::Broadcaster,
    config::ServerConfig,
    error::{GpsError, Result},
    gps::simulator::FixSimulator,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    io::AsyncReadExt,
    net::{tcp::OwnedWriteHalf, TcpListener, TcpStream},
    sync::{watch, Mutex},
    task::{JoinHandle, JoinSet},
    time::{interval, sleep, MissedTickBehavior},
};

/// Pause after a failed accept so a persistent error does not spin.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Listening,
}

struct Running {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

/// Mock fix server: accepts clients and streams one GGA sentence to all of them per tick.
pub struct MockServer {
    config: ServerConfig,
    broadcaster: Arc<Broadcaster<OwnedWriteHalf>>,
    running: Mutex<Option<Running>>,
}

impl MockServer {
    pub fn new(config: ServerConfig) -> Result<Self> {
        let simulator = FixSimulator::new(config.simulator.clone())?;
        let broadcaster = Broadcaster::new(simulator, config.write_timeout());
        Ok(Self::with_broadcaster(config, broadcaster))
    }

    pub fn with_broadcaster(config: ServerConfig, broadcaster: Broadcaster<OwnedWriteHalf>) -> Self {
        Self {
            config,
            broadcaster: Arc::new(broadcaster),
            running: Mutex::new(None),
        }
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster<OwnedWriteHalf>> {
        &self.broadcaster
    }

    pub async fn state(&self) -> ServerState {
        if self.running.lock().await.is_some() {
            ServerState::Listening
        } else {
            ServerState::Stopped
        }
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.local_addr)
    }

    /// Bind the listener and spawn the tick and accept loops.
    ///
    /// A bind failure is returned to the caller. Starting an already
    /// running server returns the address it is listening on.
    pub async fn start(&self) -> Result<SocketAddr> {
        let mut running = self.running.lock().await;
        if let Some(current) = running.as_ref() {
            log::warn!("Server already listening on {}", current.local_addr);
            return Ok(current.local_addr);
        }

        let address = self.config.bind_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| GpsError::Bind(format!("Failed to bind {}: {}", address, e)))?;
        let local_addr = listener.local_addr()?;

        log::info!("Mock fix server listening on {}", local_addr);
        log::info!("Base position: {}", self.config.simulator.base());

        let (shutdown, shutdown_rx) = watch::channel(false);
        let tick_task = tokio::spawn(tick_loop(
            Arc::clone(&self.broadcaster),
            self.config.tick_interval(),
            shutdown_rx.clone(),
        ));
        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.broadcaster),
            shutdown_rx,
        ));

        *running = Some(Running {
            local_addr,
            shutdown,
            tasks: vec![tick_task, accept_task],
        });
        Ok(local_addr)
    }

    /// Start, then serve until `stop` is called from elsewhere.
    pub async fn run(&self) -> Result<()> {
        self.start().await?;
        let mut stopped = match self.running.lock().await.as_ref() {
            Some(running) => running.shutdown.subscribe(),
            None => return Ok(()),
        };
        wait_for_shutdown(&mut stopped).await;
        Ok(())
    }

    /// Close every client, the listener and the tick loop. Safe to call repeatedly.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            log::debug!("Stop requested but server is not running");
            return;
        };

        log::info!("Stopping server on {}...", running.local_addr);
        let _ = running.shutdown.send(true);
        for task in running.tasks {
            if let Err(e) = task.await {
                log::error!("Server task ended abnormally: {}", e);
            }
        }
        self.broadcaster.close_all().await;
        log::info!("Server stopped");
    }
}

/// Resolve once the shutdown flag is raised or its sender is gone.
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopped| *stopped).await;
}

async fn tick_loop(
    broadcaster: Arc<Broadcaster<OwnedWriteHalf>>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => break,
            _ = ticker.tick() => {}
        }

        let report = broadcaster.tick().await;
        let sample = &report.sample;
        if report.delivered > 0 || !report.pruned.is_empty() {
            log::info!(
                "GPS: {} | {} | {:02} Sats | HDOP: {:.1} | {} client(s)",
                sample.coordinate,
                sample.quality,
                sample.satellites,
                sample.hdop,
                report.delivered
            );
        } else {
            log::debug!("No clients, generated {}", report.sentence);
        }
    }
    log::debug!("Tick loop finished");
}

async fn accept_loop(
    listener: TcpListener,
    broadcaster: Arc<Broadcaster<OwnedWriteHalf>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut clients = JoinSet::new();

    loop {
        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    clients.spawn(serve_client(
                        stream,
                        peer,
                        Arc::clone(&broadcaster),
                        shutdown.clone(),
                    ));
                }
                Err(e) => {
                    log::warn!("Failed to accept connection: {}", e);
                    sleep(ACCEPT_RETRY_DELAY).await;
                }
            },
            // Reap finished client tasks as they complete
            Some(_) = clients.join_next(), if !clients.is_empty() => {}
        }
    }

    drop(listener);
    while clients.join_next().await.is_some() {}
    log::debug!("Accept loop finished");
}

/// Keep one client registered until it disconnects or the server stops.
async fn serve_client(
    stream: TcpStream,
    peer: SocketAddr,
    broadcaster: Arc<Broadcaster<OwnedWriteHalf>>,
    mut shutdown: watch::Receiver<bool>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        log::debug!("Could not disable Nagle for {}: {}", peer, e);
    }

    let (mut reader, writer) = stream.into_split();
    let id = broadcaster.register(peer.to_string(), writer).await;
    let active = broadcaster.len().await;
    log::info!("Client connected: {} ({} active)", peer, active);

    // Inbound data is ignored; reading only detects the peer going away.
    let mut buf = [0u8; 512];
    loop {
        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => break,
            read = reader.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => log::trace!("Ignoring {} bytes from {}", n, peer),
                Err(e) => {
                    log::debug!("Read error from {}: {}", peer, e);
                    break;
                }
            },
        }
    }

    broadcaster.unregister(id).await;
    log::info!("Client disconnected: {}", peer);
}
