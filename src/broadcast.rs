// src/broadcast.rs
//! Fan-out of simulated sentences to every live client connection

use crate::gps::{
    data::FixSample,
    nmea::{self, Sentence},
    simulator::FixSimulator,
};
use chrono::Utc;
use rand::{rngs::StdRng, SeedableRng};
use std::{
    collections::HashMap,
    io,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::Mutex,
    task::JoinSet,
    time::timeout,
};

pub type ConnectionId = u64;

/// A registered client: a label for status lines and its write half.
struct ClientConnection<W> {
    peer: String,
    writer: Arc<Mutex<W>>,
}

/// Outcome of one broadcast pass.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub sample: FixSample,
    pub sentence: Sentence,
    pub delivered: usize,
    pub pruned: Vec<String>,
}

/// Owns the live connection set and the fix source feeding it.
///
/// Every mutation of the set goes through one async lock. A tick snapshots
/// the set, writes outside the lock, then removes the failed connections in
/// a second locked step, so registrations racing with a tick are never lost.
pub struct Broadcaster<W> {
    simulator: FixSimulator,
    rng: std::sync::Mutex<StdRng>,
    connections: Mutex<HashMap<ConnectionId, ClientConnection<W>>>,
    next_id: AtomicU64,
    samples: AtomicU64,
    write_timeout: Duration,
}

impl<W> Broadcaster<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(simulator: FixSimulator, write_timeout: Duration) -> Self {
        Self::with_rng(simulator, write_timeout, StdRng::from_entropy())
    }

    /// Use a caller-provided random source, e.g. a seeded one.
    pub fn with_rng(simulator: FixSimulator, write_timeout: Duration, rng: StdRng) -> Self {
        Self {
            simulator,
            rng: std::sync::Mutex::new(rng),
            connections: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            samples: AtomicU64::new(0),
            write_timeout,
        }
    }

    pub async fn register(&self, peer: impl Into<String>, writer: W) -> ConnectionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let connection = ClientConnection {
            peer: peer.into(),
            writer: Arc::new(Mutex::new(writer)),
        };
        self.connections.lock().await.insert(id, connection);
        id
    }

    /// Remove a connection. Returns false when it was already gone.
    pub async fn unregister(&self, id: ConnectionId) -> bool {
        self.connections.lock().await.remove(&id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.connections.lock().await.contains_key(&id)
    }

    /// Number of samples generated so far, one per tick.
    pub fn samples_generated(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }

    /// Generate one sample and write it to every connection registered at tick start.
    pub async fn tick(&self) -> TickReport {
        let sample = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            self.simulator.next_sample(&mut *rng, Utc::now())
        };
        self.samples.fetch_add(1, Ordering::Relaxed);

        let sentence = nmea::encode_gga(&sample);
        let line: Arc<[u8]> = Arc::from(sentence.to_line().into_bytes());

        let snapshot: Vec<(ConnectionId, Arc<Mutex<W>>)> = self
            .connections
            .lock()
            .await
            .iter()
            .map(|(id, conn)| (*id, Arc::clone(&conn.writer)))
            .collect();

        let mut writes = JoinSet::new();
        for (id, writer) in snapshot {
            let line = Arc::clone(&line);
            let limit = self.write_timeout;
            writes.spawn(async move { (id, write_line(writer, &line, limit).await) });
        }

        let mut delivered = 0;
        let mut failed = Vec::new();
        while let Some(joined) = writes.join_next().await {
            match joined {
                Ok((_, Ok(()))) => delivered += 1,
                Ok((id, Err(e))) => failed.push((id, e)),
                Err(e) => log::error!("Write task failed: {}", e),
            }
        }

        let mut pruned = Vec::with_capacity(failed.len());
        if !failed.is_empty() {
            let mut connections = self.connections.lock().await;
            for (id, error) in failed {
                if let Some(conn) = connections.remove(&id) {
                    log::info!("Client {} dropped: {}", conn.peer, error);
                    pruned.push(conn.peer);
                }
            }
        }

        TickReport {
            sample,
            sentence,
            delivered,
            pruned,
        }
    }

    /// Shut down and drop every registered connection.
    pub async fn close_all(&self) {
        let drained: Vec<ClientConnection<W>> = {
            let mut connections = self.connections.lock().await;
            connections.drain().map(|(_, conn)| conn).collect()
        };

        for conn in drained {
            let mut writer = conn.writer.lock().await;
            if let Err(e) = writer.shutdown().await {
                log::debug!("Error closing {}: {}", conn.peer, e);
            }
        }
    }
}

async fn write_line<W>(writer: Arc<Mutex<W>>, line: &[u8], limit: Duration) -> io::Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut writer = writer.lock().await;
    let write = async {
        writer.write_all(line).await?;
        writer.flush().await
    };

    match timeout(limit, write).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("write did not complete within {:?}", limit),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulatorConfig;
    use tokio::io::{duplex, AsyncBufReadExt, BufReader, DuplexStream};

    fn broadcaster() -> Broadcaster<DuplexStream> {
        let simulator = FixSimulator::new(SimulatorConfig::default()).unwrap();
        Broadcaster::with_rng(simulator, Duration::from_millis(200), StdRng::seed_from_u64(11))
    }

    #[tokio::test]
    async fn test_tick_without_clients_still_generates() {
        let broadcaster = broadcaster();
        let report = broadcaster.tick().await;

        assert_eq!(report.delivered, 0);
        assert!(report.pruned.is_empty());
        assert_eq!(broadcaster.samples_generated(), 1);
        assert!(nmea::verify_checksum(report.sentence.as_str()).is_ok());
    }

    #[tokio::test]
    async fn test_every_client_receives_the_same_line() {
        let broadcaster = broadcaster();
        let mut readers = Vec::new();
        for i in 0..3 {
            let (server_side, client_side) = duplex(1024);
            broadcaster.register(format!("client-{}", i), server_side).await;
            readers.push(BufReader::new(client_side));
        }

        let report = broadcaster.tick().await;
        assert_eq!(report.delivered, 3);

        for reader in readers.iter_mut() {
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            assert_eq!(line, report.sentence.to_line());
        }
    }

    #[tokio::test]
    async fn test_failed_write_prunes_only_that_client() {
        let broadcaster = broadcaster();
        let (a, _keep_a) = duplex(1024);
        let (b, dropped) = duplex(1024);
        let (c, _keep_c) = duplex(1024);
        let id_a = broadcaster.register("a", a).await;
        let id_b = broadcaster.register("b", b).await;
        let id_c = broadcaster.register("c", c).await;
        drop(dropped);

        let report = broadcaster.tick().await;

        assert_eq!(report.delivered, 2);
        assert_eq!(report.pruned, vec!["b".to_string()]);
        assert_eq!(broadcaster.len().await, 2);
        assert!(broadcaster.contains(id_a).await);
        assert!(!broadcaster.contains(id_b).await);
        assert!(broadcaster.contains(id_c).await);
        assert_eq!(broadcaster.samples_generated(), 1);
    }

    #[tokio::test]
    async fn test_stalled_client_is_pruned_after_timeout() {
        let broadcaster = broadcaster();
        // Buffer smaller than a sentence and never read: the write stalls
        let (stalled, _reader) = duplex(8);
        let (healthy, mut healthy_reader) = duplex(1024);
        broadcaster.register("stalled", stalled).await;
        broadcaster.register("healthy", healthy).await;

        let report = broadcaster.tick().await;

        assert_eq!(report.delivered, 1);
        assert_eq!(report.pruned, vec!["stalled".to_string()]);
        let mut buf = vec![0u8; 256];
        let n = tokio::io::AsyncReadExt::read(&mut healthy_reader, &mut buf).await.unwrap();
        assert!(n > 0);
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let broadcaster = broadcaster();
        let (a, _keep) = duplex(64);
        let id = broadcaster.register("a", a).await;

        assert!(broadcaster.unregister(id).await);
        assert!(!broadcaster.unregister(id).await);
        assert!(!broadcaster.unregister(9999).await);
        assert!(broadcaster.is_empty().await);
    }

    #[tokio::test]
    async fn test_close_all_closes_streams() {
        let broadcaster = broadcaster();
        let (a, client) = duplex(64);
        broadcaster.register("a", a).await;

        broadcaster.close_all().await;
        assert!(broadcaster.is_empty().await);

        let mut reader = BufReader::new(client);
        let mut line = String::new();
        assert_eq!(reader.read_line(&mut line).await.unwrap(), 0);
    }
}
