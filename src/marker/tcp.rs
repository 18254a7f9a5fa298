//! TCP marker transport
//!
//! Each outlet listens on its own port. A consumer connects, receives one JSON
//! header line describing the stream, then one JSON line per sample. Every open
//! connection counts as one consumer until it reaches EOF or a write fails.

use super::info::{MarkerSample, StreamInfo};
use super::outlet::{MarkerOutlet, OutletFactory};
use super::{MarkerError, MarkerResult};
use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

/// Samples buffered per consumer before a slow consumer starts losing them
const SAMPLE_BUFFER: usize = 1024;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Network-visible outlet for one marker stream
pub struct TcpOutlet {
    info: StreamInfo,
    local_addr: SocketAddr,
    samples: broadcast::Sender<Arc<str>>,
    consumers: Arc<watch::Sender<usize>>,
    shutdown: CancellationToken,
}

impl TcpOutlet {
    /// Bind the listener and start accepting consumers. Must be called from
    /// within a tokio runtime.
    pub async fn bind(info: StreamInfo, addr: SocketAddr) -> MarkerResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| MarkerError::Bind {
                addr,
                reason: e.to_string(),
            })?;
        let local_addr = listener.local_addr()?;

        let header: Arc<str> = Arc::from(format!("{}\n", serde_json::to_string(&info)?));
        let (samples, _) = broadcast::channel(SAMPLE_BUFFER);
        let (consumers, _) = watch::channel(0usize);
        let consumers = Arc::new(consumers);
        let shutdown = CancellationToken::new();

        tokio::spawn(accept_loop(
            listener,
            header,
            samples.clone(),
            consumers.clone(),
            shutdown.clone(),
            info.name.clone(),
        ));

        tracing::info!(
            "Marker stream '{}' ({}) listening on {}",
            info.name,
            info.source_id,
            local_addr
        );

        Ok(Self {
            info,
            local_addr,
            samples,
            consumers,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[async_trait]
impl MarkerOutlet for TcpOutlet {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn endpoint(&self) -> Option<SocketAddr> {
        Some(self.local_addr)
    }

    fn consumer_count(&self) -> usize {
        *self.consumers.borrow()
    }

    async fn wait_for_consumers(&self, timeout: Duration) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }
        let mut rx = self.consumers.subscribe();
        let shutdown = self.shutdown.clone();

        let wait = async move {
            loop {
                let attached = *rx.borrow_and_update() > 0;
                if attached {
                    return true;
                }
                tokio::select! {
                    changed = rx.changed() => {
                        if changed.is_err() {
                            return false;
                        }
                    }
                    _ = shutdown.cancelled() => {
                        return false;
                    }
                }
            }
        };

        tokio::time::timeout(timeout, wait).await.unwrap_or(false)
    }

    fn push_sample(&self, sample: MarkerSample) -> MarkerResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(MarkerError::Closed);
        }

        let mut line = serde_json::to_string(&sample)?;
        line.push('\n');
        // No receivers just means nobody is listening right now
        let _ = self.samples.send(Arc::from(line));
        Ok(())
    }

    fn close(&self) {
        if !self.shutdown.is_cancelled() {
            self.shutdown.cancel();
            tracing::info!("Marker stream '{}' closed", self.info.name);
        }
    }
}

impl Drop for TcpOutlet {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Keeps the consumer count in step with live connections
struct ConsumerGuard {
    consumers: Arc<watch::Sender<usize>>,
}

impl ConsumerGuard {
    fn attach(consumers: Arc<watch::Sender<usize>>) -> Self {
        consumers.send_modify(|n| *n += 1);
        Self { consumers }
    }
}

impl Drop for ConsumerGuard {
    fn drop(&mut self) {
        self.consumers.send_modify(|n| *n = n.saturating_sub(1));
    }
}

async fn accept_loop(
    listener: TcpListener,
    header: Arc<str>,
    samples: broadcast::Sender<Arc<str>>,
    consumers: Arc<watch::Sender<usize>>,
    shutdown: CancellationToken,
    stream_name: String,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    // Subscribe before counting so a consumer that is visible in
                    // the count never misses a later sample.
                    let rx = samples.subscribe();
                    let guard = ConsumerGuard::attach(consumers.clone());
                    tracing::info!("Consumer {} attached to marker stream '{}'", peer, stream_name);
                    tokio::spawn(serve_consumer(
                        socket,
                        peer,
                        header.clone(),
                        rx,
                        guard,
                        shutdown.clone(),
                        stream_name.clone(),
                    ));
                }
                Err(e) => {
                    tracing::warn!("Marker stream '{}' accept failed: {}", stream_name, e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
    tracing::debug!("Marker stream '{}' stopped accepting consumers", stream_name);
}

async fn serve_consumer(
    socket: TcpStream,
    peer: SocketAddr,
    header: Arc<str>,
    mut samples: broadcast::Receiver<Arc<str>>,
    _guard: ConsumerGuard,
    shutdown: CancellationToken,
    stream_name: String,
) {
    let _ = socket.set_nodelay(true);
    let (mut reader, mut writer) = socket.into_split();

    if let Err(e) = writer.write_all(header.as_bytes()).await {
        tracing::debug!("Failed to send header to {}: {}", peer, e);
        return;
    }

    let mut scratch = [0u8; 256];
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            read = reader.read(&mut scratch) => match read {
                // Consumers have nothing to say; anything they send is discarded
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            },
            sample = samples.recv() => match sample {
                Ok(line) => {
                    if writer.write_all(line.as_bytes()).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Consumer {} lagged, {} markers dropped", peer, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    let _ = writer.shutdown().await;
    tracing::info!("Consumer {} detached from marker stream '{}'", peer, stream_name);
}

/// Binds `TcpOutlet`s on a fixed interface. With a non-zero base port each
/// session listens on `base_port + slot`; otherwise the OS picks a port.
#[derive(Debug, Clone)]
pub struct TcpOutletFactory {
    bind_ip: IpAddr,
    base_port: u16,
}

impl TcpOutletFactory {
    pub fn new(bind_ip: IpAddr, base_port: u16) -> Self {
        Self { bind_ip, base_port }
    }

    fn port_for(&self, slot: usize) -> MarkerResult<u16> {
        if self.base_port == 0 {
            return Ok(0);
        }
        u16::try_from(slot)
            .ok()
            .and_then(|slot| self.base_port.checked_add(slot))
            .ok_or_else(|| {
                MarkerError::Protocol(format!(
                    "no port left for slot {} above base port {}",
                    slot, self.base_port
                ))
            })
    }
}

#[async_trait]
impl OutletFactory for TcpOutletFactory {
    async fn create(&self, info: StreamInfo, slot: usize) -> MarkerResult<Arc<dyn MarkerOutlet>> {
        let addr = SocketAddr::new(self.bind_ip, self.port_for(slot)?);
        Ok(Arc::new(TcpOutlet::bind(info, addr).await?))
    }
}

/// Consumer side of a TCP marker stream
pub struct MarkerInlet {
    info: StreamInfo,
    lines: Lines<BufReader<OwnedReadHalf>>,
    // Dropping the write half would look like a disconnect to the outlet
    _writer: OwnedWriteHalf,
}

impl MarkerInlet {
    /// Connect and read the stream header
    pub async fn connect(addr: impl ToSocketAddrs) -> MarkerResult<Self> {
        let socket = TcpStream::connect(addr).await?;
        let _ = socket.set_nodelay(true);
        let (reader, writer) = socket.into_split();
        let mut lines = BufReader::new(reader).lines();

        let header = lines
            .next_line()
            .await?
            .ok_or_else(|| MarkerError::Protocol("stream closed before header".to_string()))?;
        let info: StreamInfo = serde_json::from_str(&header)?;

        Ok(Self {
            info,
            lines,
            _writer: writer,
        })
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    /// Next sample, or `None` once the outlet has closed the stream
    pub async fn next_sample(&mut self) -> MarkerResult<Option<MarkerSample>> {
        match self.lines.next_line().await? {
            Some(line) => Ok(Some(serde_json::from_str(&line)?)),
            None => Ok(None),
        }
    }
}
