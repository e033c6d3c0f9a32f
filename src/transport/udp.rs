//! UDP endpoints.
//!
//! UDP is connectionless, so the three endpoint kinds differ only in how
//! peers are identified: a client exchanges datagrams with one fixed remote,
//! a broadcast endpoint writes to the broadcast address, and a server demuxes
//! one socket into per-source pseudo-streams, surfacing every new source
//! address as an accepted peer.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::frame::MAX_FRAME_SIZE;

use super::{resolve, socket, Connector, Listener, StreamPair, StreamReader, StreamWriter};

/// Per-peer queue depth of the server demux. Overflow drops datagrams,
/// which is what UDP would have done anyway.
const PEER_QUEUE: usize = 32;

/// UDP exchange with one remote node.
pub struct UdpConnector {
    remote: String,
}

impl UdpConnector {
    pub fn new(remote: String) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl Connector for UdpConnector {
    fn label(&self) -> String {
        format!("udp:{}", self.remote)
    }

    async fn connect(&self) -> io::Result<StreamPair> {
        let remote = resolve(&self.remote).await?;
        let bind = if remote.is_ipv6() {
            SocketAddr::from(([0u8; 16], 0))
        } else {
            SocketAddr::from(([0u8; 4], 0))
        };
        let socket = UdpSocket::bind(bind).await?;
        socket.connect(remote).await?;
        let socket = Arc::new(socket);
        Ok(StreamPair {
            reader: Box::new(ConnectedReader(socket.clone())),
            writer: Box::new(ConnectedWriter(socket)),
        })
    }
}

struct ConnectedReader(Arc<UdpSocket>);

#[async_trait]
impl StreamReader for ConnectedReader {
    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.recv(buf).await
    }
}

struct ConnectedWriter(Arc<UdpSocket>);

#[async_trait]
impl StreamWriter for ConnectedWriter {
    async fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.0.send(data).await.map(|_| ())
    }

    async fn close(&mut self) {}
}

/// UDP broadcast: reads from the bind address, writes to the broadcast
/// address.
pub struct UdpBroadcastConnector {
    bind: String,
    broadcast: String,
}

impl UdpBroadcastConnector {
    pub fn new(bind: String, broadcast: String) -> Self {
        Self { bind, broadcast }
    }
}

#[async_trait]
impl Connector for UdpBroadcastConnector {
    fn label(&self) -> String {
        format!("udp-broadcast:{}", self.broadcast)
    }

    async fn connect(&self) -> io::Result<StreamPair> {
        let bind = resolve(&self.bind).await?;
        let target = resolve(&self.broadcast).await?;
        let socket = UdpSocket::from_std(socket::bind_udp(bind, true)?)?;
        let socket = Arc::new(socket);
        Ok(StreamPair {
            reader: Box::new(AnySourceReader(socket.clone())),
            writer: Box::new(TargetWriter { socket, target }),
        })
    }
}

struct AnySourceReader(Arc<UdpSocket>);

#[async_trait]
impl StreamReader for AnySourceReader {
    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let (len, _) = self.0.recv_from(buf).await?;
        Ok(len)
    }
}

struct TargetWriter {
    socket: Arc<UdpSocket>,
    target: SocketAddr,
}

#[async_trait]
impl StreamWriter for TargetWriter {
    async fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.socket.send_to(data, self.target).await.map(|_| ())
    }

    async fn close(&mut self) {}
}

/// UDP listener emulation: one socket, one pseudo-stream per source address.
pub struct UdpListenerEndpoint {
    bind: String,
    accept_rx: mpsc::Receiver<(StreamPair, String)>,
    demux: JoinHandle<()>,
}

impl UdpListenerEndpoint {
    /// Bind the socket and start the demux task.
    pub async fn bind(bind: &str, read_buffer_size: usize) -> crate::Result<Self> {
        let addr = resolve(bind).await?;
        let socket = UdpSocket::from_std(socket::bind_udp(addr, false)?)?;
        let (accept_tx, accept_rx) = mpsc::channel(16);
        let demux = tokio::spawn(demux(Arc::new(socket), accept_tx, read_buffer_size));
        Ok(Self {
            bind: bind.to_string(),
            accept_rx,
            demux,
        })
    }
}

impl Drop for UdpListenerEndpoint {
    fn drop(&mut self) {
        self.demux.abort();
    }
}

#[async_trait]
impl Listener for UdpListenerEndpoint {
    fn label(&self) -> String {
        format!("udp-server:{}", self.bind)
    }

    async fn accept(&mut self) -> io::Result<(StreamPair, String)> {
        self.accept_rx
            .recv()
            .await
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "udp listener terminated"))
    }
}

/// Route incoming datagrams to per-peer queues; unknown sources (and
/// sources whose previous channel has died) become newly accepted peers.
async fn demux(
    socket: Arc<UdpSocket>,
    accept_tx: mpsc::Sender<(StreamPair, String)>,
    read_buffer_size: usize,
) {
    let mut peers: HashMap<SocketAddr, mpsc::Sender<Vec<u8>>> = HashMap::new();
    let mut buf = vec![0u8; read_buffer_size.max(MAX_FRAME_SIZE)];
    loop {
        let (len, addr) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(error) => {
                // Transient, e.g. a port-unreachable bounce on Windows.
                debug!(%error, "udp server receive error");
                continue;
            }
        };
        let datagram = buf[..len].to_vec();

        let unrouted = match peers.get(&addr) {
            Some(tx) => match tx.try_send(datagram) {
                Ok(()) => None,
                Err(TrySendError::Full(_)) => None,
                Err(TrySendError::Closed(datagram)) => Some(datagram),
            },
            None => Some(datagram),
        };

        if let Some(datagram) = unrouted {
            let (tx, rx) = mpsc::channel(PEER_QUEUE);
            let _ = tx.try_send(datagram);
            let pair = StreamPair {
                reader: Box::new(PeerReader(rx)),
                writer: Box::new(PeerWriter {
                    socket: socket.clone(),
                    peer: addr,
                }),
            };
            if accept_tx.send((pair, format!("udp:{addr}"))).await.is_err() {
                return; // endpoint dropped
            }
            peers.insert(addr, tx);
        }
    }
}

struct PeerReader(mpsc::Receiver<Vec<u8>>);

#[async_trait]
impl StreamReader for PeerReader {
    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.0.recv().await {
            Some(datagram) => {
                let len = datagram.len().min(buf.len());
                buf[..len].copy_from_slice(&datagram[..len]);
                Ok(len)
            }
            None => Ok(0),
        }
    }
}

struct PeerWriter {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

#[async_trait]
impl StreamWriter for PeerWriter {
    async fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.socket.send_to(data, self.peer).await.map(|_| ())
    }

    async fn close(&mut self) {}
}
