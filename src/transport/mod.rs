//! Transport layer: byte-stream endpoints over serial, TCP and UDP.
//!
//! Endpoints split into two capability sets, dispatched once at node
//! construction: a [`Connector`] yields one byte stream at a time
//! (client-style endpoints, re-established after failure), a [`Listener`]
//! produces a stream per accepted peer (server-style endpoints). Both hand
//! out [`StreamPair`]s so a channel's read and write loops run
//! independently.

mod serial;
mod socket;
mod tcp;
mod udp;

pub use serial::SerialConnector;
pub use tcp::{TcpConnector, TcpListenerEndpoint};
pub use udp::{UdpBroadcastConnector, UdpConnector, UdpListenerEndpoint};

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

use crate::config::{EndpointConfig, TransportConfig};
use crate::error::Result;

/// Reading half of a byte stream.
#[async_trait]
pub trait StreamReader: Send {
    /// Read up to `buf.len()` bytes. Zero means the stream closed.
    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Writing half of a byte stream.
#[async_trait]
pub trait StreamWriter: Send {
    /// Write all of `data`.
    async fn send(&mut self, data: &[u8]) -> io::Result<()>;

    /// Release the transport. Best effort.
    async fn close(&mut self);
}

/// A bidirectional byte stream carrying MAVLink frames to one peer.
pub struct StreamPair {
    pub reader: Box<dyn StreamReader>,
    pub writer: Box<dyn StreamWriter>,
}

/// An endpoint that yields one byte stream at a time.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Stable label; channels created from this endpoint carry it.
    fn label(&self) -> String;

    /// Establish the stream. Called again after the previous stream dies.
    async fn connect(&self) -> io::Result<StreamPair>;

    /// Whether channels are subject to the network read timeout.
    fn network(&self) -> bool {
        true
    }
}

/// An endpoint that listens and produces one byte stream per accepted peer.
#[async_trait]
pub trait Listener: Send {
    /// Stable label of the listening endpoint itself.
    fn label(&self) -> String;

    /// Wait for the next peer. Returns the stream and a peer-derived label.
    async fn accept(&mut self) -> io::Result<(StreamPair, String)>;
}

/// An instantiated endpoint.
pub enum Endpoint {
    /// Client-style endpoint with at most one live channel.
    Single(Box<dyn Connector>),
    /// Server-style endpoint with one channel per accepted peer.
    Listener(Box<dyn Listener>),
}

/// Open an endpoint from its configuration. Listener sockets are bound
/// here, so bind failures surface synchronously at node construction;
/// client-style endpoints dial lazily and retry on failure.
pub async fn open(config: &EndpointConfig, transport: &TransportConfig) -> Result<Endpoint> {
    match config {
        EndpointConfig::Serial { device, baud } => Ok(Endpoint::Single(Box::new(
            SerialConnector::new(device.clone(), *baud),
        ))),
        EndpointConfig::TcpClient { remote } => Ok(Endpoint::Single(Box::new(
            TcpConnector::new(remote.clone(), transport.connect_timeout),
        ))),
        EndpointConfig::TcpServer { bind } => Ok(Endpoint::Listener(Box::new(
            TcpListenerEndpoint::bind(bind).await?,
        ))),
        EndpointConfig::UdpClient { remote } => Ok(Endpoint::Single(Box::new(UdpConnector::new(
            remote.clone(),
        )))),
        EndpointConfig::UdpServer { bind } => Ok(Endpoint::Listener(Box::new(
            UdpListenerEndpoint::bind(bind, transport.read_buffer_size).await?,
        ))),
        EndpointConfig::UdpBroadcast { bind, broadcast } => Ok(Endpoint::Single(Box::new(
            UdpBroadcastConnector::new(bind.clone(), broadcast.clone()),
        ))),
    }
}

/// Resolve a `host:port` string to its first address.
pub(crate) async fn resolve(addr: &str) -> io::Result<SocketAddr> {
    tokio::net::lookup_host(addr).await?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no addresses for {addr}"),
        )
    })
}

/// Split an async stream into boxed transport halves.
pub(crate) fn split_io<T>(io: T) -> StreamPair
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(io);
    StreamPair {
        reader: Box::new(IoReader(reader)),
        writer: Box::new(IoWriter(writer)),
    }
}

struct IoReader<T>(ReadHalf<T>);

#[async_trait]
impl<T: AsyncRead + AsyncWrite + Send> StreamReader for IoReader<T> {
    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf).await
    }
}

struct IoWriter<T>(WriteHalf<T>);

#[async_trait]
impl<T: AsyncRead + AsyncWrite + Send> StreamWriter for IoWriter<T> {
    async fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.0.write_all(data).await?;
        self.0.flush().await
    }

    async fn close(&mut self) {
        let _ = self.0.shutdown().await;
    }
}
