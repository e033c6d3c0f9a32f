//! TCP endpoints.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use super::{resolve, socket, split_io, Connector, Listener, StreamPair};

/// TCP connection to a remote node.
pub struct TcpConnector {
    remote: String,
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(remote: String, connect_timeout: Duration) -> Self {
        Self {
            remote,
            connect_timeout,
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    fn label(&self) -> String {
        format!("tcp:{}", self.remote)
    }

    async fn connect(&self) -> io::Result<StreamPair> {
        let stream = timeout(self.connect_timeout, TcpStream::connect(self.remote.as_str()))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timeout"))??;
        stream.set_nodelay(true)?;
        Ok(split_io(stream))
    }
}

/// TCP listener; every accepted peer becomes a channel.
pub struct TcpListenerEndpoint {
    bind: String,
    listener: TcpListener,
}

impl TcpListenerEndpoint {
    /// Bind the listening socket.
    pub async fn bind(bind: &str) -> crate::Result<Self> {
        let addr = resolve(bind).await?;
        let listener = TcpListener::from_std(socket::bind_tcp_listener(addr)?)?;
        Ok(Self {
            bind: bind.to_string(),
            listener,
        })
    }
}

#[async_trait]
impl Listener for TcpListenerEndpoint {
    fn label(&self) -> String {
        format!("tcp-server:{}", self.bind)
    }

    async fn accept(&mut self) -> io::Result<(StreamPair, String)> {
        let (stream, peer) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        Ok((split_io(stream), format!("tcp:{peer}")))
    }
}
