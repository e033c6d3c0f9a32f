//! Serial port endpoint.

use std::io;

use async_trait::async_trait;
use tokio_serial::SerialPortBuilderExt;

use super::{split_io, Connector, StreamPair};

/// Serial port connection. Reopened on failure like a network client, but
/// never subject to the network read timeout: a silent serial peer is
/// normal.
pub struct SerialConnector {
    device: String,
    baud: u32,
}

impl SerialConnector {
    pub fn new(device: String, baud: u32) -> Self {
        Self { device, baud }
    }
}

#[async_trait]
impl Connector for SerialConnector {
    fn label(&self) -> String {
        format!("serial:{}", self.device)
    }

    async fn connect(&self) -> io::Result<StreamPair> {
        let stream = tokio_serial::new(&self.device, self.baud)
            .open_native_async()
            .map_err(|error| io::Error::new(io::ErrorKind::Other, error))?;
        Ok(split_io(stream))
    }

    fn network(&self) -> bool {
        false
    }
}
