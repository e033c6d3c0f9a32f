//! One byte-stream peer: the read and write loops and the shared handle.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::io;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_util::codec::Decoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::NodeConfig;
use crate::dialect::{self, Message, MessageRaw};
use crate::error::{Error, FrameError};
use crate::frame::{Frame, FrameDecoder, FrameEncoder, MAX_FRAME_SIZE};
use crate::signature::Signer;
use crate::transport::{StreamPair, StreamReader, StreamWriter};

use super::{Event, NodeShared};

/// One queued write: a typed message (generate path) or a fully-formed
/// frame (routing path), plus the completion token the node awaits.
pub(crate) struct WriteItem {
    pub payload: WritePayload,
    pub done: oneshot::Sender<()>,
}

#[derive(Clone)]
pub(crate) enum WritePayload {
    Message(Box<dyn Message>),
    Frame(Frame),
}

pub(crate) struct ChannelShared {
    pub id: u64,
    pub label: String,
    pub write_tx: mpsc::Sender<WriteItem>,
    /// Stops both loops; child of the node token.
    pub cancel: CancellationToken,
    /// Cancelled once the channel has fully terminated.
    pub done: CancellationToken,
}

/// Handle to a live channel.
///
/// Handles are cheap to clone and compare by identity; the label names the
/// peer (transport kind plus remote address) for logs and routing
/// decisions.
#[derive(Clone)]
pub struct Channel {
    pub(crate) shared: Arc<ChannelShared>,
}

impl Channel {
    /// Endpoint-derived label, e.g. `tcp:203.0.113.7:5760`.
    pub fn label(&self) -> &str {
        &self.shared.label
    }

    pub(crate) fn id(&self) -> u64 {
        self.shared.id
    }

    /// Wait until the channel has fully terminated.
    pub(crate) async fn closed(&self) {
        self.shared.done.cancelled().await;
    }
}

impl PartialEq for Channel {
    fn eq(&self, other: &Self) -> bool {
        self.shared.id == other.shared.id
    }
}

impl Eq for Channel {}

impl Hash for Channel {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.shared.id.hash(state);
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.shared.id)
            .field("label", &self.shared.label)
            .finish()
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.shared.label)
    }
}

/// Channel supervisor: runs the read and write loops to completion, then
/// unregisters the channel and reports its closure.
pub(crate) async fn run(
    node: Arc<NodeShared>,
    channel: Channel,
    stream: StreamPair,
    write_rx: mpsc::Receiver<WriteItem>,
    network: bool,
) {
    debug!(channel = %channel, "channel open");
    node.emit(Event::ChannelOpen(channel.clone())).await;

    tokio::join!(
        read_loop(&node, &channel, stream.reader, network),
        write_loop(&node, &channel, stream.writer, write_rx, network),
    );

    node.channels.lock().await.remove(&channel.id());
    debug!(channel = %channel, "channel closed");
    node.emit(Event::ChannelClose(channel.clone())).await;
    channel.shared.done.cancel();
}

async fn read_loop(
    node: &Arc<NodeShared>,
    channel: &Channel,
    mut reader: Box<dyn StreamReader>,
    network: bool,
) {
    let config = &node.config;
    let mut decoder = FrameDecoder::new(config.dialect.clone(), config.in_signature_key.clone());
    let mut buf = BytesMut::with_capacity(MAX_FRAME_SIZE);
    let mut chunk = vec![0u8; config.transport.read_buffer_size];
    let cancel = channel.shared.cancel.clone();

    loop {
        // Drain every complete frame already buffered before reading again.
        loop {
            match decoder.decode(&mut buf) {
                Ok(Some(frame)) => match decode_message(config, &frame) {
                    Ok(message) => {
                        node.emit(Event::Frame {
                            channel: channel.clone(),
                            frame,
                            message,
                        })
                        .await;
                    }
                    Err(error) => {
                        node.emit(Event::ParseError {
                            channel: channel.clone(),
                            error,
                        })
                        .await;
                    }
                },
                Ok(None) => break,
                Err(Error::Frame(error)) => {
                    node.emit(Event::ParseError {
                        channel: channel.clone(),
                        error,
                    })
                    .await;
                }
                // The decoder itself performs no IO; nothing else can occur.
                Err(_) => break,
            }
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = read_chunk(reader.as_mut(), &mut chunk, network, config) => result,
        };
        match result {
            Ok(0) => {
                debug!(channel = %channel, "stream closed by peer");
                break;
            }
            Ok(received) => buf.extend_from_slice(&chunk[..received]),
            Err(error) => {
                debug!(channel = %channel, %error, "read error");
                break;
            }
        }
    }

    // Take the write loop down with us.
    channel.shared.cancel.cancel();
}

async fn read_chunk(
    reader: &mut dyn StreamReader,
    chunk: &mut [u8],
    network: bool,
    config: &NodeConfig,
) -> io::Result<usize> {
    if network {
        match timeout(config.transport.read_timeout, reader.recv(chunk)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "read timeout")),
        }
    } else {
        reader.recv(chunk).await
    }
}

/// Decode a frame's payload. Ids the dialect does not cover (and all frames
/// when no dialect is loaded) surface as [`MessageRaw`]; that is not an
/// error.
fn decode_message(config: &NodeConfig, frame: &Frame) -> Result<Box<dyn Message>, FrameError> {
    let Some(descriptor) = config
        .dialect
        .as_ref()
        .and_then(|dialect| dialect.message(frame.message_id()))
    else {
        return Ok(Box::new(MessageRaw {
            id: frame.message_id(),
            payload: frame.payload().to_vec(),
        }));
    };
    dialect::decode_payload(descriptor, frame.payload(), frame.version())
}

async fn write_loop(
    node: &Arc<NodeShared>,
    channel: &Channel,
    mut writer: Box<dyn StreamWriter>,
    mut write_rx: mpsc::Receiver<WriteItem>,
    network: bool,
) {
    let config = &node.config;
    let signer = config
        .out_signature_key
        .clone()
        .map(|key| Signer::new(key, config.out_signature_link_id));
    let mut encoder = FrameEncoder::new(
        config.out_version,
        config.out_system_id,
        config.out_component_id,
        config.dialect.clone(),
        signer,
    );
    let cancel = channel.shared.cancel.clone();

    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => break,
            item = write_rx.recv() => match item {
                Some(item) => item,
                None => break,
            },
        };

        let encoded = match &item.payload {
            WritePayload::Message(message) => encoder.encode_message(message.as_ref()),
            WritePayload::Frame(frame) => Ok(encoder.encode_frame(frame)),
        };

        match encoded {
            Ok(bytes) => {
                // Serial writes carry no timeout, so racing the token keeps
                // shutdown bounded even on a stalled transport.
                let result = tokio::select! {
                    _ = cancel.cancelled() => {
                        Err(io::Error::new(io::ErrorKind::Interrupted, "node closing"))
                    }
                    result = write_bytes(writer.as_mut(), &bytes, network, config) => result,
                };
                let _ = item.done.send(());
                if let Err(error) = result {
                    debug!(channel = %channel, %error, "write error");
                    break;
                }
            }
            Err(error) => {
                // Not transmittable (e.g. no descriptor); the channel stays up.
                warn!(channel = %channel, %error, "dropping unencodable write");
                let _ = item.done.send(());
            }
        }
    }

    // Acknowledge whatever is still queued so no writer stalls.
    write_rx.close();
    while let Ok(item) = write_rx.try_recv() {
        let _ = item.done.send(());
    }
    writer.close().await;
    channel.shared.cancel.cancel();
}

async fn write_bytes(
    writer: &mut dyn StreamWriter,
    bytes: &[u8],
    network: bool,
    config: &NodeConfig,
) -> io::Result<()> {
    if network {
        match timeout(config.transport.write_timeout, writer.send(bytes)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "write timeout")),
        }
    } else {
        writer.send(bytes).await
    }
}
