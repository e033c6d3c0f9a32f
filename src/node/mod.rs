//! The multi-endpoint node runtime.
//!
//! A [`Node`] owns its endpoints, the channels they produce and the
//! heartbeat emitter, multiplexes their I/O onto tokio tasks and surfaces
//! everything that happens on a single in-order [`EventStream`]. Writes fan
//! in through per-channel queues with a write-and-wait discipline: every
//! write operation returns only after each targeted channel has taken the
//! item off its queue and attempted transmission, so a racing shutdown can
//! never drop an accepted write silently.

mod channel;
mod endpoint;
mod event;
mod heartbeat;

pub use channel::Channel;
pub use event::{Event, EventStream};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::NodeConfig;
use crate::dialect::Message;
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::transport::{self, Endpoint, StreamPair};

use channel::{ChannelShared, WriteItem, WritePayload};

/// Capacity of the event stream.
const EVENT_QUEUE: usize = 64;

/// Capacity of each channel's write queue.
const WRITE_QUEUE: usize = 16;

/// A MAVLink node: a set of endpoints, the channels living on them, and one
/// event stream.
#[derive(Debug)]
pub struct Node {
    shared: Arc<NodeShared>,
    events: parking_lot::Mutex<Option<EventStream>>,
    tasks: JoinSet<()>,
}

#[derive(Debug)]
pub(crate) struct NodeShared {
    pub(crate) config: NodeConfig,
    pub(crate) cancel: CancellationToken,
    pub(crate) event_tx: mpsc::Sender<Event>,
    pub(crate) channels: Mutex<HashMap<u64, Channel>>,
    next_channel_id: AtomicU64,
}

impl Node {
    /// Validate the configuration, bind all listener endpoints and start
    /// the runtime.
    pub async fn new(config: NodeConfig) -> Result<Self> {
        config.validate()?;

        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);
        let shared = Arc::new(NodeShared {
            config,
            cancel: CancellationToken::new(),
            event_tx,
            channels: Mutex::new(HashMap::new()),
            next_channel_id: AtomicU64::new(0),
        });

        // Open every endpoint before spawning anything, so a bad
        // configuration fails the whole construction.
        let mut endpoints = Vec::with_capacity(shared.config.endpoints.len());
        for endpoint_config in &shared.config.endpoints {
            endpoints.push(transport::open(endpoint_config, &shared.config.transport).await?);
        }

        let mut tasks = JoinSet::new();
        for opened in endpoints {
            match opened {
                Endpoint::Single(connector) => {
                    tasks.spawn(endpoint::run_connector(shared.clone(), connector));
                }
                Endpoint::Listener(listener) => {
                    tasks.spawn(endpoint::run_listener(shared.clone(), listener));
                }
            }
        }
        if !shared.config.heartbeat_disable {
            tasks.spawn(heartbeat::run(shared.clone()));
        }

        info!(
            endpoints = shared.config.endpoints.len(),
            system_id = shared.config.out_system_id,
            "node started"
        );
        Ok(Self {
            shared,
            events: parking_lot::Mutex::new(Some(EventStream { rx: event_rx })),
            tasks,
        })
    }

    /// Take the event stream. There is exactly one; a second call fails.
    pub fn events(&self) -> Result<EventStream> {
        self.events.lock().take().ok_or(Error::EventsTaken)
    }

    /// Write a message to one channel.
    pub async fn write_to(&self, channel: &Channel, message: &dyn Message) {
        self.shared
            .write_to(channel, WritePayload::Message(message.clone_message()))
            .await;
    }

    /// Write a message to every channel.
    pub async fn write_all(&self, message: &dyn Message) {
        self.shared
            .write_fanout(None, &WritePayload::Message(message.clone_message()))
            .await;
    }

    /// Write a message to every channel except one.
    pub async fn write_except(&self, channel: &Channel, message: &dyn Message) {
        self.shared
            .write_fanout(Some(channel), &WritePayload::Message(message.clone_message()))
            .await;
    }

    /// Route a fully-formed frame to one channel. All frame fields travel
    /// as given, including sequence, checksum and signature.
    pub async fn write_frame_to(&self, channel: &Channel, frame: Frame) {
        self.shared
            .write_to(channel, WritePayload::Frame(frame))
            .await;
    }

    /// Route a fully-formed frame to every channel.
    pub async fn write_frame_all(&self, frame: Frame) {
        self.shared
            .write_fanout(None, &WritePayload::Frame(frame))
            .await;
    }

    /// Route a fully-formed frame to every channel except one.
    pub async fn write_frame_except(&self, channel: &Channel, frame: Frame) {
        self.shared
            .write_fanout(Some(channel), &WritePayload::Frame(frame))
            .await;
    }

    /// Stop the heartbeat, the endpoints and every channel, wait for all of
    /// them, then let the event stream end. Returns in bounded time even if
    /// nobody is reading events.
    pub async fn close(mut self) {
        info!("node closing");
        self.shared.cancel.cancel();

        // Endpoint and heartbeat tasks first: nothing creates channels
        // afterwards.
        while self.tasks.join_next().await.is_some() {}

        let channels: Vec<Channel> = self.shared.channels.lock().await.values().cloned().collect();
        for channel in channels {
            channel.closed().await;
        }
        debug!("node closed");
        // Dropping the node drops the last event sender, ending the stream.
    }
}

impl NodeShared {
    /// Register a new channel and start its supervisor.
    pub(crate) async fn create_channel(
        self: &Arc<Self>,
        stream: StreamPair,
        label: String,
        network: bool,
    ) -> Channel {
        let id = self.next_channel_id.fetch_add(1, Ordering::Relaxed);
        let (write_tx, write_rx) = mpsc::channel(WRITE_QUEUE);
        let channel = Channel {
            shared: Arc::new(ChannelShared {
                id,
                label,
                write_tx,
                cancel: self.cancel.child_token(),
                done: CancellationToken::new(),
            }),
        };
        self.channels.lock().await.insert(id, channel.clone());
        tokio::spawn(channel::run(
            self.clone(),
            channel.clone(),
            stream,
            write_rx,
            network,
        ));
        channel
    }

    /// Send an event, unless the node is shutting down. Racing the
    /// cancellation token here is what keeps `close` bounded when the
    /// consumer has stopped reading.
    pub(crate) async fn emit(&self, event: Event) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = self.event_tx.send(event) => {}
        }
    }

    async fn enqueue(channel: &Channel, payload: WritePayload) -> Option<oneshot::Receiver<()>> {
        let (done, ack) = oneshot::channel();
        channel
            .shared
            .write_tx
            .send(WriteItem { payload, done })
            .await
            .ok()
            .map(|()| ack)
    }

    /// Write to one channel and wait for its acknowledgement. A channel
    /// that is no longer registered is a no-op.
    pub(crate) async fn write_to(&self, channel: &Channel, payload: WritePayload) {
        let pending = {
            let channels = self.channels.lock().await;
            if !channels.contains_key(&channel.id()) {
                return;
            }
            Self::enqueue(channel, payload).await
        };
        if let Some(ack) = pending {
            let _ = ack.await;
        }
    }

    /// Write to every channel (minus `except`) and wait for every
    /// acknowledgement. The channel-set mutex is held only while enqueueing;
    /// completions are awaited after it is released, each fan-out counting
    /// its own tokens. A channel that dies mid-fanout acknowledges by
    /// dropping its token, so the wait always terminates.
    pub(crate) async fn write_fanout(&self, except: Option<&Channel>, payload: &WritePayload) {
        let mut pending = Vec::new();
        {
            let channels = self.channels.lock().await;
            for target in channels.values() {
                if except.is_some_and(|excluded| excluded == target) {
                    continue;
                }
                if let Some(ack) = Self::enqueue(target, payload.clone()).await {
                    pending.push(ack);
                }
            }
        }
        for ack in pending {
            let _ = ack.await;
        }
    }
}
