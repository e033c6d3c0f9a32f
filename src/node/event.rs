//! Events surfaced by a node.

use tokio::sync::mpsc;

use crate::dialect::Message;
use crate::error::FrameError;
use crate::frame::Frame;

use super::Channel;

/// Event emitted on the node event stream.
#[derive(Debug)]
pub enum Event {
    /// A channel was created and its I/O loops started.
    ChannelOpen(Channel),

    /// A channel terminated. No later event references it.
    ChannelClose(Channel),

    /// A frame passed validation. `message` is the decoded payload, or a
    /// [`MessageRaw`](crate::dialect::MessageRaw) when the dialect does not
    /// cover the id (or no dialect is loaded).
    Frame {
        channel: Channel,
        frame: Frame,
        message: Box<dyn Message>,
    },

    /// A frame failed validation. The channel stays open and keeps
    /// scanning.
    ParseError {
        channel: Channel,
        error: FrameError,
    },
}

/// Receiving half of the node event stream.
///
/// A single consumer reads events in order. The stream ends (`recv` returns
/// `None`) once the node has closed and all buffered events are drained.
#[derive(Debug)]
pub struct EventStream {
    pub(crate) rx: mpsc::Receiver<Event>,
}

impl EventStream {
    /// Receive the next event.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}
