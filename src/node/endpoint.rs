//! Endpoint drivers: accept loops for listeners and connect loops for
//! client-style endpoints.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::transport::{Connector, Listener};

use super::NodeShared;

/// Accept peers until shutdown; every accepted stream becomes a channel.
pub(crate) async fn run_listener(node: Arc<NodeShared>, mut listener: Box<dyn Listener>) {
    let label = listener.label();
    debug!(endpoint = %label, "listening");

    loop {
        let accepted = tokio::select! {
            _ = node.cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, peer_label)) => {
                node.create_channel(stream, peer_label, true).await;
            }
            Err(error) => {
                warn!(endpoint = %label, %error, "accept failed");
                // Brief pause so a broken listener cannot spin.
                if backoff(&node).await {
                    break;
                }
            }
        }
    }
}

/// Dial until shutdown. Each established stream becomes a channel; when the
/// channel dies the connection is re-established after the backoff.
pub(crate) async fn run_connector(node: Arc<NodeShared>, connector: Box<dyn Connector>) {
    let label = connector.label();

    loop {
        let connected = tokio::select! {
            _ = node.cancel.cancelled() => break,
            connected = connector.connect() => connected,
        };
        match connected {
            Ok(stream) => {
                debug!(endpoint = %label, "connected");
                let channel = node
                    .create_channel(stream, label.clone(), connector.network())
                    .await;
                channel.closed().await;
            }
            Err(error) => debug!(endpoint = %label, %error, "connect failed"),
        }
        if backoff(&node).await {
            break;
        }
    }
}

/// Sleep for the reconnect backoff. Returns true when the node is shutting
/// down.
async fn backoff(node: &NodeShared) -> bool {
    tokio::select! {
        _ = node.cancel.cancelled() => true,
        _ = tokio::time::sleep(node.config.transport.reconnect_backoff) => false,
    }
}
