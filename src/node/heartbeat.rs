//! Periodic heartbeat emitter.

use std::sync::Arc;

use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::channel::WritePayload;
use super::NodeShared;

/// Emit a HEARTBEAT to every channel each period. Does nothing when the
/// dialect is absent or does not define HEARTBEAT.
pub(crate) async fn run(node: Arc<NodeShared>) {
    let config = &node.config;
    let Some(dialect) = config.dialect.as_ref() else {
        return;
    };
    let Some(descriptor) = dialect.message_by_name("HEARTBEAT") else {
        debug!("dialect has no HEARTBEAT, emitter disabled");
        return;
    };

    // The message never changes; build it once from configuration.
    let mut message = descriptor.new_message();
    let values: [(&str, Vec<u8>); 6] = [
        ("type", vec![config.heartbeat_system_type]),
        ("autopilot", vec![config.heartbeat_autopilot]),
        ("base_mode", vec![config.heartbeat_base_mode]),
        (
            "custom_mode",
            config.heartbeat_custom_mode.to_le_bytes().to_vec(),
        ),
        ("system_status", vec![config.heartbeat_system_status]),
        ("mavlink_version", vec![config.heartbeat_mavlink_version]),
    ];
    for (name, bytes) in &values {
        if let Some(index) = descriptor.field_index(name) {
            message.store_field(index, bytes);
        }
    }

    let mut ticker = tokio::time::interval(config.heartbeat_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await; // the first tick completes immediately

    loop {
        tokio::select! {
            _ = node.cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        node.write_fanout(None, &WritePayload::Message(message.clone_message()))
            .await;
    }
}
