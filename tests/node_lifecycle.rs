//! End-to-end node tests over loopback sockets.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use perun::dialect::minimal::{self, Attitude, Heartbeat};
use perun::{
    Channel, Dialect, EndpointConfig, Event, EventStream, Frame, FrameError, FrameV2, MessageRaw,
    Node, NodeConfig, SecretKey,
};

const WAIT: Duration = Duration::from_secs(10);

fn dialect() -> Arc<Dialect> {
    Arc::new(minimal::dialect())
}

fn free_tcp_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn free_udp_port() -> u16 {
    std::net::UdpSocket::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn fast_heartbeat(system_id: u8, endpoints: Vec<EndpointConfig>) -> NodeConfig {
    NodeConfig {
        endpoints,
        dialect: Some(dialect()),
        heartbeat_period: Duration::from_millis(100),
        ..NodeConfig::new(system_id)
    }
}

async fn wait_open(events: &mut EventStream) -> Channel {
    loop {
        match timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for ChannelOpen")
            .expect("event stream ended")
        {
            Event::ChannelOpen(channel) => return channel,
            _ => {}
        }
    }
}

async fn wait_frame(events: &mut EventStream) -> (Channel, Frame, Box<dyn perun::Message>) {
    loop {
        match timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for Frame")
            .expect("event stream ended")
        {
            Event::Frame {
                channel,
                frame,
                message,
            } => return (channel, frame, message),
            _ => {}
        }
    }
}

async fn wait_parse_error(events: &mut EventStream) -> FrameError {
    loop {
        match timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for ParseError")
            .expect("event stream ended")
        {
            Event::ParseError { error, .. } => return error,
            _ => {}
        }
    }
}

#[tokio::test]
async fn tcp_nodes_exchange_heartbeats() {
    let port = free_tcp_port();
    let server = Node::new(fast_heartbeat(
        1,
        vec![EndpointConfig::TcpServer {
            bind: format!("127.0.0.1:{port}"),
        }],
    ))
    .await
    .unwrap();
    let mut server_events = server.events().unwrap();

    let client = Node::new(fast_heartbeat(
        2,
        vec![EndpointConfig::TcpClient {
            remote: format!("127.0.0.1:{port}"),
        }],
    ))
    .await
    .unwrap();
    let mut client_events = client.events().unwrap();

    // The server sees the client's heartbeat and vice versa.
    let (_, frame, message) = wait_frame(&mut server_events).await;
    assert_eq!(frame.system_id(), 2);
    let heartbeat = message.as_any().downcast_ref::<Heartbeat>().unwrap();
    assert_eq!(heartbeat.r#type, 6);
    assert_eq!(heartbeat.mavlink_version, 3);

    let (_, frame, message) = wait_frame(&mut client_events).await;
    assert_eq!(frame.system_id(), 1);
    assert!(message.as_any().downcast_ref::<Heartbeat>().is_some());

    client.close().await;
    server.close().await;
}

#[tokio::test]
async fn write_to_targets_a_single_channel() {
    let port = free_tcp_port();
    let mut server_config = fast_heartbeat(
        1,
        vec![EndpointConfig::TcpServer {
            bind: format!("127.0.0.1:{port}"),
        }],
    );
    server_config.heartbeat_disable = true;
    let server = Node::new(server_config).await.unwrap();
    let mut server_events = server.events().unwrap();

    let mut client_config = fast_heartbeat(
        7,
        vec![EndpointConfig::TcpClient {
            remote: format!("127.0.0.1:{port}"),
        }],
    );
    client_config.heartbeat_disable = true;
    let client = Node::new(client_config).await.unwrap();
    let mut client_events = client.events().unwrap();

    let peer = wait_open(&mut server_events).await;
    assert!(peer.label().starts_with("tcp:"));

    let attitude = Attitude {
        time_boot_ms: 42,
        roll: 0.5,
        yaw: -1.25,
        ..Attitude::default()
    };
    server.write_to(&peer, &attitude).await;

    let (_, frame, message) = wait_frame(&mut client_events).await;
    assert_eq!(frame.message_id(), 30);
    assert_eq!(frame.system_id(), 1);
    let received = message.as_any().downcast_ref::<Attitude>().unwrap();
    assert_eq!(received.time_boot_ms, 42);
    assert_eq!(received.roll, 0.5);
    assert_eq!(received.yaw, -1.25);

    // write_except skipping the only channel writes nowhere and returns.
    server.write_except(&peer, &attitude).await;

    client.close().await;
    server.close().await;
}

#[tokio::test]
async fn routed_frames_with_unknown_ids_surface_raw() {
    let port = free_tcp_port();
    let mut server_config = fast_heartbeat(
        1,
        vec![EndpointConfig::TcpServer {
            bind: format!("127.0.0.1:{port}"),
        }],
    );
    server_config.heartbeat_disable = true;
    let server = Node::new(server_config).await.unwrap();
    let mut server_events = server.events().unwrap();

    // The client routes a hand-built frame whose id no dialect covers.
    let mut client_config = fast_heartbeat(
        9,
        vec![EndpointConfig::TcpClient {
            remote: format!("127.0.0.1:{port}"),
        }],
    );
    client_config.heartbeat_disable = true;
    client_config.dialect = None;
    let client = Node::new(client_config).await.unwrap();
    let mut client_events = client.events().unwrap();
    wait_open(&mut client_events).await;

    let frame = Frame::V2(FrameV2 {
        incompat_flags: 0,
        compat_flags: 0,
        sequence: 3,
        system_id: 9,
        component_id: 1,
        message_id: 60_000,
        payload: vec![0xAA, 0xBB],
        checksum: 0x1234,
        signature: None,
    });
    client.write_frame_all(frame).await;

    let (_, frame, message) = wait_frame(&mut server_events).await;
    assert_eq!(frame.message_id(), 60_000);
    let raw = message.as_any().downcast_ref::<MessageRaw>().unwrap();
    assert_eq!(raw.id, 60_000);
    assert_eq!(raw.payload, [0xAA, 0xBB]);

    client.close().await;
    server.close().await;
}

#[tokio::test]
async fn unsigned_traffic_is_rejected_when_verification_is_required() {
    let port = free_tcp_port();
    let mut server_config = fast_heartbeat(
        1,
        vec![EndpointConfig::TcpServer {
            bind: format!("127.0.0.1:{port}"),
        }],
    );
    server_config.heartbeat_disable = true;
    server_config.in_signature_key = Some(SecretKey::new(b"verification key"));
    let server = Node::new(server_config).await.unwrap();
    let mut server_events = server.events().unwrap();

    let client = Node::new(fast_heartbeat(
        2,
        vec![EndpointConfig::TcpClient {
            remote: format!("127.0.0.1:{port}"),
        }],
    ))
    .await
    .unwrap();

    let error = wait_parse_error(&mut server_events).await;
    assert_eq!(error, FrameError::SignatureMissing);

    client.close().await;
    server.close().await;
}

#[tokio::test]
async fn signed_traffic_verifies_end_to_end() {
    let key = SecretKey::new(b"shared secret");
    let port = free_tcp_port();

    let mut server_config = fast_heartbeat(
        1,
        vec![EndpointConfig::TcpServer {
            bind: format!("127.0.0.1:{port}"),
        }],
    );
    server_config.in_signature_key = Some(key.clone());
    server_config.out_signature_key = Some(key.clone());
    let server = Node::new(server_config).await.unwrap();
    let mut server_events = server.events().unwrap();

    let mut client_config = fast_heartbeat(
        2,
        vec![EndpointConfig::TcpClient {
            remote: format!("127.0.0.1:{port}"),
        }],
    );
    client_config.in_signature_key = Some(key.clone());
    client_config.out_signature_key = Some(key);
    let client = Node::new(client_config).await.unwrap();
    let mut client_events = client.events().unwrap();

    let (_, frame, _) = wait_frame(&mut server_events).await;
    assert!(frame.signature().is_some());
    let (_, frame, _) = wait_frame(&mut client_events).await;
    assert!(frame.signature().is_some());

    client.close().await;
    server.close().await;
}

#[tokio::test]
async fn udp_nodes_exchange_heartbeats() {
    let port = free_udp_port();
    let server = Node::new(fast_heartbeat(
        1,
        vec![EndpointConfig::UdpServer {
            bind: format!("127.0.0.1:{port}"),
        }],
    ))
    .await
    .unwrap();
    let mut server_events = server.events().unwrap();

    let client = Node::new(fast_heartbeat(
        2,
        vec![EndpointConfig::UdpClient {
            remote: format!("127.0.0.1:{port}"),
        }],
    ))
    .await
    .unwrap();
    let mut client_events = client.events().unwrap();

    // The server learns the peer from its first datagram, then talks back.
    let (channel, frame, _) = wait_frame(&mut server_events).await;
    assert_eq!(frame.system_id(), 2);
    assert!(channel.label().starts_with("udp:"));

    let (_, frame, _) = wait_frame(&mut client_events).await;
    assert_eq!(frame.system_id(), 1);

    client.close().await;
    server.close().await;
}

#[tokio::test]
async fn close_is_bounded_with_a_slow_consumer() {
    let port = free_tcp_port();
    let mut server_config = fast_heartbeat(
        1,
        vec![EndpointConfig::TcpServer {
            bind: format!("127.0.0.1:{port}"),
        }],
    );
    server_config.heartbeat_period = Duration::from_millis(20);
    let server = Node::new(server_config).await.unwrap();
    let mut server_events = server.events().unwrap();

    let mut client_config = fast_heartbeat(
        2,
        vec![EndpointConfig::TcpClient {
            remote: format!("127.0.0.1:{port}"),
        }],
    );
    client_config.heartbeat_period = Duration::from_millis(20);
    let client = Node::new(client_config).await.unwrap();
    let _client_events = client.events().unwrap();

    // Let the unread event queues fill up.
    tokio::time::sleep(Duration::from_millis(500)).await;

    timeout(Duration::from_secs(5), client.close())
        .await
        .expect("client close must complete with a slow consumer");
    timeout(Duration::from_secs(5), server.close())
        .await
        .expect("server close must complete with a slow consumer");

    // The stream terminates exactly once: after draining buffered events it
    // keeps reporting the end.
    let ended = timeout(WAIT, async {
        while server_events.recv().await.is_some() {}
    })
    .await;
    assert!(ended.is_ok(), "event stream must terminate");
    assert!(server_events.recv().await.is_none());
}

#[tokio::test]
async fn invalid_configurations_fail_construction() {
    let err = Node::new(NodeConfig::new(1)).await.unwrap_err();
    assert!(matches!(err, perun::Error::Config(_)));

    let err = Node::new(fast_heartbeat(0, vec![EndpointConfig::UdpClient {
        remote: "127.0.0.1:14550".into(),
    }]))
    .await
    .unwrap_err();
    assert!(matches!(err, perun::Error::Config(_)));

    // A taken port surfaces synchronously for listeners.
    let holder = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = holder.local_addr().unwrap().port();
    let result = Node::new(fast_heartbeat(
        1,
        vec![EndpointConfig::TcpServer {
            bind: format!("127.0.0.1:{port}"),
        }],
    ))
    .await;
    assert!(result.is_err());
}
