//! Node and endpoint configuration.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;
use crate::error::ConfigError;
use crate::frame::Version;
use crate::signature::SecretKey;

/// Where a node connects to or listens for MAVLink peers.
///
/// Addresses are `host:port` strings, resolved when the endpoint is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EndpointConfig {
    /// Serial port.
    Serial { device: String, baud: u32 },
    /// TCP connection to a remote node, re-established on failure.
    TcpClient { remote: String },
    /// TCP listener; every accepted peer becomes a channel.
    TcpServer { bind: String },
    /// UDP exchange with one remote node.
    UdpClient { remote: String },
    /// UDP listener; every new source address becomes a channel.
    UdpServer { bind: String },
    /// UDP broadcast: reads from `bind`, writes to `broadcast`.
    UdpBroadcast { bind: String, broadcast: String },
}

impl EndpointConfig {
    /// Stable label identifying channels created by this endpoint.
    pub fn label(&self) -> String {
        match self {
            Self::Serial { device, .. } => format!("serial:{device}"),
            Self::TcpClient { remote } => format!("tcp:{remote}"),
            Self::TcpServer { bind } => format!("tcp-server:{bind}"),
            Self::UdpClient { remote } => format!("udp:{remote}"),
            Self::UdpServer { bind } => format!("udp-server:{bind}"),
            Self::UdpBroadcast { broadcast, .. } => format!("udp-broadcast:{broadcast}"),
        }
    }
}

/// Network transport tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Read buffer size in bytes.
    #[serde(default = "default_read_buffer")]
    pub read_buffer_size: usize,

    /// Connection timeout for client endpoints.
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Read timeout for network channels; a silent peer is considered gone.
    /// Serial channels have no read timeout.
    #[serde(default = "default_read_timeout", with = "humantime_serde")]
    pub read_timeout: Duration,

    /// Write timeout for network channels.
    #[serde(default = "default_write_timeout", with = "humantime_serde")]
    pub write_timeout: Duration,

    /// Delay before a client endpoint re-establishes a dead connection.
    #[serde(default = "default_reconnect_backoff", with = "humantime_serde")]
    pub reconnect_backoff: Duration,
}

fn default_read_buffer() -> usize {
    512
}
fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_read_timeout() -> Duration {
    Duration::from_secs(60)
}
fn default_write_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_reconnect_backoff() -> Duration {
    Duration::from_secs(2)
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: default_read_buffer(),
            connect_timeout: default_connect_timeout(),
            read_timeout: default_read_timeout(),
            write_timeout: default_write_timeout(),
            reconnect_backoff: default_reconnect_backoff(),
        }
    }
}

/// Node configuration.
///
/// Start from [`NodeConfig::new`] and fill in endpoints:
///
/// ```no_run
/// use perun::{EndpointConfig, NodeConfig};
///
/// let config = NodeConfig {
///     endpoints: vec![EndpointConfig::Serial {
///         device: "/dev/ttyUSB0".into(),
///         baud: 57_600,
///     }],
///     ..NodeConfig::new(10)
/// };
/// ```
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Endpoints this node communicates through. At least one is required.
    pub endpoints: Vec<EndpointConfig>,

    /// Message definitions used to decode and encode payloads. When absent,
    /// incoming frames surface with raw payloads and only fully-formed
    /// frames can be written.
    pub dialect: Option<Arc<Dialect>>,

    /// Verification key for incoming frames. When set, unsigned frames and
    /// V1 frames are discarded.
    pub in_signature_key: Option<SecretKey>,

    /// Frame version used to wrap outgoing messages.
    pub out_version: Version,

    /// System id stamped on outgoing frames; identifies this node in the
    /// network. Must be >= 1.
    pub out_system_id: u8,

    /// Component id stamped on outgoing frames.
    pub out_component_id: u8,

    /// Signing key for outgoing frames. Requires V2.
    pub out_signature_key: Option<SecretKey>,

    /// Link id carried in outgoing signatures.
    pub out_signature_link_id: u8,

    /// Disable the periodic heartbeat.
    pub heartbeat_disable: bool,

    /// Period between heartbeats.
    pub heartbeat_period: Duration,

    /// System type advertised by heartbeats (MAV_TYPE, default GCS).
    pub heartbeat_system_type: u8,

    /// Autopilot advertised by heartbeats (MAV_AUTOPILOT).
    pub heartbeat_autopilot: u8,

    /// Base mode advertised by heartbeats.
    pub heartbeat_base_mode: u8,

    /// Custom mode advertised by heartbeats.
    pub heartbeat_custom_mode: u32,

    /// System status advertised by heartbeats (MAV_STATE, default active).
    pub heartbeat_system_status: u8,

    /// Protocol version byte advertised by heartbeats.
    pub heartbeat_mavlink_version: u8,

    /// Network transport tuning.
    pub transport: TransportConfig,
}

impl NodeConfig {
    /// A configuration with the given system id and every other knob at its
    /// default.
    pub fn new(out_system_id: u8) -> Self {
        Self {
            endpoints: Vec::new(),
            dialect: None,
            in_signature_key: None,
            out_version: Version::default(),
            out_system_id,
            out_component_id: 1,
            out_signature_key: None,
            out_signature_link_id: 0,
            heartbeat_disable: false,
            heartbeat_period: Duration::from_secs(5),
            heartbeat_system_type: 6, // MAV_TYPE_GCS
            heartbeat_autopilot: 8,   // MAV_AUTOPILOT_INVALID
            heartbeat_base_mode: 0,
            heartbeat_custom_mode: 0,
            heartbeat_system_status: 4, // MAV_STATE_ACTIVE
            heartbeat_mavlink_version: 3,
            transport: TransportConfig::default(),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        if self.out_system_id < 1 {
            return Err(ConfigError::InvalidSystemId);
        }
        if self.out_signature_key.is_some() && self.out_version != Version::V2 {
            return Err(ConfigError::SignatureRequiresV2);
        }
        if !self.heartbeat_disable && self.heartbeat_period.is_zero() {
            return Err(ConfigError::InvalidHeartbeatPeriod);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> NodeConfig {
        NodeConfig {
            endpoints: vec![EndpointConfig::UdpClient {
                remote: "127.0.0.1:14550".into(),
            }],
            ..NodeConfig::new(1)
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_endpoints_required() {
        let config = NodeConfig::new(1);
        assert_eq!(config.validate(), Err(ConfigError::NoEndpoints));
    }

    #[test]
    fn test_system_id_must_be_nonzero() {
        let config = NodeConfig {
            out_system_id: 0,
            ..valid()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidSystemId));
    }

    #[test]
    fn test_signing_requires_v2() {
        let config = NodeConfig {
            out_version: Version::V1,
            out_signature_key: Some(SecretKey::new(b"key")),
            ..valid()
        };
        assert_eq!(config.validate(), Err(ConfigError::SignatureRequiresV2));
    }

    #[test]
    fn test_heartbeat_period_must_be_nonzero() {
        let config = NodeConfig {
            heartbeat_period: Duration::ZERO,
            ..valid()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidHeartbeatPeriod));

        // Unless heartbeats are disabled entirely.
        let config = NodeConfig {
            heartbeat_period: Duration::ZERO,
            heartbeat_disable: true,
            ..valid()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_endpoint_serde_roundtrip() {
        let endpoint = EndpointConfig::UdpBroadcast {
            bind: "0.0.0.0:14550".into(),
            broadcast: "255.255.255.255:14550".into(),
        };
        let json = serde_json::to_string(&endpoint).unwrap();
        let back: EndpointConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, endpoint);
        assert_eq!(endpoint.label(), "udp-broadcast:255.255.255.255:14550");
    }
}
