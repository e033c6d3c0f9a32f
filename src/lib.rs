//! # Perun
//!
//! A multi-endpoint MAVLink 1.0/2.0 protocol node. Perun frames, parses,
//! validates, signs and routes MAVLink traffic across heterogeneous
//! transports and can power ground stations, routers and monitoring systems
//! in a MAVLink network.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Node / Event Stream                     │
//! ├──────────────────────────────────────────────────────────────┤
//! │   Channels (read loop / write loop, one per connected peer)  │
//! │  ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌──────────┐      │
//! │  │ serial   │  │ tcp peer │  │ udp peer │  │   ...    │      │
//! │  └──────────┘  └──────────┘  └──────────┘  └──────────┘      │
//! ├──────────────────────────────────────────────────────────────┤
//! │        Frame codec (magic/CRC/signature state machine)       │
//! ├──────────────────────────────────────────────────────────────┤
//! │     Message codec (dialect descriptors, canonical order)     │
//! ├──────────────────────────────────────────────────────────────┤
//! │     Transports (serial / TCP / UDP, client and server)       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use perun::dialect::minimal;
//! use perun::{EndpointConfig, Event, Node, NodeConfig};
//!
//! #[tokio::main]
//! async fn main() -> perun::Result<()> {
//!     let node = Node::new(NodeConfig {
//!         endpoints: vec![EndpointConfig::Serial {
//!             device: "/dev/ttyUSB0".into(),
//!             baud: 57_600,
//!         }],
//!         dialect: Some(Arc::new(minimal::dialect())),
//!         ..NodeConfig::new(10)
//!     })
//!     .await?;
//!
//!     let mut events = node.events()?;
//!     while let Some(event) = events.recv().await {
//!         if let Event::Frame { frame, message, .. } = event {
//!             println!("received id={} {:?}", frame.message_id(), message);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

#![warn(clippy::all, clippy::pedantic)]
// Allow stylistic lints that don't affect correctness
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)] // Payload lengths fit in a byte by construction
#![allow(clippy::doc_markdown)] // MAVLink, CRC_EXTRA etc. in docs
#![allow(clippy::future_not_send)] // Async internals

pub mod config;
pub mod dialect;
pub mod error;
pub mod frame;
pub mod node;
pub mod signature;
pub mod transport;

pub use config::{EndpointConfig, NodeConfig, TransportConfig};
pub use dialect::{Dialect, Message, MessageRaw};
pub use error::{ConfigError, Error, FrameError, Result};
pub use frame::{Frame, FrameV1, FrameV2, Version};
pub use node::{Channel, Event, EventStream, Node};
pub use signature::SecretKey;
