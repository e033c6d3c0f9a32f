//! MAVLink frame layout.
//!
//! ## V1 frame
//!
//! ```text
//! ┌───────┬─────┬─────┬────────┬─────────┬────────┬─────────────┬──────────┐
//! │ 0xFE  │ len │ seq │ sys id │ comp id │ msg id │ payload     │ crc (2)  │
//! └───────┴─────┴─────┴────────┴─────────┴────────┴─────────────┴──────────┘
//! ```
//!
//! ## V2 frame
//!
//! ```text
//! ┌───────┬─────┬─────────┬────────┬─────┬─────┬──────┬────────────┬─────────┬─────────┬──────────┐
//! │ 0xFD  │ len │ incompat│ compat │ seq │ sys │ comp │ msg id (3) │ payload │ crc (2) │ sig (13) │
//! └───────┴─────┴─────────┴────────┴─────┴─────┴──────┴────────────┴─────────┴─────────┴──────────┘
//! ```
//!
//! The checksum is CRC-16/MCRF4XX over the bytes from `len` through the
//! payload, with the message's CRC_EXTRA appended to the input. The 13-byte
//! signature is present iff `incompat & 0x01`.

pub mod crc;
mod decoder;
mod encoder;

pub use decoder::FrameDecoder;
pub use encoder::FrameEncoder;

use serde::{Deserialize, Serialize};

/// Frame start marker for V1 frames.
pub const MAGIC_V1: u8 = 0xFE;

/// Frame start marker for V2 frames.
pub const MAGIC_V2: u8 = 0xFD;

/// Incompatibility flag bit marking a signed frame.
pub const IFLAG_SIGNED: u8 = 0x01;

/// Size of the 13-byte signature suffix.
pub const SIGNATURE_SIZE: usize = 13;

/// Largest possible frame on the wire: V2 header, 255-byte payload,
/// checksum and signature.
pub const MAX_FRAME_SIZE: usize = HEADER_SIZE_V2 + 255 + 2 + SIGNATURE_SIZE;

/// V1 header size including the magic byte.
pub(crate) const HEADER_SIZE_V1: usize = 6;

/// V2 header size including the magic byte.
pub(crate) const HEADER_SIZE_V2: usize = 10;

/// Frame version used to wrap outgoing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Version {
    /// MAVLink 2.0 frames.
    #[default]
    V2,
    /// MAVLink 1.0 frames.
    V1,
}

/// The 13-byte signature suffix of a signed V2 frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureBlock {
    /// Logical link id, scoping replay protection.
    pub link_id: u8,
    /// 10-µs units since 2015-01-01T00:00:00Z; 48 bits on the wire.
    pub timestamp: u64,
    /// Leading 6 bytes of the SHA-256 digest.
    pub signature: [u8; 6],
}

/// A MAVLink 1.0 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameV1 {
    pub sequence: u8,
    pub system_id: u8,
    pub component_id: u8,
    pub message_id: u8,
    pub payload: Vec<u8>,
    pub checksum: u16,
}

/// A MAVLink 2.0 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameV2 {
    pub incompat_flags: u8,
    pub compat_flags: u8,
    pub sequence: u8,
    pub system_id: u8,
    pub component_id: u8,
    pub message_id: u32,
    pub payload: Vec<u8>,
    pub checksum: u16,
    pub signature: Option<SignatureBlock>,
}

/// An on-wire frame of either version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    V1(FrameV1),
    V2(FrameV2),
}

impl Frame {
    /// Frame version.
    pub fn version(&self) -> Version {
        match self {
            Self::V1(_) => Version::V1,
            Self::V2(_) => Version::V2,
        }
    }

    /// Sequence number.
    pub fn sequence(&self) -> u8 {
        match self {
            Self::V1(frame) => frame.sequence,
            Self::V2(frame) => frame.sequence,
        }
    }

    /// System id of the sender.
    pub fn system_id(&self) -> u8 {
        match self {
            Self::V1(frame) => frame.system_id,
            Self::V2(frame) => frame.system_id,
        }
    }

    /// Component id of the sender.
    pub fn component_id(&self) -> u8 {
        match self {
            Self::V1(frame) => frame.component_id,
            Self::V2(frame) => frame.component_id,
        }
    }

    /// Message id carried by the frame.
    pub fn message_id(&self) -> u32 {
        match self {
            Self::V1(frame) => u32::from(frame.message_id),
            Self::V2(frame) => frame.message_id,
        }
    }

    /// Payload bytes, exactly as on the wire.
    pub fn payload(&self) -> &[u8] {
        match self {
            Self::V1(frame) => &frame.payload,
            Self::V2(frame) => &frame.payload,
        }
    }

    /// Received checksum.
    pub fn checksum(&self) -> u16 {
        match self {
            Self::V1(frame) => frame.checksum,
            Self::V2(frame) => frame.checksum,
        }
    }

    /// Signature block, if the frame is signed.
    pub fn signature(&self) -> Option<&SignatureBlock> {
        match self {
            Self::V1(_) => None,
            Self::V2(frame) => frame.signature.as_ref(),
        }
    }
}

impl FrameV1 {
    /// Serialize the magic byte, header and payload (everything the CRC
    /// covers, plus the magic).
    pub(crate) fn put_body(&self, buf: &mut Vec<u8>) {
        buf.push(MAGIC_V1);
        buf.push(self.payload.len() as u8);
        buf.push(self.sequence);
        buf.push(self.system_id);
        buf.push(self.component_id);
        buf.push(self.message_id);
        buf.extend_from_slice(&self.payload);
    }
}

impl FrameV2 {
    /// Serialize the magic byte, header and payload (everything the CRC
    /// covers, plus the magic).
    pub(crate) fn put_body(&self, buf: &mut Vec<u8>) {
        buf.push(MAGIC_V2);
        buf.push(self.payload.len() as u8);
        buf.push(self.incompat_flags);
        buf.push(self.compat_flags);
        buf.push(self.sequence);
        buf.push(self.system_id);
        buf.push(self.component_id);
        buf.extend_from_slice(&self.message_id.to_le_bytes()[..3]);
        buf.extend_from_slice(&self.payload);
    }
}
