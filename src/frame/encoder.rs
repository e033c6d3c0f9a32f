//! Frame writer: wraps messages into frames, stamping sequence numbers,
//! checksums and signatures.

use std::sync::Arc;

use crate::dialect::{self, Dialect, Message};
use crate::error::{Error, Result};
use crate::signature::Signer;

use super::{crc::frame_checksum, Frame, FrameV1, FrameV2, Version, IFLAG_SIGNED, MAX_FRAME_SIZE};

/// Encoder state for one channel: outbound sequence counter and signing
/// state. Sequence numbers are assigned here, at the point of wire encoding.
pub struct FrameEncoder {
    version: Version,
    system_id: u8,
    component_id: u8,
    dialect: Option<Arc<Dialect>>,
    signer: Option<Signer>,
    sequence: u8,
}

impl FrameEncoder {
    /// Create an encoder for one byte stream.
    pub fn new(
        version: Version,
        system_id: u8,
        component_id: u8,
        dialect: Option<Arc<Dialect>>,
        signer: Option<Signer>,
    ) -> Self {
        Self {
            version,
            system_id,
            component_id,
            dialect,
            signer,
            sequence: 0,
        }
    }

    /// Wrap a typed message into a frame and return its wire bytes.
    ///
    /// The checksum needs the message's CRC_EXTRA, so the id must be covered
    /// by the loaded dialect; route a fully-formed [`Frame`] instead to
    /// forward payloads this node cannot describe.
    pub fn encode_message(&mut self, message: &dyn Message) -> Result<Vec<u8>> {
        let descriptor = self
            .dialect
            .as_ref()
            .and_then(|dialect| dialect.message(message.id()))
            .ok_or(Error::NoDescriptor(message.id()))?;

        let payload = dialect::encode_payload(message, descriptor, self.version);
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);

        let mut buf = Vec::with_capacity(MAX_FRAME_SIZE);
        match self.version {
            Version::V1 => {
                let message_id = u8::try_from(message.id())
                    .map_err(|_| Error::V1IdOverflow(message.id()))?;
                let frame = FrameV1 {
                    sequence,
                    system_id: self.system_id,
                    component_id: self.component_id,
                    message_id,
                    payload,
                    checksum: 0,
                };
                frame.put_body(&mut buf);
                let checksum = frame_checksum(&buf[1..], descriptor.crc_extra());
                buf.extend_from_slice(&checksum.to_le_bytes());
            }
            Version::V2 => {
                let frame = FrameV2 {
                    incompat_flags: if self.signer.is_some() {
                        IFLAG_SIGNED
                    } else {
                        0
                    },
                    compat_flags: 0,
                    sequence,
                    system_id: self.system_id,
                    component_id: self.component_id,
                    message_id: message.id(),
                    payload,
                    checksum: 0,
                    signature: None,
                };
                frame.put_body(&mut buf);
                let checksum = frame_checksum(&buf[1..], descriptor.crc_extra());
                buf.extend_from_slice(&checksum.to_le_bytes());

                if let Some(signer) = &mut self.signer {
                    let block = signer.sign(&buf);
                    buf.push(block.link_id);
                    buf.extend_from_slice(&block.timestamp.to_le_bytes()[..6]);
                    buf.extend_from_slice(&block.signature);
                }
            }
        }
        Ok(buf)
    }

    /// Serialize an already-formed frame byte-exactly, keeping its sequence,
    /// checksum and signature. This is the routing path: all fields were
    /// filled by the originating node.
    pub fn encode_frame(&self, frame: &Frame) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MAX_FRAME_SIZE);
        match frame {
            Frame::V1(frame) => {
                frame.put_body(&mut buf);
                buf.extend_from_slice(&frame.checksum.to_le_bytes());
            }
            Frame::V2(frame) => {
                frame.put_body(&mut buf);
                buf.extend_from_slice(&frame.checksum.to_le_bytes());
                if let Some(block) = &frame.signature {
                    buf.push(block.link_id);
                    buf.extend_from_slice(&block.timestamp.to_le_bytes()[..6]);
                    buf.extend_from_slice(&block.signature);
                }
            }
        }
        buf
    }
}
