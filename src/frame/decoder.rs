//! Stream decoder for MAVLink frames.
//!
//! One decoder instance serves one channel: besides the dialect and the
//! optional verification key it owns the inbound signature-timestamp
//! high-water marks, which are scoped per (link id, system id, component id)
//! on a single link.

use std::collections::HashMap;
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use crate::dialect::Dialect;
use crate::error::{Error, FrameError};
use crate::signature::{self, SecretKey};

use super::{
    crc::frame_checksum, Frame, FrameV1, FrameV2, SignatureBlock, HEADER_SIZE_V1, HEADER_SIZE_V2,
    IFLAG_SIGNED, MAGIC_V1, MAGIC_V2, SIGNATURE_SIZE,
};

/// Decoder state machine over a byte buffer.
pub struct FrameDecoder {
    dialect: Option<Arc<Dialect>>,
    /// Verification key; when set, unsigned frames and V1 frames are rejected.
    in_key: Option<SecretKey>,
    /// Timestamp high-water marks per (link id, system id, component id).
    watermarks: HashMap<(u8, u8, u8), u64>,
}

impl FrameDecoder {
    /// Create a decoder for one byte stream.
    pub fn new(dialect: Option<Arc<Dialect>>, in_key: Option<SecretKey>) -> Self {
        Self {
            dialect,
            in_key,
            watermarks: HashMap::new(),
        }
    }

    fn finish_v1(&self, data: &[u8]) -> Result<Frame, FrameError> {
        let payload_len = data[1] as usize;
        let frame = FrameV1 {
            sequence: data[2],
            system_id: data[3],
            component_id: data[4],
            message_id: data[5],
            payload: data[HEADER_SIZE_V1..HEADER_SIZE_V1 + payload_len].to_vec(),
            checksum: LittleEndian::read_u16(&data[HEADER_SIZE_V1 + payload_len..]),
        };

        self.check_crc(
            u32::from(frame.message_id),
            &data[1..HEADER_SIZE_V1 + payload_len],
            frame.checksum,
        )?;

        // V1 frames cannot carry a signature.
        if self.in_key.is_some() {
            return Err(FrameError::SignatureMissing);
        }

        Ok(Frame::V1(frame))
    }

    fn finish_v2(&mut self, data: &[u8]) -> Result<Frame, FrameError> {
        let payload_len = data[1] as usize;
        let incompat_flags = data[2];
        if incompat_flags & !IFLAG_SIGNED != 0 {
            return Err(FrameError::UnknownIncompatFlag(incompat_flags));
        }

        let crc_end = HEADER_SIZE_V2 + payload_len + 2;
        let signature = if incompat_flags & IFLAG_SIGNED != 0 {
            let block = &data[crc_end..crc_end + SIGNATURE_SIZE];
            let mut timestamp = [0u8; 8];
            timestamp[..6].copy_from_slice(&block[1..7]);
            let mut signature = [0u8; 6];
            signature.copy_from_slice(&block[7..13]);
            Some(SignatureBlock {
                link_id: block[0],
                timestamp: u64::from_le_bytes(timestamp),
                signature,
            })
        } else {
            None
        };

        let frame = FrameV2 {
            incompat_flags,
            compat_flags: data[3],
            sequence: data[4],
            system_id: data[5],
            component_id: data[6],
            message_id: LittleEndian::read_u24(&data[7..10]),
            payload: data[HEADER_SIZE_V2..HEADER_SIZE_V2 + payload_len].to_vec(),
            checksum: LittleEndian::read_u16(&data[HEADER_SIZE_V2 + payload_len..crc_end]),
            signature,
        };

        self.check_crc(
            frame.message_id,
            &data[1..HEADER_SIZE_V2 + payload_len],
            frame.checksum,
        )?;

        if let Some(key) = &self.in_key {
            let Some(block) = &frame.signature else {
                return Err(FrameError::SignatureMissing);
            };
            if !signature::verify(
                key,
                &data[..crc_end],
                block.link_id,
                block.timestamp,
                &block.signature,
            ) {
                return Err(FrameError::SignatureInvalid);
            }

            let scope = (block.link_id, frame.system_id, frame.component_id);
            let watermark = self.watermarks.get(&scope).copied().unwrap_or(0);
            if block.timestamp < watermark {
                return Err(FrameError::SignatureReplay {
                    got: block.timestamp,
                    watermark,
                });
            }
            self.watermarks.insert(scope, block.timestamp);
        }

        Ok(Frame::V2(frame))
    }

    /// Validate the checksum when the dialect can supply the CRC_EXTRA.
    /// Unknown ids pass through: their payload surfaces raw.
    fn check_crc(&self, message_id: u32, covered: &[u8], received: u16) -> Result<(), FrameError> {
        let Some(descriptor) = self.dialect.as_ref().and_then(|d| d.message(message_id)) else {
            return Ok(());
        };
        let computed = frame_checksum(covered, descriptor.crc_extra());
        if computed != received {
            return Err(FrameError::ChecksumMismatch {
                id: message_id,
                computed,
                received,
            });
        }
        Ok(())
    }
}

impl Decoder for FrameDecoder {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Error> {
        // Seek the next magic byte, discarding anything before it.
        let Some(start) = src
            .iter()
            .position(|&byte| byte == MAGIC_V1 || byte == MAGIC_V2)
        else {
            let skipped = src.len();
            src.clear();
            if skipped > 0 {
                return Err(FrameError::MagicLost(skipped).into());
            }
            return Ok(None);
        };
        if start > 0 {
            src.advance(start);
            return Err(FrameError::MagicLost(start).into());
        }

        let total = match src[0] {
            MAGIC_V1 => {
                if src.len() < 2 {
                    return Ok(None);
                }
                HEADER_SIZE_V1 + src[1] as usize + 2
            }
            _ => {
                if src.len() < 3 {
                    return Ok(None);
                }
                let signed = src[2] & IFLAG_SIGNED != 0;
                HEADER_SIZE_V2
                    + src[1] as usize
                    + 2
                    + if signed { SIGNATURE_SIZE } else { 0 }
            }
        };

        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let data = src.split_to(total);
        let frame = match data[0] {
            MAGIC_V1 => self.finish_v1(&data)?,
            _ => self.finish_v2(&data)?,
        };
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::minimal::{self, Heartbeat};
    use crate::frame::{FrameEncoder, Version};

    fn decoder(in_key: Option<SecretKey>) -> FrameDecoder {
        FrameDecoder::new(Some(Arc::new(minimal::dialect())), in_key)
    }

    fn heartbeat() -> Heartbeat {
        Heartbeat {
            r#type: 6,
            autopilot: 8,
            base_mode: 0,
            custom_mode: 0,
            system_status: 4,
            mavlink_version: 3,
        }
    }

    fn encode_heartbeat(version: Version) -> Vec<u8> {
        let mut encoder = FrameEncoder::new(
            version,
            1,
            1,
            Some(Arc::new(minimal::dialect())),
            None,
        );
        encoder.encode_message(&heartbeat()).unwrap()
    }

    #[test]
    fn test_parse_roundtrip_v2() {
        let mut decoder = decoder(None);
        let mut buf = BytesMut::from(&encode_heartbeat(Version::V2)[..]);
        let frame = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.version(), Version::V2);
        assert_eq!(frame.message_id(), 0);
        assert_eq!(frame.system_id(), 1);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_parse_roundtrip_v1() {
        let mut decoder = decoder(None);
        let mut buf = BytesMut::from(&encode_heartbeat(Version::V1)[..]);
        let frame = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.version(), Version::V1);
        assert_eq!(frame.message_id(), 0);
    }

    #[test]
    fn test_garbage_before_magic_is_skipped() {
        let mut decoder = decoder(None);
        let mut bytes = vec![0x00, 0x42, 0x13];
        bytes.extend_from_slice(&encode_heartbeat(Version::V2));
        let mut buf = BytesMut::from(&bytes[..]);

        let err = decoder.decode(&mut buf).unwrap_err();
        assert!(matches!(err, Error::Frame(FrameError::MagicLost(3))));

        // Scanning resumes at the magic byte.
        let frame = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.message_id(), 0);
    }

    #[test]
    fn test_incomplete_frame_waits_for_more_bytes() {
        let mut decoder = decoder(None);
        let bytes = encode_heartbeat(Version::V2);
        let mut buf = BytesMut::from(&bytes[..bytes.len() - 1]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&bytes[bytes.len() - 1..]);
        assert!(decoder.decode(&mut buf).unwrap().is_some());
    }

    #[test]
    fn test_corrupted_payload_fails_crc() {
        let mut decoder = decoder(None);
        let mut bytes = encode_heartbeat(Version::V2);
        let payload_start = HEADER_SIZE_V2;
        bytes[payload_start] ^= 0xFF;
        let mut buf = BytesMut::from(&bytes[..]);

        let err = decoder.decode(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            Error::Frame(FrameError::ChecksumMismatch { id: 0, .. })
        ));
        // The broken frame was consumed.
        assert!(buf.is_empty());
    }

    #[test]
    fn test_unknown_id_passes_without_crc_check() {
        // Message id 0x0BAD is not in the dialect, so the arbitrary checksum
        // cannot be validated and the frame surfaces as-is.
        let mut decoder = decoder(None);
        let mut bytes = vec![MAGIC_V2, 1, 0, 0, 7, 9, 9, 0xAD, 0x0B, 0x00, 0x55];
        bytes.extend_from_slice(&[0x12, 0x34]);
        let mut buf = BytesMut::from(&bytes[..]);

        let frame = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.message_id(), 0x0BAD);
        assert_eq!(frame.payload(), &[0x55]);
        assert_eq!(frame.checksum(), 0x3412);
    }

    #[test]
    fn test_unknown_incompat_flag_drops_frame() {
        let mut bytes = encode_heartbeat(Version::V2);
        bytes[2] = 0x04;
        let mut decoder = decoder(None);
        let mut buf = BytesMut::from(&bytes[..]);

        let err = decoder.decode(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            Error::Frame(FrameError::UnknownIncompatFlag(0x04))
        ));
    }

    #[test]
    fn test_unsigned_frame_rejected_when_key_configured() {
        let mut decoder = decoder(Some(SecretKey::new(b"key")));

        let mut buf = BytesMut::from(&encode_heartbeat(Version::V2)[..]);
        let err = decoder.decode(&mut buf).unwrap_err();
        assert!(matches!(err, Error::Frame(FrameError::SignatureMissing)));

        // V1 frames can never satisfy a signing requirement.
        let mut buf = BytesMut::from(&encode_heartbeat(Version::V1)[..]);
        let err = decoder.decode(&mut buf).unwrap_err();
        assert!(matches!(err, Error::Frame(FrameError::SignatureMissing)));
    }

    #[test]
    fn test_signed_roundtrip_and_replay() {
        use crate::signature::Signer;

        let key = SecretKey::new(&[0u8; 32]);
        let mut encoder = FrameEncoder::new(
            Version::V2,
            1,
            1,
            Some(Arc::new(minimal::dialect())),
            Some(Signer::new(key.clone(), 0)),
        );

        let first = encoder.encode_message(&heartbeat()).unwrap();
        let second = encoder.encode_message(&heartbeat()).unwrap();

        let mut decoder = decoder(Some(key));

        let mut buf = BytesMut::from(&first[..]);
        let frame = decoder.decode(&mut buf).unwrap().unwrap();
        let first_ts = frame.signature().unwrap().timestamp;

        let mut buf = BytesMut::from(&second[..]);
        let frame = decoder.decode(&mut buf).unwrap().unwrap();
        assert!(frame.signature().unwrap().timestamp > first_ts);

        // Replaying the first frame now violates the high-water mark.
        let mut buf = BytesMut::from(&first[..]);
        let err = decoder.decode(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            Error::Frame(FrameError::SignatureReplay { .. })
        ));
    }

    #[test]
    fn test_tampered_signed_frame_rejected() {
        use crate::signature::Signer;

        let key = SecretKey::new(b"secret");
        let mut encoder = FrameEncoder::new(
            Version::V2,
            1,
            1,
            Some(Arc::new(minimal::dialect())),
            Some(Signer::new(key.clone(), 3)),
        );

        let mut bytes = encoder.encode_message(&heartbeat()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01; // flip a signature bit

        let mut decoder = decoder(Some(key));
        let mut buf = BytesMut::from(&bytes[..]);
        let err = decoder.decode(&mut buf).unwrap_err();
        assert!(matches!(err, Error::Frame(FrameError::SignatureInvalid)));
    }
}
