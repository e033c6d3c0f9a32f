//! Descriptor-driven payload marshalling.
//!
//! The codec walks a message's fields in canonical wire order and lets the
//! typed value move the bytes for each field. V2 payloads are truncated on
//! encode (trailing zero bytes stripped, at least one byte kept) and
//! right-zero-padded on decode; V1 payloads carry exactly the non-extension
//! prefix.

use crate::error::FrameError;
use crate::frame::Version;

use super::{Message, MessageDescriptor};

/// Serialize a typed message against its descriptor.
pub fn encode_payload(
    message: &dyn Message,
    descriptor: &MessageDescriptor,
    version: Version,
) -> Vec<u8> {
    let extensions = version == Version::V2;
    let mut payload = Vec::with_capacity(descriptor.full_size());
    for &index in descriptor.wire_order(extensions) {
        message.emit_field(index, &mut payload);
    }
    if version == Version::V2 {
        while payload.len() > 1 && payload.last() == Some(&0) {
            payload.pop();
        }
    }
    payload
}

/// Deserialize a payload against its descriptor into a typed message.
///
/// The payload is right-padded with zero bytes up to the descriptor's wire
/// size before reading, recovering V2 truncation. For V1 frames only the
/// non-extension prefix is read; extension fields keep their zero defaults.
pub fn decode_payload(
    descriptor: &MessageDescriptor,
    payload: &[u8],
    version: Version,
) -> Result<Box<dyn Message>, FrameError> {
    let extensions = version == Version::V2;
    let wire_size = match version {
        Version::V1 => descriptor.base_size(),
        Version::V2 => descriptor.full_size(),
    };
    if payload.len() > wire_size {
        return Err(FrameError::LengthInvalid {
            id: descriptor.id(),
            got: payload.len(),
            max: wire_size,
        });
    }

    let mut padded = vec![0u8; wire_size];
    padded[..payload.len()].copy_from_slice(payload);

    let mut message = descriptor.new_message();
    let mut offset = 0;
    for &index in descriptor.wire_order(extensions) {
        let size = descriptor.fields()[index].wire_size();
        message.store_field(index, &padded[offset..offset + size]);
        offset += size;
    }
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::minimal::{self, Attitude, CommandLong, Heartbeat, ParamValue, PlayTune, SystemTime};

    fn roundtrip<M>(message: M, version: Version) -> M
    where
        M: Message + Clone + PartialEq + std::fmt::Debug + 'static,
    {
        let dialect = minimal::dialect();
        let descriptor = dialect.message(message.id()).unwrap();
        let payload = encode_payload(&message, descriptor, version);
        let decoded = decode_payload(descriptor, &payload, version).unwrap();
        decoded.as_any().downcast_ref::<M>().unwrap().clone()
    }

    #[test]
    fn test_heartbeat_roundtrip() {
        let message = Heartbeat {
            r#type: 6,
            autopilot: 8,
            base_mode: 128,
            custom_mode: 0xDEAD_BEEF,
            system_status: 4,
            mavlink_version: 3,
        };
        assert_eq!(roundtrip(message.clone(), Version::V2), message);
        assert_eq!(roundtrip(message.clone(), Version::V1), message);
    }

    #[test]
    fn test_heartbeat_canonical_layout() {
        let dialect = minimal::dialect();
        let descriptor = dialect.message(0).unwrap();
        let message = Heartbeat {
            r#type: 6,
            autopilot: 8,
            base_mode: 0,
            custom_mode: 0,
            system_status: 4,
            mavlink_version: 3,
        };
        // custom_mode first (largest field), then the u8 block in declared order.
        let payload = encode_payload(&message, descriptor, Version::V2);
        assert_eq!(payload, [0, 0, 0, 0, 6, 8, 0, 4, 3]);
    }

    #[test]
    fn test_v2_truncation_strips_trailing_zeros() {
        let dialect = minimal::dialect();
        let descriptor = dialect.message(2).unwrap();
        let message = SystemTime {
            time_unix_usec: 7,
            time_boot_ms: 0,
        };
        let payload = encode_payload(&message, descriptor, Version::V2);
        assert_eq!(payload, [7]);

        // V1 never truncates.
        let payload = encode_payload(&message, descriptor, Version::V1);
        assert_eq!(payload.len(), descriptor.base_size());
    }

    #[test]
    fn test_all_zero_payload_keeps_one_byte() {
        let dialect = minimal::dialect();
        let descriptor = dialect.message(0).unwrap();
        let message = Heartbeat::default();
        let payload = encode_payload(&message, descriptor, Version::V2);
        assert_eq!(payload, [0]);
    }

    #[test]
    fn test_truncated_payload_is_zero_padded() {
        let dialect = minimal::dialect();
        let descriptor = dialect.message(2).unwrap();
        let decoded = decode_payload(descriptor, &[7], Version::V2).unwrap();
        let message = decoded.as_any().downcast_ref::<SystemTime>().unwrap();
        assert_eq!(message.time_unix_usec, 7);
        assert_eq!(message.time_boot_ms, 0);
    }

    #[test]
    fn test_oversized_payload_is_rejected() {
        let dialect = minimal::dialect();
        let descriptor = dialect.message(2).unwrap();
        let payload = vec![0u8; descriptor.full_size() + 1];
        let err = decode_payload(descriptor, &payload, Version::V2).unwrap_err();
        assert!(matches!(err, FrameError::LengthInvalid { id: 2, .. }));
    }

    #[test]
    fn test_char_array_roundtrip() {
        let mut param_id = [0u8; 16];
        param_id[..7].copy_from_slice(b"RATE_HZ");
        let message = ParamValue {
            param_id,
            param_value: 12.5,
            param_type: 9,
            param_count: 40,
            param_index: 3,
        };
        assert_eq!(roundtrip(message.clone(), Version::V2), message);
        assert_eq!(roundtrip(message.clone(), Version::V1), message);
    }

    #[test]
    fn test_float_fields_roundtrip() {
        let message = Attitude {
            time_boot_ms: 123_456,
            roll: 0.1,
            pitch: -0.2,
            yaw: 3.14,
            rollspeed: 0.0,
            pitchspeed: -1.5,
            yawspeed: 2.25,
        };
        assert_eq!(roundtrip(message.clone(), Version::V2), message);

        let message = CommandLong {
            param1: 1.0,
            param2: 2.0,
            param3: 0.0,
            param4: -4.0,
            param5: 5.5,
            param6: 0.0,
            param7: 7.0,
            command: 400,
            target_system: 1,
            target_component: 1,
            confirmation: 0,
        };
        assert_eq!(roundtrip(message.clone(), Version::V2), message);
    }

    #[test]
    fn test_extension_fields_absent_in_v1() {
        let mut message = PlayTune::default();
        message.target_system = 1;
        message.tune[..3].copy_from_slice(b"MFT");
        message.tune2[..4].copy_from_slice(b"O4L8");

        let dialect = minimal::dialect();
        let descriptor = dialect.message(258).unwrap();

        let v1 = encode_payload(&message, descriptor, Version::V1);
        assert_eq!(v1.len(), descriptor.base_size());

        let decoded = decode_payload(descriptor, &v1, Version::V1).unwrap();
        let decoded = decoded.as_any().downcast_ref::<PlayTune>().unwrap();
        assert_eq!(decoded.tune, message.tune);
        // The extension never traveled, so it decodes to its default.
        assert_eq!(decoded.tune2, [0u8; 200]);

        // In V2 the extension survives the roundtrip.
        assert_eq!(roundtrip(message.clone(), Version::V2), message);
    }
}
