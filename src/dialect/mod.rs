//! Dialect metadata: message descriptors, canonical field ordering and
//! CRC_EXTRA computation.
//!
//! A [`Dialect`] is an immutable map from message id to [`MessageDescriptor`],
//! built once at startup and shared between the node and its codecs. The
//! descriptors drive everything the wire format needs: the canonical field
//! order (fields sorted by decreasing primitive size, stable on ties, with
//! extension fields appended in declared order), the per-message CRC_EXTRA
//! byte and the payload sizes for both frame versions.

mod codec;
pub mod minimal;

pub use codec::{decode_payload, encode_payload};

use std::any::Any;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::fmt;

use crate::frame::crc::Crc16;

/// Primitive wire type of a message field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    UInt8,
    Int8,
    UInt16,
    Int16,
    UInt32,
    Int32,
    UInt64,
    Int64,
    Float,
    Double,
    Char,
}

impl FieldType {
    /// Size of one element on the wire, in bytes.
    pub const fn size(self) -> usize {
        match self {
            Self::UInt8 | Self::Int8 | Self::Char => 1,
            Self::UInt16 | Self::Int16 => 2,
            Self::UInt32 | Self::Int32 | Self::Float => 4,
            Self::UInt64 | Self::Int64 | Self::Double => 8,
        }
    }

    /// C type name, as hashed by the CRC_EXTRA accumulator.
    pub const fn c_name(self) -> &'static str {
        match self {
            Self::UInt8 => "uint8_t",
            Self::Int8 => "int8_t",
            Self::UInt16 => "uint16_t",
            Self::Int16 => "int16_t",
            Self::UInt32 => "uint32_t",
            Self::Int32 => "int32_t",
            Self::UInt64 => "uint64_t",
            Self::Int64 => "int64_t",
            Self::Float => "float",
            Self::Double => "double",
            Self::Char => "char",
        }
    }
}

/// One field of a message, in declared order.
#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    /// Field name as it appears in the dialect definition.
    pub name: &'static str,
    /// Primitive type.
    pub typ: FieldType,
    /// Array length; 0 for scalars.
    pub array_len: usize,
    /// True for fields added after the message's initial release.
    pub extension: bool,
}

impl FieldDef {
    /// A scalar field.
    pub const fn scalar(name: &'static str, typ: FieldType) -> Self {
        Self {
            name,
            typ,
            array_len: 0,
            extension: false,
        }
    }

    /// A fixed-length array field.
    pub const fn array(name: &'static str, typ: FieldType, len: usize) -> Self {
        Self {
            name,
            typ,
            array_len: len,
            extension: false,
        }
    }

    /// Mark this field as an extension.
    pub const fn ext(self) -> Self {
        Self {
            name: self.name,
            typ: self.typ,
            array_len: self.array_len,
            extension: true,
        }
    }

    /// Bytes this field occupies on the wire.
    pub fn wire_size(&self) -> usize {
        self.typ.size() * self.array_len.max(1)
    }
}

/// Static description of one message type, as emitted by the dialect
/// generator.
pub struct MessageMeta {
    /// Native message id.
    pub id: u32,
    /// Wire name, e.g. `HEARTBEAT`.
    pub name: &'static str,
    /// Fields in declared order.
    pub fields: &'static [FieldDef],
    /// Constructor for an empty typed value.
    pub ctor: fn() -> Box<dyn Message>,
}

/// A message descriptor with the wire layout precomputed.
pub struct MessageDescriptor {
    meta: &'static MessageMeta,
    /// Declared-order field indices, sorted into canonical wire order.
    /// Non-extension fields come first; extensions follow in declared order.
    wire_order: Vec<usize>,
    /// Number of non-extension fields (prefix of `wire_order`).
    base_fields: usize,
    crc_extra: u8,
    /// Payload size of the non-extension prefix (the V1 payload size).
    base_size: usize,
    /// Payload size including extensions (the maximum V2 payload size).
    full_size: usize,
}

impl MessageDescriptor {
    fn new(meta: &'static MessageMeta) -> Self {
        let mut base: Vec<usize> = (0..meta.fields.len())
            .filter(|&i| !meta.fields[i].extension)
            .collect();
        // Canonical order: decreasing primitive size, stable on ties.
        base.sort_by_key(|&i| Reverse(meta.fields[i].typ.size()));

        let crc_extra = compute_crc_extra(meta, &base);
        let base_fields = base.len();
        let base_size = base.iter().map(|&i| meta.fields[i].wire_size()).sum();

        let mut wire_order = base;
        wire_order.extend((0..meta.fields.len()).filter(|&i| meta.fields[i].extension));
        let full_size = wire_order
            .iter()
            .map(|&i| meta.fields[i].wire_size())
            .sum();

        Self {
            meta,
            wire_order,
            base_fields,
            crc_extra,
            base_size,
            full_size,
        }
    }

    /// Native message id.
    pub fn id(&self) -> u32 {
        self.meta.id
    }

    /// Wire name.
    pub fn name(&self) -> &'static str {
        self.meta.name
    }

    /// Fields in declared order.
    pub fn fields(&self) -> &'static [FieldDef] {
        self.meta.fields
    }

    /// CRC_EXTRA byte mixed into the frame checksum.
    pub fn crc_extra(&self) -> u8 {
        self.crc_extra
    }

    /// Payload size of the non-extension prefix (V1 payload size).
    pub fn base_size(&self) -> usize {
        self.base_size
    }

    /// Payload size including extensions (maximum V2 payload size).
    pub fn full_size(&self) -> usize {
        self.full_size
    }

    /// Construct an empty typed message value.
    pub fn new_message(&self) -> Box<dyn Message> {
        (self.meta.ctor)()
    }

    /// Declared index of a field, looked up by name.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.meta.fields.iter().position(|f| f.name == name)
    }

    /// Canonical wire order as declared-order indices. `extensions` selects
    /// whether the extension suffix is included (V2) or not (V1).
    pub(crate) fn wire_order(&self, extensions: bool) -> &[usize] {
        if extensions {
            &self.wire_order
        } else {
            &self.wire_order[..self.base_fields]
        }
    }
}

impl fmt::Debug for MessageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageDescriptor")
            .field("id", &self.meta.id)
            .field("name", &self.meta.name)
            .field("crc_extra", &self.crc_extra)
            .finish()
    }
}

/// CRC_EXTRA: an 8-bit digest of the message name and the metadata of its
/// non-extension fields in canonical order, used to detect schema mismatches.
fn compute_crc_extra(meta: &MessageMeta, canonical: &[usize]) -> u8 {
    let mut crc = Crc16::new();
    crc.digest(meta.name.as_bytes());
    crc.accumulate(b' ');
    for &index in canonical {
        let field = &meta.fields[index];
        crc.digest(field.typ.c_name().as_bytes());
        crc.accumulate(b' ');
        crc.digest(field.name.as_bytes());
        crc.accumulate(b' ');
        if field.array_len > 0 {
            crc.accumulate(field.array_len as u8);
        }
    }
    let sum = crc.finish();
    (sum & 0xFF) as u8 ^ (sum >> 8) as u8
}

/// An immutable set of message descriptors.
///
/// Read-only after construction; share it between nodes as `Arc<Dialect>`.
pub struct Dialect {
    name: &'static str,
    messages: HashMap<u32, MessageDescriptor>,
}

impl Dialect {
    /// Build a dialect from generated message metadata.
    pub fn new(name: &'static str, metas: &'static [MessageMeta]) -> Self {
        let messages = metas
            .iter()
            .map(|meta| (meta.id, MessageDescriptor::new(meta)))
            .collect();
        Self { name, messages }
    }

    /// Dialect name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Look up a descriptor by message id.
    pub fn message(&self, id: u32) -> Option<&MessageDescriptor> {
        self.messages.get(&id)
    }

    /// Look up a descriptor by wire name.
    pub fn message_by_name(&self, name: &str) -> Option<&MessageDescriptor> {
        self.messages.values().find(|d| d.meta.name == name)
    }

    /// Number of messages in the dialect.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the dialect defines no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl fmt::Debug for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dialect")
            .field("name", &self.name)
            .field("messages", &self.messages.len())
            .finish()
    }
}

/// A typed MAVLink message.
///
/// Messages share no common layout, only capabilities: an id and per-field
/// wire access keyed by declared index. The payload codec drives the
/// canonical order, truncation and zero-padding; implementations only move
/// bytes for one field at a time. Implementations are emitted by the dialect
/// generator (see [`minimal`] for the shape).
pub trait Message: Send + Sync + fmt::Debug {
    /// Native message id.
    fn id(&self) -> u32;

    /// Append the little-endian wire bytes of the field at declared `index`.
    fn emit_field(&self, index: usize, buf: &mut Vec<u8>);

    /// Overwrite the field at declared `index` from exact-sized wire bytes.
    fn store_field(&mut self, index: usize, data: &[u8]);

    /// Clone into a boxed trait object.
    fn clone_message(&self) -> Box<dyn Message>;

    /// Downcasting support.
    fn as_any(&self) -> &dyn Any;
}

impl Clone for Box<dyn Message> {
    fn clone(&self) -> Self {
        self.clone_message()
    }
}

/// Payload of a message whose id the loaded dialect does not cover, or any
/// message received while no dialect is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRaw {
    /// Native message id.
    pub id: u32,
    /// Undecoded payload bytes, exactly as received.
    pub payload: Vec<u8>,
}

impl Message for MessageRaw {
    fn id(&self) -> u32 {
        self.id
    }

    // Raw messages carry opaque bytes; the payload codec never walks their
    // fields because no descriptor exists for them.
    fn emit_field(&self, _index: usize, _buf: &mut Vec<u8>) {}

    fn store_field(&mut self, _index: usize, _data: &[u8]) {}

    fn clone_message(&self) -> Box<dyn Message> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
