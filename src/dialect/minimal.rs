//! A hand-maintained subset of the `common` message set.
//!
//! Module layout mirrors what the dialect generator emits: one plain struct
//! per message, a [`Message`] impl moving bytes per declared field index, and
//! a metadata table the [`Dialect`](super::Dialect) is built from. The subset
//! covers the messages a ground-station node needs day to day while spanning
//! every primitive size, char arrays and extension fields.

use std::any::Any;

use byteorder::{ByteOrder, LittleEndian};

use super::{Dialect, FieldDef, FieldType, Message, MessageMeta};

/// Build the dialect. Share the result as `Arc<Dialect>`.
pub fn dialect() -> Dialect {
    Dialect::new("minimal", MESSAGES)
}

/// The heartbeat message shows that a system or component is present and
/// responding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Heartbeat {
    /// Vehicle or component type (MAV_TYPE).
    pub r#type: u8,
    /// Autopilot type (MAV_AUTOPILOT).
    pub autopilot: u8,
    /// System mode bitmap.
    pub base_mode: u8,
    /// Autopilot-specific flags.
    pub custom_mode: u32,
    /// System status flag (MAV_STATE).
    pub system_status: u8,
    /// MAVLink version, set automatically by the protocol.
    pub mavlink_version: u8,
}

impl Message for Heartbeat {
    fn id(&self) -> u32 {
        0
    }

    fn emit_field(&self, index: usize, buf: &mut Vec<u8>) {
        match index {
            0 => buf.push(self.r#type),
            1 => buf.push(self.autopilot),
            2 => buf.push(self.base_mode),
            3 => buf.extend_from_slice(&self.custom_mode.to_le_bytes()),
            4 => buf.push(self.system_status),
            5 => buf.push(self.mavlink_version),
            _ => {}
        }
    }

    fn store_field(&mut self, index: usize, data: &[u8]) {
        match index {
            0 => self.r#type = data[0],
            1 => self.autopilot = data[0],
            2 => self.base_mode = data[0],
            3 => self.custom_mode = LittleEndian::read_u32(data),
            4 => self.system_status = data[0],
            5 => self.mavlink_version = data[0],
            _ => {}
        }
    }

    fn clone_message(&self) -> Box<dyn Message> {
        Box::new(*self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The system time is the time of the master clock, typically the computer
/// clock of the main onboard computer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemTime {
    /// Timestamp (UNIX epoch time), microseconds.
    pub time_unix_usec: u64,
    /// Timestamp since system boot, milliseconds.
    pub time_boot_ms: u32,
}

impl Message for SystemTime {
    fn id(&self) -> u32 {
        2
    }

    fn emit_field(&self, index: usize, buf: &mut Vec<u8>) {
        match index {
            0 => buf.extend_from_slice(&self.time_unix_usec.to_le_bytes()),
            1 => buf.extend_from_slice(&self.time_boot_ms.to_le_bytes()),
            _ => {}
        }
    }

    fn store_field(&mut self, index: usize, data: &[u8]) {
        match index {
            0 => self.time_unix_usec = LittleEndian::read_u64(data),
            1 => self.time_boot_ms = LittleEndian::read_u32(data),
            _ => {}
        }
    }

    fn clone_message(&self) -> Box<dyn Message> {
        Box::new(*self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Emitted in response to PARAM_REQUEST_READ/LIST, announcing one onboard
/// parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ParamValue {
    /// Parameter id, null-terminated if shorter than 16 chars.
    pub param_id: [u8; 16],
    /// Parameter value.
    pub param_value: f32,
    /// Parameter type (MAV_PARAM_TYPE).
    pub param_type: u8,
    /// Total number of parameters.
    pub param_count: u16,
    /// Index of this parameter.
    pub param_index: u16,
}

impl Message for ParamValue {
    fn id(&self) -> u32 {
        22
    }

    fn emit_field(&self, index: usize, buf: &mut Vec<u8>) {
        match index {
            0 => buf.extend_from_slice(&self.param_id),
            1 => buf.extend_from_slice(&self.param_value.to_le_bytes()),
            2 => buf.push(self.param_type),
            3 => buf.extend_from_slice(&self.param_count.to_le_bytes()),
            4 => buf.extend_from_slice(&self.param_index.to_le_bytes()),
            _ => {}
        }
    }

    fn store_field(&mut self, index: usize, data: &[u8]) {
        match index {
            0 => self.param_id.copy_from_slice(data),
            1 => self.param_value = LittleEndian::read_f32(data),
            2 => self.param_type = data[0],
            3 => self.param_count = LittleEndian::read_u16(data),
            4 => self.param_index = LittleEndian::read_u16(data),
            _ => {}
        }
    }

    fn clone_message(&self) -> Box<dyn Message> {
        Box::new(*self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The attitude in the aeronautical frame (right-handed, Z-down, X-front,
/// Y-right).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Attitude {
    /// Timestamp since system boot, milliseconds.
    pub time_boot_ms: u32,
    /// Roll angle, rad.
    pub roll: f32,
    /// Pitch angle, rad.
    pub pitch: f32,
    /// Yaw angle, rad.
    pub yaw: f32,
    /// Roll angular speed, rad/s.
    pub rollspeed: f32,
    /// Pitch angular speed, rad/s.
    pub pitchspeed: f32,
    /// Yaw angular speed, rad/s.
    pub yawspeed: f32,
}

impl Message for Attitude {
    fn id(&self) -> u32 {
        30
    }

    fn emit_field(&self, index: usize, buf: &mut Vec<u8>) {
        match index {
            0 => buf.extend_from_slice(&self.time_boot_ms.to_le_bytes()),
            1 => buf.extend_from_slice(&self.roll.to_le_bytes()),
            2 => buf.extend_from_slice(&self.pitch.to_le_bytes()),
            3 => buf.extend_from_slice(&self.yaw.to_le_bytes()),
            4 => buf.extend_from_slice(&self.rollspeed.to_le_bytes()),
            5 => buf.extend_from_slice(&self.pitchspeed.to_le_bytes()),
            6 => buf.extend_from_slice(&self.yawspeed.to_le_bytes()),
            _ => {}
        }
    }

    fn store_field(&mut self, index: usize, data: &[u8]) {
        match index {
            0 => self.time_boot_ms = LittleEndian::read_u32(data),
            1 => self.roll = LittleEndian::read_f32(data),
            2 => self.pitch = LittleEndian::read_f32(data),
            3 => self.yaw = LittleEndian::read_f32(data),
            4 => self.rollspeed = LittleEndian::read_f32(data),
            5 => self.pitchspeed = LittleEndian::read_f32(data),
            6 => self.yawspeed = LittleEndian::read_f32(data),
            _ => {}
        }
    }

    fn clone_message(&self) -> Box<dyn Message> {
        Box::new(*self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Send a command with up to seven parameters to the MAV.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CommandLong {
    /// System which should execute the command.
    pub target_system: u8,
    /// Component which should execute the command.
    pub target_component: u8,
    /// Command id (MAV_CMD).
    pub command: u16,
    /// 0: first transmission. 1-255: confirmation transmissions.
    pub confirmation: u8,
    pub param1: f32,
    pub param2: f32,
    pub param3: f32,
    pub param4: f32,
    pub param5: f32,
    pub param6: f32,
    pub param7: f32,
}

impl Message for CommandLong {
    fn id(&self) -> u32 {
        76
    }

    fn emit_field(&self, index: usize, buf: &mut Vec<u8>) {
        match index {
            0 => buf.push(self.target_system),
            1 => buf.push(self.target_component),
            2 => buf.extend_from_slice(&self.command.to_le_bytes()),
            3 => buf.push(self.confirmation),
            4 => buf.extend_from_slice(&self.param1.to_le_bytes()),
            5 => buf.extend_from_slice(&self.param2.to_le_bytes()),
            6 => buf.extend_from_slice(&self.param3.to_le_bytes()),
            7 => buf.extend_from_slice(&self.param4.to_le_bytes()),
            8 => buf.extend_from_slice(&self.param5.to_le_bytes()),
            9 => buf.extend_from_slice(&self.param6.to_le_bytes()),
            10 => buf.extend_from_slice(&self.param7.to_le_bytes()),
            _ => {}
        }
    }

    fn store_field(&mut self, index: usize, data: &[u8]) {
        match index {
            0 => self.target_system = data[0],
            1 => self.target_component = data[0],
            2 => self.command = LittleEndian::read_u16(data),
            3 => self.confirmation = data[0],
            4 => self.param1 = LittleEndian::read_f32(data),
            5 => self.param2 = LittleEndian::read_f32(data),
            6 => self.param3 = LittleEndian::read_f32(data),
            7 => self.param4 = LittleEndian::read_f32(data),
            8 => self.param5 = LittleEndian::read_f32(data),
            9 => self.param6 = LittleEndian::read_f32(data),
            10 => self.param7 = LittleEndian::read_f32(data),
            _ => {}
        }
    }

    fn clone_message(&self) -> Box<dyn Message> {
        Box::new(*self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Control vehicle tone generation (buzzer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayTune {
    /// System to play the tune.
    pub target_system: u8,
    /// Component to play the tune.
    pub target_component: u8,
    /// Tune in board-specific format.
    pub tune: [u8; 30],
    /// Tune extension, appended to `tune`.
    pub tune2: [u8; 200],
}

impl Default for PlayTune {
    fn default() -> Self {
        Self {
            target_system: 0,
            target_component: 0,
            tune: [0; 30],
            tune2: [0; 200],
        }
    }
}

impl Message for PlayTune {
    fn id(&self) -> u32 {
        258
    }

    fn emit_field(&self, index: usize, buf: &mut Vec<u8>) {
        match index {
            0 => buf.push(self.target_system),
            1 => buf.push(self.target_component),
            2 => buf.extend_from_slice(&self.tune),
            3 => buf.extend_from_slice(&self.tune2),
            _ => {}
        }
    }

    fn store_field(&mut self, index: usize, data: &[u8]) {
        match index {
            0 => self.target_system = data[0],
            1 => self.target_component = data[0],
            2 => self.tune.copy_from_slice(data),
            3 => self.tune2.copy_from_slice(data),
            _ => {}
        }
    }

    fn clone_message(&self) -> Box<dyn Message> {
        Box::new(*self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn new_heartbeat() -> Box<dyn Message> {
    Box::new(Heartbeat::default())
}

fn new_system_time() -> Box<dyn Message> {
    Box::new(SystemTime::default())
}

fn new_param_value() -> Box<dyn Message> {
    Box::new(ParamValue::default())
}

fn new_attitude() -> Box<dyn Message> {
    Box::new(Attitude::default())
}

fn new_command_long() -> Box<dyn Message> {
    Box::new(CommandLong::default())
}

fn new_play_tune() -> Box<dyn Message> {
    Box::new(PlayTune::default())
}

const MESSAGES: &[MessageMeta] = &[
    MessageMeta {
        id: 0,
        name: "HEARTBEAT",
        fields: &[
            FieldDef::scalar("type", FieldType::UInt8),
            FieldDef::scalar("autopilot", FieldType::UInt8),
            FieldDef::scalar("base_mode", FieldType::UInt8),
            FieldDef::scalar("custom_mode", FieldType::UInt32),
            FieldDef::scalar("system_status", FieldType::UInt8),
            FieldDef::scalar("mavlink_version", FieldType::UInt8),
        ],
        ctor: new_heartbeat,
    },
    MessageMeta {
        id: 2,
        name: "SYSTEM_TIME",
        fields: &[
            FieldDef::scalar("time_unix_usec", FieldType::UInt64),
            FieldDef::scalar("time_boot_ms", FieldType::UInt32),
        ],
        ctor: new_system_time,
    },
    MessageMeta {
        id: 22,
        name: "PARAM_VALUE",
        fields: &[
            FieldDef::array("param_id", FieldType::Char, 16),
            FieldDef::scalar("param_value", FieldType::Float),
            FieldDef::scalar("param_type", FieldType::UInt8),
            FieldDef::scalar("param_count", FieldType::UInt16),
            FieldDef::scalar("param_index", FieldType::UInt16),
        ],
        ctor: new_param_value,
    },
    MessageMeta {
        id: 30,
        name: "ATTITUDE",
        fields: &[
            FieldDef::scalar("time_boot_ms", FieldType::UInt32),
            FieldDef::scalar("roll", FieldType::Float),
            FieldDef::scalar("pitch", FieldType::Float),
            FieldDef::scalar("yaw", FieldType::Float),
            FieldDef::scalar("rollspeed", FieldType::Float),
            FieldDef::scalar("pitchspeed", FieldType::Float),
            FieldDef::scalar("yawspeed", FieldType::Float),
        ],
        ctor: new_attitude,
    },
    MessageMeta {
        id: 76,
        name: "COMMAND_LONG",
        fields: &[
            FieldDef::scalar("target_system", FieldType::UInt8),
            FieldDef::scalar("target_component", FieldType::UInt8),
            FieldDef::scalar("command", FieldType::UInt16),
            FieldDef::scalar("confirmation", FieldType::UInt8),
            FieldDef::scalar("param1", FieldType::Float),
            FieldDef::scalar("param2", FieldType::Float),
            FieldDef::scalar("param3", FieldType::Float),
            FieldDef::scalar("param4", FieldType::Float),
            FieldDef::scalar("param5", FieldType::Float),
            FieldDef::scalar("param6", FieldType::Float),
            FieldDef::scalar("param7", FieldType::Float),
        ],
        ctor: new_command_long,
    },
    MessageMeta {
        id: 258,
        name: "PLAY_TUNE",
        fields: &[
            FieldDef::scalar("target_system", FieldType::UInt8),
            FieldDef::scalar("target_component", FieldType::UInt8),
            FieldDef::array("tune", FieldType::Char, 30),
            FieldDef::array("tune2", FieldType::Char, 200).ext(),
        ],
        ctor: new_play_tune,
    },
];
