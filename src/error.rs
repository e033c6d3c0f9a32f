//! Error types for Perun.

use std::io;

use thiserror::Error;

/// Result type alias for Perun operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Perun.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors, surfaced synchronously at node construction
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    // Frame-level errors
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("message id {0} is not defined by the loaded dialect")]
    NoDescriptor(u32),

    #[error("message id {0} does not fit in a V1 frame")]
    V1IdOverflow(u32),

    #[error("event stream has already been taken")]
    EventsTaken,

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Node configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one endpoint must be provided")]
    NoEndpoints,

    #[error("system id must be >= 1")]
    InvalidSystemId,

    #[error("an outgoing signature key requires V2 frames")]
    SignatureRequiresV2,

    #[error("heartbeat period must be non-zero")]
    InvalidHeartbeatPeriod,

    #[error("invalid address {addr}: {reason}")]
    InvalidAddress { addr: String, reason: String },
}

/// Frame parsing and validation errors.
///
/// These are never fatal: the channel reports them on the event stream and
/// resumes scanning for the next frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("skipped {0} bytes while seeking a frame magic")]
    MagicLost(usize),

    #[error("payload length {got} exceeds the {max} bytes defined for message {id}")]
    LengthInvalid { id: u32, got: usize, max: usize },

    #[error("checksum mismatch for message {id}: computed {computed:#06x}, received {received:#06x}")]
    ChecksumMismatch {
        id: u32,
        computed: u16,
        received: u16,
    },

    #[error("unknown incompatibility flags {0:#04x}")]
    UnknownIncompatFlag(u8),

    #[error("frame is unsigned but a verification key is configured")]
    SignatureMissing,

    #[error("signature verification failed")]
    SignatureInvalid,

    #[error("signature timestamp {got} is below the high-water mark {watermark}")]
    SignatureReplay { got: u64, watermark: u64 },
}
