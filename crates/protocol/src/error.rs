//! Protocol error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid magic bytes")]
    InvalidMagic,

    #[error("Version mismatch: expected {expected}, got {got}")]
    VersionMismatch { expected: u16, got: u16 },

    #[error("Unknown message type: {0}")]
    UnknownMessageType(u16),

    #[error("Frame too short: declared total {total}, header is {header} bytes")]
    FrameTooShort { total: usize, header: usize },

    #[error("Payload length mismatch: header declares {declared}, frame carries {carried}")]
    LengthMismatch { declared: usize, carried: usize },

    #[error("Payload too large: {len} > {max}")]
    PayloadTooLarge { len: u32, max: u32 },

    #[error("Buffer too short: need {need} bytes, have {have}")]
    BufferTooShort { need: usize, have: usize },

    #[error("Invalid payload length for message type")]
    InvalidPayloadLength,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
