//! Protocol constants.

/// Protocol magic bytes: "ILNK"
pub const MAGIC: [u8; 4] = [0x49, 0x4C, 0x4E, 0x4B];

/// Protocol version (v1)
pub const PROTOCOL_VERSION: u16 = 0x0001;

/// Fixed header length in bytes:
/// magic(4) + version(2) + type(2) + req_id(8) + flags(4) + length(4)
pub const HEADER_LEN: usize = 24;

/// Stream framing prefix length (u32 total covering header + payload)
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Sanity cap on a single payload (64 MiB)
pub const MAX_PAYLOAD_LEN: u32 = 64 * 1024 * 1024;

/// Message type identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MsgType {
    /// Inference request (Client → Server)
    RequestInfer = 1,
    /// One fragment of generated text (Server → Client, zero or more)
    ResponseChunk = 2,
    /// Terminal success message (Server → Client, exactly one)
    ResponseDone = 3,
    /// Terminal failure message (Server → Client)
    ResponseError = 4,
}

impl MsgType {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(MsgType::RequestInfer),
            2 => Some(MsgType::ResponseChunk),
            3 => Some(MsgType::ResponseDone),
            4 => Some(MsgType::ResponseError),
            _ => None,
        }
    }

    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// True for the messages that end a request's response sequence.
    pub fn is_terminal(self) -> bool {
        matches!(self, MsgType::ResponseDone | MsgType::ResponseError)
    }
}
