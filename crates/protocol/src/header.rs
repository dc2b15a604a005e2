//! Fixed message header (24 bytes)

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::constants::{MsgType, HEADER_LEN, MAGIC, MAX_PAYLOAD_LEN, PROTOCOL_VERSION};
use crate::error::{ProtocolError, Result};

/// Message header transmitted first in every frame.
///
/// The magic and version are written on encode and validated on decode
/// but not stored; a header in memory is always a valid v1 header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Message type
    pub msg_type: MsgType,
    /// Request id correlating request/response pairs (client-generated,
    /// opaque to the server)
    pub req_id: u64,
    /// Reserved flags (always 0 in v1)
    pub flags: u32,
    /// Payload length in bytes
    pub payload_len: u32,
}

impl MessageHeader {
    /// Create a new header with zero flags.
    pub fn new(msg_type: MsgType, req_id: u64, payload_len: u32) -> Self {
        Self {
            msg_type,
            req_id,
            flags: 0,
            payload_len,
        }
    }

    /// Encode the header to its 24-byte wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN);
        buf.extend_from_slice(&MAGIC);
        buf.write_u16::<LittleEndian>(PROTOCOL_VERSION).unwrap();
        buf.write_u16::<LittleEndian>(self.msg_type.to_u16()).unwrap();
        buf.write_u64::<LittleEndian>(self.req_id).unwrap();
        buf.write_u32::<LittleEndian>(self.flags).unwrap();
        buf.write_u32::<LittleEndian>(self.payload_len).unwrap();
        buf
    }

    /// Decode a header from bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(ProtocolError::BufferTooShort {
                need: HEADER_LEN,
                have: data.len(),
            });
        }

        if data[0..4] != MAGIC {
            return Err(ProtocolError::InvalidMagic);
        }

        let mut cursor = Cursor::new(&data[4..]);

        let version = cursor.read_u16::<LittleEndian>()?;
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                got: version,
            });
        }

        let msg_type_raw = cursor.read_u16::<LittleEndian>()?;
        let msg_type = MsgType::from_u16(msg_type_raw)
            .ok_or(ProtocolError::UnknownMessageType(msg_type_raw))?;

        let req_id = cursor.read_u64::<LittleEndian>()?;
        let flags = cursor.read_u32::<LittleEndian>()?;
        let payload_len = cursor.read_u32::<LittleEndian>()?;

        if payload_len > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLarge {
                len: payload_len,
                max: MAX_PAYLOAD_LEN,
            });
        }

        Ok(Self {
            msg_type,
            req_id,
            flags,
            payload_len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = MessageHeader::new(MsgType::RequestInfer, 0xDEAD_BEEF_1234_5678, 42);
        let encoded = header.encode();
        assert_eq!(encoded.len(), HEADER_LEN);

        let decoded = MessageHeader::decode(&encoded).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut encoded = MessageHeader::new(MsgType::ResponseChunk, 1, 0).encode();
        encoded[0] ^= 0xFF;
        assert!(matches!(
            MessageHeader::decode(&encoded),
            Err(ProtocolError::InvalidMagic)
        ));
    }

    #[test]
    fn test_bad_version_rejected() {
        let mut encoded = MessageHeader::new(MsgType::ResponseChunk, 1, 0).encode();
        encoded[4] = 0x09;
        assert!(matches!(
            MessageHeader::decode(&encoded),
            Err(ProtocolError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let mut encoded = MessageHeader::new(MsgType::ResponseDone, 1, 0).encode();
        encoded[6] = 0x7F;
        assert!(matches!(
            MessageHeader::decode(&encoded),
            Err(ProtocolError::UnknownMessageType(0x7F))
        ));
    }

    #[test]
    fn test_short_buffer_rejected() {
        let encoded = MessageHeader::new(MsgType::ResponseDone, 1, 0).encode();
        assert!(matches!(
            MessageHeader::decode(&encoded[..HEADER_LEN - 1]),
            Err(ProtocolError::BufferTooShort { .. })
        ));
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let mut header = MessageHeader::new(MsgType::ResponseChunk, 1, 0);
        header.payload_len = MAX_PAYLOAD_LEN + 1;
        let encoded = header.encode();
        assert!(matches!(
            MessageHeader::decode(&encoded),
            Err(ProtocolError::PayloadTooLarge { .. })
        ));
    }
}
