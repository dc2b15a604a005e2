//! RESPONSE_DONE message payload

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::constants::MsgType;
use crate::error::{ProtocolError, Result};
use crate::messages::Payload;

/// RESPONSE_DONE payload (Server → Client, terminal success)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DonePayload {
    /// Tokens produced
    pub tokens: u32,
    /// Reserved (always 0)
    pub reserved: u32,
    /// Elapsed wall time of the inference in microseconds
    pub elapsed_us: u64,
}

impl DonePayload {
    pub fn new(tokens: u32, elapsed_us: u64) -> Self {
        Self {
            tokens,
            reserved: 0,
            elapsed_us,
        }
    }
}

impl Payload for DonePayload {
    const MSG_TYPE: MsgType = MsgType::ResponseDone;

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16);
        buf.write_u32::<LittleEndian>(self.tokens).unwrap();
        buf.write_u32::<LittleEndian>(self.reserved).unwrap();
        buf.write_u64::<LittleEndian>(self.elapsed_us).unwrap();
        buf
    }

    fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 16 {
            return Err(ProtocolError::InvalidPayloadLength);
        }

        let mut cursor = Cursor::new(data);
        let tokens = cursor.read_u32::<LittleEndian>()?;
        let reserved = cursor.read_u32::<LittleEndian>()?;
        let elapsed_us = cursor.read_u64::<LittleEndian>()?;

        Ok(Self {
            tokens,
            reserved,
            elapsed_us,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_done_roundtrip() {
        let payload = DonePayload::new(128, 1_234_567);
        let decoded = DonePayload::decode(&payload.encode()).unwrap();
        assert_eq!(payload, decoded);
    }

    #[test]
    fn test_done_short_rejected() {
        assert!(matches!(
            DonePayload::decode(&[0u8; 15]),
            Err(ProtocolError::InvalidPayloadLength)
        ));
    }
}
