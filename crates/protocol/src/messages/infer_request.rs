//! REQUEST_INFER message payload

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Write};

use crate::constants::MsgType;
use crate::error::{ProtocolError, Result};
use crate::messages::Payload;

/// Fixed part of the request payload: three u32 fields before the prompt.
const FIXED_LEN: usize = 12;

/// REQUEST_INFER payload (Client → Server)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferRequestPayload {
    /// Maximum tokens to generate (0 = server default)
    pub max_tokens: u32,
    /// Credit budget in bytes capping streamed response traffic
    /// (0 = server default)
    pub credit_bytes: u32,
    /// Prompt text
    pub prompt: String,
}

impl InferRequestPayload {
    pub fn new(max_tokens: u32, credit_bytes: u32, prompt: impl Into<String>) -> Self {
        Self {
            max_tokens,
            credit_bytes,
            prompt: prompt.into(),
        }
    }
}

impl Payload for InferRequestPayload {
    const MSG_TYPE: MsgType = MsgType::RequestInfer;

    fn encode(&self) -> Vec<u8> {
        let prompt_bytes = self.prompt.as_bytes();
        let mut buf = Vec::with_capacity(FIXED_LEN + prompt_bytes.len());

        buf.write_u32::<LittleEndian>(self.max_tokens).unwrap();
        buf.write_u32::<LittleEndian>(self.credit_bytes).unwrap();
        buf.write_u32::<LittleEndian>(prompt_bytes.len() as u32)
            .unwrap();
        buf.write_all(prompt_bytes).unwrap();

        buf
    }

    fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < FIXED_LEN {
            return Err(ProtocolError::InvalidPayloadLength);
        }

        let mut cursor = Cursor::new(data);

        let max_tokens = cursor.read_u32::<LittleEndian>()?;
        let credit_bytes = cursor.read_u32::<LittleEndian>()?;
        let prompt_len = cursor.read_u32::<LittleEndian>()? as usize;

        if data.len() < FIXED_LEN + prompt_len {
            return Err(ProtocolError::BufferTooShort {
                need: FIXED_LEN + prompt_len,
                have: data.len(),
            });
        }

        let prompt = String::from_utf8_lossy(&data[FIXED_LEN..FIXED_LEN + prompt_len]).into_owned();

        Ok(Self {
            max_tokens,
            credit_bytes,
            prompt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_request_roundtrip() {
        let payload = InferRequestPayload::new(64, 256 * 1024, "Explain tagged messaging.");
        let encoded = payload.encode();
        let decoded = InferRequestPayload::decode(&encoded).unwrap();
        assert_eq!(payload, decoded);
    }

    #[test]
    fn test_infer_request_empty_prompt() {
        let payload = InferRequestPayload::new(1, 0, "");
        let decoded = InferRequestPayload::decode(&payload.encode()).unwrap();
        assert_eq!(decoded.prompt, "");
    }

    #[test]
    fn test_prompt_length_preserved_exactly() {
        let prompt = "héllo wörld".repeat(37);
        let payload = InferRequestPayload::new(8, 1024, prompt.clone());
        let decoded = InferRequestPayload::decode(&payload.encode()).unwrap();
        assert_eq!(decoded.prompt.len(), prompt.len());
        assert_eq!(decoded.prompt, prompt);
    }

    #[test]
    fn test_truncated_prompt_rejected() {
        let payload = InferRequestPayload::new(8, 0, "some prompt");
        let encoded = payload.encode();
        assert!(matches!(
            InferRequestPayload::decode(&encoded[..encoded.len() - 1]),
            Err(ProtocolError::BufferTooShort { .. })
        ));
    }

    #[test]
    fn test_short_fixed_part_rejected() {
        assert!(matches!(
            InferRequestPayload::decode(&[0u8; 11]),
            Err(ProtocolError::InvalidPayloadLength)
        ));
    }
}
