//! RESPONSE_CHUNK message payload

use crate::constants::MsgType;
use crate::error::Result;
use crate::messages::Payload;

/// RESPONSE_CHUNK payload: one raw UTF-8 fragment of generated text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPayload {
    pub text: String,
}

impl ChunkPayload {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Payload for ChunkPayload {
    const MSG_TYPE: MsgType = MsgType::ResponseChunk;

    fn encode(&self) -> Vec<u8> {
        self.text.as_bytes().to_vec()
    }

    fn decode(data: &[u8]) -> Result<Self> {
        Ok(Self {
            text: String::from_utf8_lossy(data).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_roundtrip() {
        let payload = ChunkPayload::new("tok ");
        let decoded = ChunkPayload::decode(&payload.encode()).unwrap();
        assert_eq!(payload, decoded);
    }

    #[test]
    fn test_chunk_empty() {
        let decoded = ChunkPayload::decode(&[]).unwrap();
        assert_eq!(decoded.text, "");
    }
}
