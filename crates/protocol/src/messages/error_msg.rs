//! RESPONSE_ERROR message payload

use crate::constants::MsgType;
use crate::error::Result;
use crate::messages::Payload;

/// RESPONSE_ERROR payload: raw UTF-8 error description, terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPayload {
    pub message: String,
}

impl ErrorPayload {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Payload for ErrorPayload {
    const MSG_TYPE: MsgType = MsgType::ResponseError;

    fn encode(&self) -> Vec<u8> {
        self.message.as_bytes().to_vec()
    }

    fn decode(data: &[u8]) -> Result<Self> {
        Ok(Self {
            message: String::from_utf8_lossy(data).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Frame;

    #[test]
    fn test_error_roundtrip() {
        let payload = ErrorPayload::new("connect failed");
        let decoded = ErrorPayload::decode(&payload.encode()).unwrap();
        assert_eq!(payload, decoded);
    }

    #[test]
    fn test_error_into_frame() {
        let frame = ErrorPayload::new("backend unavailable").into_frame(77);
        assert_eq!(frame.header.msg_type, MsgType::ResponseError);
        assert_eq!(frame.header.req_id, 77);

        let decoded = Frame::decode_datagram(&frame.encode_datagram()).unwrap();
        let err = ErrorPayload::decode(&decoded.payload).unwrap();
        assert_eq!(err.message, "backend unavailable");
    }
}
