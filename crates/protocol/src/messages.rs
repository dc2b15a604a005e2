//! Typed message payloads

mod chunk;
mod done;
mod error_msg;
mod infer_request;

pub use chunk::ChunkPayload;
pub use done::DonePayload;
pub use error_msg::ErrorPayload;
pub use infer_request::InferRequestPayload;

use crate::constants::MsgType;
use crate::error::Result;
use crate::frame::Frame;

/// Trait for message payloads that can be encoded/decoded.
pub trait Payload: Sized {
    /// The message type carried in the header for this payload.
    const MSG_TYPE: MsgType;

    /// Encode the payload to bytes.
    fn encode(&self) -> Vec<u8>;

    /// Decode the payload from bytes.
    fn decode(data: &[u8]) -> Result<Self>;

    /// Build a complete frame from this payload.
    fn into_frame(self, req_id: u64) -> Frame {
        let bytes = self.encode();
        Frame::new(Self::MSG_TYPE, req_id, bytes)
    }
}
