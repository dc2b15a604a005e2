//! Inferlink wire protocol.
//!
//! Binary message format shared by every transport: a fixed 24-byte
//! header followed by a type-specific payload. The TCP transport wraps
//! each message in a u32 total-length prefix (stream framing); the
//! tagged-message transport carries one message per delimited send
//! (datagram framing).

mod constants;
mod error;
mod frame;
mod header;
mod messages;

pub use constants::*;
pub use error::{ProtocolError, Result};
pub use frame::Frame;
pub use header::MessageHeader;
pub use messages::*;
