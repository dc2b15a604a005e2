//! Inferlink transport layer.
//!
//! A transport moves whole protocol messages between exactly one
//! client endpoint and one server endpoint. Two implementations share
//! the [`Transport`] contract:
//!
//! - [`TcpTransport`] — non-blocking reliable TCP driven by a
//!   readiness multiplexer, with explicit length-prefixed framing and
//!   per-connection buffering.
//! - [`TaggedTransport`] — delimited tagged messaging where each send
//!   transfers one complete protocol message, matched by a numeric tag
//!   class per direction.
//!
//! Both are driven by repeatedly calling [`Transport::progress`] from
//! a single thread; `send` may be called from any thread.

mod error;
mod tagged;
mod tcp;

pub use error::{Result, TransportError};
pub use tagged::TaggedTransport;
pub use tcp::TcpTransport;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use inferlink_protocol::MsgType;

/// A fully-reassembled message handed to the registered handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub req_id: u64,
    pub msg_type: MsgType,
    pub payload: Vec<u8>,
}

/// Message-arrival callback. Invoked inline on the progress thread;
/// it may call [`Transport::send`] but must not call
/// [`Transport::progress`].
pub type MessageHandler = Arc<dyn Fn(IncomingMessage) + Send + Sync>;

/// Endpoint configuration shared by both transports.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Server bind host
    pub listen_host: String,
    /// Server bind port (0 = ephemeral)
    pub listen_port: u16,
    /// Server host a client connects to
    pub server_host: String,
    /// Server port a client connects to
    pub server_port: u16,
    /// Readiness event capacity per progress tick
    pub max_events: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            listen_host: "0.0.0.0".to_string(),
            listen_port: 9199,
            server_host: "127.0.0.1".to_string(),
            server_port: 9199,
            max_events: 256,
        }
    }
}

/// Split a `HOST:PORT` string on the last colon.
pub fn parse_host_port(s: &str) -> Result<(String, u16)> {
    let pos = s
        .rfind(':')
        .ok_or_else(|| TransportError::BadAddress(s.to_string()))?;
    let host = &s[..pos];
    let port: u16 = s[pos + 1..]
        .parse()
        .map_err(|_| TransportError::BadAddress(s.to_string()))?;
    if host.is_empty() {
        return Err(TransportError::BadAddress(s.to_string()));
    }
    Ok((host.to_string(), port))
}

/// Abstract transport contract implemented by both concrete transports.
///
/// `start_server`/`start_client` may each be called at most once per
/// instance. `progress` must only ever be called from one thread at a
/// time; `send` is safe from any thread and never blocks indefinitely.
pub trait Transport: Send + Sync {
    /// Bind/listen and register the message handler.
    fn start_server(&self, opt: &TransportOptions, on_msg: MessageHandler) -> Result<()>;

    /// Connect to the configured server and register the handler.
    fn start_client(&self, opt: &TransportOptions, on_msg: MessageHandler) -> Result<()>;

    /// Frame and transmit one message to the single active peer.
    fn send(&self, req_id: u64, msg_type: MsgType, payload: &[u8]) -> Result<()>;

    /// Drive one readiness tick: perform any ready I/O and dispatch
    /// every fully-reassembled message to the handler. Blocks for at
    /// most roughly `timeout` when no readiness event occurs.
    fn progress(&self, timeout: Duration) -> Result<()>;
}

/// Transport selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Tcp,
    Tagged,
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(TransportKind::Tcp),
            "tagged" => Ok(TransportKind::Tagged),
            other => Err(format!(
                "unknown transport '{other}' (expected 'tcp' or 'tagged')"
            )),
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Tcp => write!(f, "tcp"),
            TransportKind::Tagged => write!(f, "tagged"),
        }
    }
}

/// Instantiate the transport for `kind`.
pub fn create_transport(kind: TransportKind) -> Arc<dyn Transport> {
    match kind {
        TransportKind::Tcp => Arc::new(TcpTransport::new()),
        TransportKind::Tagged => Arc::new(TaggedTransport::new()),
    }
}
