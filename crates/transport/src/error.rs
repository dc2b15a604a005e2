//! Transport error types

use thiserror::Error;

use inferlink_protocol::ProtocolError;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("transport not started")]
    NotStarted,

    #[error("transport already started")]
    AlreadyStarted,

    #[error("bad address '{0}', expected HOST:PORT")]
    BadAddress(String),

    #[error("could not resolve address '{0}'")]
    AddressResolution(String),

    #[error("bind {addr} failed: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("connect {addr} failed: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    #[error("messaging bind {endpoint} failed: {source}")]
    MessagingBind {
        endpoint: String,
        source: zmq::Error,
    },

    #[error("messaging connect {endpoint} failed: {source}")]
    MessagingConnect {
        endpoint: String,
        source: zmq::Error,
    },

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("messaging layer error: {0}")]
    Messaging(#[from] zmq::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
