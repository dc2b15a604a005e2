//! Tagged-message transport.
//!
//! Messages travel over a PAIR socket pair as delimited two-part
//! sends: `[tag:u64 LE][header + payload]`. No length prefix is
//! needed — each receive yields exactly one whole protocol message.
//! Requests and responses use distinct tag classes, and a side only
//! ever consumes the tag class for its role, so no rendezvous
//! handshake is required to identify messages.
//!
//! `progress` drains every immediately-available message under the
//! internal lock, releases the lock, dispatches to the handler (which
//! may itself call `send`), and only then waits on the engine's event
//! descriptor for the remaining timeout. All socket access is
//! serialized by that one lock, which also guards the worker thread's
//! `send` against the progress thread's drain.

use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use byteorder::{ByteOrder, LittleEndian};
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use tracing::{debug, info, warn};

use inferlink_protocol::{Frame, MsgType};

use crate::error::{Result, TransportError};
use crate::{IncomingMessage, MessageHandler, Transport, TransportOptions};

/// Tag class for client → server traffic.
const TAG_REQUEST: u64 = 0x494C_0001;
/// Tag class for server → client traffic.
const TAG_RESPONSE: u64 = 0x494C_0002;

const TAG_LEN: usize = 8;

/// Bound on a blocking send; the peer link is expected to be up.
const SEND_TIMEOUT_MS: i32 = 5_000;
/// How long teardown may spend flushing unsent messages.
const LINGER_MS: i32 = 1_000;

const EVENT: Token = Token(0);

/// Endpoint resources. Field order encodes teardown order: the
/// endpoint socket closes before the owning context is terminated.
struct Endpoint {
    socket: zmq::Socket,
    _context: zmq::Context,
    server: bool,
}

/// Readiness wait on the engine's event descriptor, kept outside the
/// endpoint lock so an idle wait never blocks a concurrent `send`.
struct WaitSet {
    poll: Poll,
    events: Events,
}

/// RDMA-style tagged-messaging transport over delimited PAIR sockets.
pub struct TaggedTransport {
    state: Mutex<Option<Endpoint>>,
    wait: Mutex<Option<WaitSet>>,
    handler: OnceLock<MessageHandler>,
}

impl TaggedTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
            wait: Mutex::new(None),
            handler: OnceLock::new(),
        }
    }

    /// The endpoint the server socket actually bound to. Useful when
    /// binding to port 0.
    pub fn local_endpoint(&self) -> Option<String> {
        let guard = self.state.lock().unwrap();
        guard
            .as_ref()
            .and_then(|ep| ep.socket.get_last_endpoint().ok())
            .and_then(|e| e.ok())
    }

    fn make_socket(context: &zmq::Context) -> Result<zmq::Socket> {
        let socket = context.socket(zmq::PAIR)?;
        socket.set_sndtimeo(SEND_TIMEOUT_MS)?;
        socket.set_linger(LINGER_MS)?;
        Ok(socket)
    }

    /// Register the socket's event descriptor with a readiness poll.
    /// Optional: some engine configurations expose no descriptor, in
    /// which case idle progress ticks fall back to sleeping.
    fn make_wait_set(socket: &zmq::Socket) -> Option<WaitSet> {
        let fd = match socket.get_fd() {
            Ok(fd) => fd,
            Err(e) => {
                debug!(error = %e, "no event descriptor available");
                return None;
            }
        };
        let poll = match Poll::new() {
            Ok(p) => p,
            Err(e) => {
                debug!(error = %e, "readiness poll unavailable");
                return None;
            }
        };
        if let Err(e) = poll
            .registry()
            .register(&mut SourceFd(&fd), EVENT, Interest::READABLE)
        {
            debug!(error = %e, "could not register event descriptor");
            return None;
        }
        Some(WaitSet {
            poll,
            events: Events::with_capacity(4),
        })
    }

    /// Collect every immediately-available message for our tag class.
    /// Malformed or foreign-tagged messages are consumed and skipped;
    /// message boundaries are reliable at this layer, so one bad
    /// message never poisons the stream.
    fn drain(ep: &Endpoint) -> Result<Vec<IncomingMessage>> {
        let expect_tag = if ep.server { TAG_REQUEST } else { TAG_RESPONSE };
        let mut out = Vec::new();

        loop {
            let first = match ep.socket.recv_bytes(zmq::DONTWAIT) {
                Ok(bytes) => bytes,
                Err(zmq::Error::EAGAIN) => break,
                Err(e) => return Err(TransportError::Messaging(e)),
            };

            // Remaining parts of a started message arrive atomically.
            let mut body: Option<Vec<u8>> = None;
            while ep.socket.get_rcvmore()? {
                let part = ep.socket.recv_bytes(0)?;
                if body.is_none() {
                    body = Some(part);
                }
            }

            if first.len() != TAG_LEN {
                debug!(len = first.len(), "skipping message with malformed tag");
                continue;
            }
            let tag = LittleEndian::read_u64(&first);
            if tag != expect_tag {
                debug!(tag, "skipping message with foreign tag");
                continue;
            }
            let Some(body) = body else {
                debug!("skipping tagged message without body");
                continue;
            };

            match Frame::decode_datagram(&body) {
                Ok(frame) => out.push(IncomingMessage {
                    req_id: frame.header.req_id,
                    msg_type: frame.header.msg_type,
                    payload: frame.payload,
                }),
                Err(e) => {
                    debug!(error = %e, "skipping malformed tagged message");
                }
            }
        }
        Ok(out)
    }
}

impl Default for TaggedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for TaggedTransport {
    fn start_server(&self, opt: &TransportOptions, on_msg: MessageHandler) -> Result<()> {
        let mut guard = self.state.lock().unwrap();
        if guard.is_some() {
            return Err(TransportError::AlreadyStarted);
        }

        let context = zmq::Context::new();
        let socket = Self::make_socket(&context)?;
        // Port 0 means "pick an ephemeral port"; the messaging layer
        // spells that with a wildcard.
        let endpoint = if opt.listen_port == 0 {
            format!("tcp://{}:*", opt.listen_host)
        } else {
            format!("tcp://{}:{}", opt.listen_host, opt.listen_port)
        };
        socket
            .bind(&endpoint)
            .map_err(|e| TransportError::MessagingBind {
                endpoint: endpoint.clone(),
                source: e,
            })?;

        *self.wait.lock().unwrap() = Self::make_wait_set(&socket);
        let _ = self.handler.set(on_msg);

        info!(%endpoint, "tagged transport listening");
        *guard = Some(Endpoint {
            socket,
            _context: context,
            server: true,
        });
        Ok(())
    }

    fn start_client(&self, opt: &TransportOptions, on_msg: MessageHandler) -> Result<()> {
        let mut guard = self.state.lock().unwrap();
        if guard.is_some() {
            return Err(TransportError::AlreadyStarted);
        }

        let context = zmq::Context::new();
        let socket = Self::make_socket(&context)?;
        // The endpoint is created eagerly; the link handshake is
        // deferred until the first send/recv actually needs it.
        let endpoint = format!("tcp://{}:{}", opt.server_host, opt.server_port);
        socket
            .connect(&endpoint)
            .map_err(|e| TransportError::MessagingConnect {
                endpoint: endpoint.clone(),
                source: e,
            })?;

        *self.wait.lock().unwrap() = Self::make_wait_set(&socket);
        let _ = self.handler.set(on_msg);

        debug!(%endpoint, "tagged transport connected");
        *guard = Some(Endpoint {
            socket,
            _context: context,
            server: false,
        });
        Ok(())
    }

    fn send(&self, req_id: u64, msg_type: MsgType, payload: &[u8]) -> Result<()> {
        let frame = Frame::new(msg_type, req_id, payload.to_vec());
        let bytes = frame.encode_datagram();
        let tag = if msg_type == MsgType::RequestInfer {
            TAG_REQUEST
        } else {
            TAG_RESPONSE
        };

        let guard = self.state.lock().unwrap();
        let ep = guard.as_ref().ok_or(TransportError::NotStarted)?;
        ep.socket.send(&tag.to_le_bytes()[..], zmq::SNDMORE)?;
        if let Err(e) = ep.socket.send(bytes, 0) {
            warn!(req_id, error = %e, "tagged send failed");
            return Err(TransportError::Messaging(e));
        }
        Ok(())
    }

    fn progress(&self, timeout: Duration) -> Result<()> {
        let msgs = {
            let guard = self.state.lock().unwrap();
            let ep = guard.as_ref().ok_or(TransportError::NotStarted)?;
            Self::drain(ep)?
        };

        // Handler runs with no transport lock held: it may call send().
        if !msgs.is_empty() {
            if let Some(handler) = self.handler.get() {
                for msg in msgs {
                    handler(msg);
                }
            }
            return Ok(());
        }

        if timeout.is_zero() {
            return Ok(());
        }
        let mut wait = self.wait.lock().unwrap();
        match wait.as_mut() {
            Some(ws) => match ws.poll.poll(&mut ws.events, Some(timeout)) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(()),
                Err(e) => Err(TransportError::Io(e)),
            },
            None => {
                std::thread::sleep(timeout);
                Ok(())
            }
        }
    }
}
