//! Readiness-multiplexed TCP transport.
//!
//! Non-blocking sockets behind a `mio` poll. Each protocol message is
//! carried as `[total:u32][header][payload]`; the receive buffer is
//! consumed in whole-frame increments only. Exactly one peer
//! connection is active at a time: the server rejects a second
//! incoming connection instead of silently serving an arbitrary one.
//!
//! `send` may be called from any thread: it appends the encoded frame
//! to a pending queue and wakes the poll; the progress thread moves
//! pending frames into the peer's transmit buffer and flushes it as
//! the socket allows. Write interest stays registered only while the
//! transmit buffer is non-empty, so a slow reader grows the buffer
//! without stalling reads.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use tracing::{debug, info, warn};

use inferlink_protocol::{Frame, MsgType};

use crate::error::{Result, TransportError};
use crate::{IncomingMessage, MessageHandler, Transport, TransportOptions};

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);
const PEER: Token = Token(2);

/// Bytes read per syscall while draining a readable socket.
const READ_CHUNK: usize = 8192;

struct Conn {
    stream: TcpStream,
    addr: SocketAddr,
    /// Accumulates partial frames until a whole frame is present.
    rx: Vec<u8>,
    /// Unsent bytes, flushed from `tx_off` on writable events.
    tx: Vec<u8>,
    tx_off: usize,
    /// Client-side non-blocking connect still in flight.
    connecting: bool,
    write_interest: bool,
}

impl Conn {
    fn new(stream: TcpStream, addr: SocketAddr, connecting: bool) -> Self {
        Self {
            stream,
            addr,
            rx: Vec::new(),
            tx: Vec::new(),
            tx_off: 0,
            connecting,
            write_interest: connecting,
        }
    }
}

struct Io {
    poll: Poll,
    events: Events,
    listener: Option<TcpListener>,
    conn: Option<Conn>,
    server: bool,
}

/// Reliable-TCP transport over a readiness multiplexer.
pub struct TcpTransport {
    io: Mutex<Option<Io>>,
    pending: Mutex<VecDeque<Vec<u8>>>,
    waker: OnceLock<Waker>,
    handler: OnceLock<MessageHandler>,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self {
            io: Mutex::new(None),
            pending: Mutex::new(VecDeque::new()),
            waker: OnceLock::new(),
            handler: OnceLock::new(),
        }
    }

    /// Local address of the listening socket (server mode only).
    /// Useful when binding to port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        let guard = self.io.lock().unwrap();
        guard
            .as_ref()
            .and_then(|io| io.listener.as_ref())
            .and_then(|l| l.local_addr().ok())
    }

    fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
        let addr = format!("{host}:{port}");
        (host, port)
            .to_socket_addrs()
            .map_err(|_| TransportError::AddressResolution(addr.clone()))?
            .next()
            .ok_or(TransportError::AddressResolution(addr))
    }

    /// Move frames queued by `send` into the peer's transmit buffer
    /// and opportunistically flush. Frames queued while no peer is
    /// connected are dropped.
    fn drain_pending(&self, io: &mut Io) -> Result<()> {
        let mut pending = self.pending.lock().unwrap();
        if pending.is_empty() {
            return Ok(());
        }
        match io.conn.as_mut() {
            Some(conn) => {
                for frame in pending.drain(..) {
                    conn.tx.extend_from_slice(&frame);
                }
            }
            None => {
                let dropped = pending.len();
                pending.clear();
                warn!(frames = dropped, "dropping outbound frames: no connected peer");
                return Ok(());
            }
        }
        drop(pending);
        self.flush(io)
    }

    fn accept_pending(&self, io: &mut Io) -> Result<()> {
        loop {
            let accepted = match &io.listener {
                Some(listener) => listener.accept(),
                None => return Ok(()),
            };
            match accepted {
                Ok((mut stream, addr)) => {
                    if io.conn.is_some() {
                        warn!(peer = %addr, "rejecting connection: a peer is already active");
                        drop(stream);
                        continue;
                    }
                    io.poll
                        .registry()
                        .register(&mut stream, PEER, Interest::READABLE)?;
                    info!(peer = %addr, "peer connected");
                    io.conn = Some(Conn::new(stream, addr, false));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransportError::Io(e)),
            }
        }
        Ok(())
    }

    /// Promote a client connection out of the CONNECTING state once
    /// the non-blocking connect has resolved.
    fn finish_connect(&self, io: &mut Io) -> Result<()> {
        let Some(conn) = io.conn.as_mut() else {
            return Ok(());
        };
        if !conn.connecting {
            return Ok(());
        }
        if let Some(err) = conn.stream.take_error()? {
            return Err(TransportError::Connect {
                addr: conn.addr.to_string(),
                source: err,
            });
        }
        match conn.stream.peer_addr() {
            Ok(_) => {
                debug!(peer = %conn.addr, "connection established");
                conn.connecting = false;
            }
            Err(e) if e.kind() == io::ErrorKind::NotConnected => {}
            Err(e) => {
                return Err(TransportError::Connect {
                    addr: conn.addr.to_string(),
                    source: e,
                })
            }
        }
        Ok(())
    }

    fn handle_read(&self, io: &mut Io, out: &mut Vec<IncomingMessage>) -> Result<()> {
        let Some(conn) = io.conn.as_mut() else {
            return Ok(());
        };

        let mut closed = false;
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match conn.stream.read(&mut buf) {
                Ok(0) => {
                    closed = true;
                    break;
                }
                Ok(n) => conn.rx.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransportError::Io(e)),
            }
        }

        // A malformed frame aborts the progress loop: byte-stream
        // corruption leaves no reliable resynchronization point.
        while let Some(frame) = Frame::extract(&mut conn.rx)? {
            out.push(IncomingMessage {
                req_id: frame.header.req_id,
                msg_type: frame.header.msg_type,
                payload: frame.payload,
            });
        }

        if closed {
            if let Some(mut conn) = io.conn.take() {
                info!(peer = %conn.addr, "peer closed connection");
                let _ = io.poll.registry().deregister(&mut conn.stream);
            }
        }
        Ok(())
    }

    /// Flush the transmit buffer and keep write interest registered
    /// only while unsent bytes remain.
    fn flush(&self, io: &mut Io) -> Result<()> {
        let Some(conn) = io.conn.as_mut() else {
            return Ok(());
        };
        if conn.connecting {
            return Ok(());
        }

        while conn.tx_off < conn.tx.len() {
            match conn.stream.write(&conn.tx[conn.tx_off..]) {
                Ok(n) => conn.tx_off += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransportError::Io(e)),
            }
        }
        if conn.tx_off == conn.tx.len() {
            conn.tx.clear();
            conn.tx_off = 0;
        }

        let want_write = conn.tx_off < conn.tx.len();
        if want_write != conn.write_interest {
            let interest = if want_write {
                Interest::READABLE | Interest::WRITABLE
            } else {
                Interest::READABLE
            };
            io.poll
                .registry()
                .reregister(&mut conn.stream, PEER, interest)?;
            conn.write_interest = want_write;
        }
        Ok(())
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for TcpTransport {
    fn start_server(&self, opt: &TransportOptions, on_msg: MessageHandler) -> Result<()> {
        let mut guard = self.io.lock().unwrap();
        if guard.is_some() {
            return Err(TransportError::AlreadyStarted);
        }

        let addr = Self::resolve(&opt.listen_host, opt.listen_port)?;
        let mut listener = TcpListener::bind(addr).map_err(|e| TransportError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;
        let waker = Waker::new(poll.registry(), WAKER)?;
        let _ = self.waker.set(waker);
        let _ = self.handler.set(on_msg);

        info!(%addr, "tcp transport listening");
        *guard = Some(Io {
            poll,
            events: Events::with_capacity(opt.max_events),
            listener: Some(listener),
            conn: None,
            server: true,
        });
        Ok(())
    }

    fn start_client(&self, opt: &TransportOptions, on_msg: MessageHandler) -> Result<()> {
        let mut guard = self.io.lock().unwrap();
        if guard.is_some() {
            return Err(TransportError::AlreadyStarted);
        }

        let addr = Self::resolve(&opt.server_host, opt.server_port)?;
        let mut stream = TcpStream::connect(addr).map_err(|e| TransportError::Connect {
            addr: addr.to_string(),
            source: e,
        })?;

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut stream, PEER, Interest::READABLE | Interest::WRITABLE)?;
        let waker = Waker::new(poll.registry(), WAKER)?;
        let _ = self.waker.set(waker);
        let _ = self.handler.set(on_msg);

        debug!(server = %addr, "tcp transport connecting");
        *guard = Some(Io {
            poll,
            events: Events::with_capacity(opt.max_events),
            listener: None,
            conn: Some(Conn::new(stream, addr, true)),
            server: false,
        });
        Ok(())
    }

    fn send(&self, req_id: u64, msg_type: MsgType, payload: &[u8]) -> Result<()> {
        let waker = self.waker.get().ok_or(TransportError::NotStarted)?;
        let frame = Frame::new(msg_type, req_id, payload.to_vec());
        self.pending.lock().unwrap().push_back(frame.encode_stream());
        waker.wake()?;
        Ok(())
    }

    fn progress(&self, timeout: Duration) -> Result<()> {
        let mut dispatched = Vec::new();
        {
            let mut guard = self.io.lock().unwrap();
            let io = guard.as_mut().ok_or(TransportError::NotStarted)?;

            self.drain_pending(io)?;

            match io.poll.poll(&mut io.events, Some(timeout)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
                Err(e) => return Err(TransportError::Io(e)),
            }

            let ready: Vec<(Token, bool, bool)> = io
                .events
                .iter()
                .map(|e| (e.token(), e.is_readable(), e.is_writable()))
                .collect();

            for (token, readable, writable) in ready {
                match token {
                    LISTENER if io.server => self.accept_pending(io)?,
                    WAKER => {}
                    PEER => {
                        self.finish_connect(io)?;
                        if readable {
                            self.handle_read(io, &mut dispatched)?;
                        }
                        if writable {
                            self.flush(io)?;
                        }
                    }
                    _ => {}
                }
            }

            // Pick up frames queued while we were polling (the waker
            // interrupts the wait). Frames queued during dispatch
            // below land on the next tick.
            self.drain_pending(io)?;
        }

        if !dispatched.is_empty() {
            if let Some(handler) = self.handler.get() {
                for msg in dispatched {
                    handler(msg);
                }
            }
        }
        Ok(())
    }
}
