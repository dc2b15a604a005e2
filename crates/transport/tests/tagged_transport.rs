//! Loopback tests for the tagged-message transport.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use inferlink_protocol::{Frame, MsgType};
use inferlink_transport::{
    IncomingMessage, MessageHandler, TaggedTransport, Transport, TransportOptions,
};

// Wire tag classes, as transmitted in the first message part.
const TAG_REQUEST: u64 = 0x494C_0001;
const TAG_RESPONSE: u64 = 0x494C_0002;

type Collected = Arc<Mutex<Vec<IncomingMessage>>>;

fn collector() -> (Collected, MessageHandler) {
    let collected: Collected = Arc::new(Mutex::new(Vec::new()));
    let handler: MessageHandler = {
        let collected = Arc::clone(&collected);
        Arc::new(move |msg| collected.lock().unwrap().push(msg))
    };
    (collected, handler)
}

fn start_server() -> (TaggedTransport, Collected, u16) {
    let server = TaggedTransport::new();
    let (rx, handler) = collector();
    let opt = TransportOptions {
        listen_host: "127.0.0.1".to_string(),
        listen_port: 0,
        ..Default::default()
    };
    server.start_server(&opt, handler).unwrap();

    let endpoint = server.local_endpoint().expect("bound endpoint");
    let port: u16 = endpoint
        .rsplit(':')
        .next()
        .and_then(|p| p.parse().ok())
        .expect("port in endpoint");
    (server, rx, port)
}

fn pump(transports: &[&dyn Transport], done: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done() {
        assert!(Instant::now() < deadline, "timed out pumping transports");
        for t in transports {
            t.progress(Duration::from_millis(10)).unwrap();
        }
    }
}

#[test]
fn tagged_round_trip() {
    let (server, server_rx, port) = start_server();

    let client = TaggedTransport::new();
    let (client_rx, client_handler) = collector();
    let opt = TransportOptions {
        server_host: "127.0.0.1".to_string(),
        server_port: port,
        ..Default::default()
    };
    client.start_client(&opt, client_handler).unwrap();

    let big: Vec<u8> = (0..=255u8).cycle().take(512 * 1024).collect();
    client.send(21, MsgType::RequestInfer, b"prompt bytes").unwrap();
    client.send(22, MsgType::RequestInfer, &big).unwrap();
    pump(&[&server, &client], || server_rx.lock().unwrap().len() == 2);

    {
        let got = server_rx.lock().unwrap();
        assert_eq!(got[0].req_id, 21);
        assert_eq!(got[0].msg_type, MsgType::RequestInfer);
        assert_eq!(got[0].payload, b"prompt bytes");
        assert_eq!(got[1].req_id, 22);
        assert_eq!(got[1].payload, big);
    }

    server.send(21, MsgType::ResponseChunk, b"tok ").unwrap();
    server.send(21, MsgType::ResponseDone, &[0u8; 16]).unwrap();
    pump(&[&server, &client], || client_rx.lock().unwrap().len() == 2);

    let got = client_rx.lock().unwrap();
    assert_eq!(got[0].msg_type, MsgType::ResponseChunk);
    assert_eq!(got[0].payload, b"tok ");
    assert_eq!(got[1].msg_type, MsgType::ResponseDone);
}

#[test]
fn malformed_and_foreign_messages_are_skipped() {
    let (server, rx, port) = start_server();

    // A raw peer speaking the delimited format directly.
    let ctx = zmq::Context::new();
    let raw = ctx.socket(zmq::PAIR).unwrap();
    raw.connect(&format!("tcp://127.0.0.1:{port}")).unwrap();

    let valid = Frame::new(MsgType::RequestInfer, 5, b"ok".to_vec()).encode_datagram();

    // Tag without a body part.
    raw.send(&TAG_REQUEST.to_le_bytes()[..], 0).unwrap();
    // Body shorter than a header.
    raw.send(&TAG_REQUEST.to_le_bytes()[..], zmq::SNDMORE).unwrap();
    raw.send(&[0x01u8, 0x02][..], 0).unwrap();
    // Garbage magic.
    raw.send(&TAG_REQUEST.to_le_bytes()[..], zmq::SNDMORE).unwrap();
    raw.send(&[0xFFu8; 32][..], 0).unwrap();
    // Valid frame under the wrong tag class for this direction.
    raw.send(&TAG_RESPONSE.to_le_bytes()[..], zmq::SNDMORE).unwrap();
    raw.send(&valid[..], 0).unwrap();
    // Finally a well-formed request.
    raw.send(&TAG_REQUEST.to_le_bytes()[..], zmq::SNDMORE).unwrap();
    raw.send(&valid[..], 0).unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while rx.lock().unwrap().is_empty() {
        assert!(Instant::now() < deadline, "valid message never dispatched");
        server.progress(Duration::from_millis(10)).unwrap();
    }
    // A few extra ticks: nothing else may surface.
    for _ in 0..10 {
        server.progress(Duration::from_millis(5)).unwrap();
    }

    let got = rx.lock().unwrap();
    assert_eq!(got.len(), 1, "only the valid message is dispatched");
    assert_eq!(got[0].req_id, 5);
    assert_eq!(got[0].payload, b"ok");
}

#[test]
fn tagged_idle_progress_is_a_noop() {
    let (server, rx, _port) = start_server();
    for _ in 0..5 {
        server.progress(Duration::ZERO).unwrap();
    }
    assert!(rx.lock().unwrap().is_empty());
}
