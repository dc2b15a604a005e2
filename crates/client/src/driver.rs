//! Request driver.
//!
//! Alternates `send` with a `progress`-polling loop until the terminal
//! response for the current iteration arrives. Responses for other
//! request ids, and anything after the terminal message, are ignored.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use inferlink_protocol::{
    ChunkPayload, DonePayload, ErrorPayload, InferRequestPayload, MsgType, Payload,
};
use inferlink_transport::{
    parse_host_port, IncomingMessage, MessageHandler, Result, Transport, TransportOptions,
};

use crate::stats::TimingStats;

/// Poll granularity while waiting for a terminal response.
const POLL_TICK: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Server address, `HOST:PORT`
    pub server: String,
    pub prompt: String,
    pub max_tokens: u32,
    /// Credit budget sent with every request
    pub credit_bytes: u32,
    /// Number of request iterations
    pub iters: u32,
    /// Print chunks to stdout as they arrive
    pub print_chunks: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            server: "127.0.0.1:9199".to_string(),
            prompt: "Hello from the inferlink client. Write one sentence.".to_string(),
            max_tokens: 64,
            credit_bytes: 256 * 1024,
            iters: 10,
            print_chunks: false,
        }
    }
}

/// Outcome of one full run.
#[derive(Debug)]
pub struct RunSummary {
    /// Per-iteration latencies of successful iterations, ms
    pub latencies_ms: Vec<f64>,
    /// Iterations that ended in a server error
    pub errors: u32,
    pub stats: TimingStats,
}

#[derive(Debug, Clone)]
enum Terminal {
    Done { tokens: u32, elapsed_us: u64 },
    Error(String),
}

struct IterationState {
    req_id: u64,
    terminal: Option<Terminal>,
    print_chunks: bool,
}

fn handle_message(state: &Mutex<IterationState>, msg: IncomingMessage) {
    let mut state = state.lock().unwrap();
    if msg.req_id != state.req_id || state.terminal.is_some() {
        return;
    }

    match msg.msg_type {
        MsgType::ResponseChunk => {
            if state.print_chunks && !msg.payload.is_empty() {
                if let Ok(chunk) = ChunkPayload::decode(&msg.payload) {
                    print!("{}", chunk.text);
                    let _ = std::io::stdout().flush();
                }
            }
        }
        MsgType::ResponseDone => match DonePayload::decode(&msg.payload) {
            Ok(done) => {
                state.terminal = Some(Terminal::Done {
                    tokens: done.tokens,
                    elapsed_us: done.elapsed_us,
                });
            }
            Err(e) => {
                warn!(error = %e, "malformed done payload");
                state.terminal = Some(Terminal::Error("malformed done payload".to_string()));
            }
        },
        MsgType::ResponseError => {
            let message = ErrorPayload::decode(&msg.payload)
                .map(|p| p.message)
                .unwrap_or_default();
            state.terminal = Some(Terminal::Error(message));
        }
        MsgType::RequestInfer => {
            debug!(req_id = msg.req_id, "ignoring unexpected request message");
        }
    }
}

/// Run `opts.iters` request iterations and aggregate latencies.
pub fn run(transport: Arc<dyn Transport>, opts: &ClientOptions) -> Result<RunSummary> {
    let (server_host, server_port) = parse_host_port(&opts.server)?;
    let topt = TransportOptions {
        server_host,
        server_port,
        ..Default::default()
    };

    let state = Arc::new(Mutex::new(IterationState {
        req_id: 0,
        terminal: None,
        print_chunks: opts.print_chunks,
    }));
    let handler: MessageHandler = {
        let state = Arc::clone(&state);
        Arc::new(move |msg| handle_message(&state, msg))
    };
    transport.start_client(&topt, handler)?;

    let payload =
        InferRequestPayload::new(opts.max_tokens, opts.credit_bytes, opts.prompt.clone()).encode();

    let mut latencies_ms = Vec::with_capacity(opts.iters as usize);
    let mut errors = 0u32;

    for iter in 0..opts.iters {
        let req_id: u64 = rand::random();
        {
            let mut state = state.lock().unwrap();
            state.req_id = req_id;
            state.terminal = None;
        }

        if opts.print_chunks {
            println!("\n--- iter {iter} ---");
        }

        let start = Instant::now();
        transport.send(req_id, MsgType::RequestInfer, &payload)?;

        let terminal = loop {
            transport.progress(POLL_TICK)?;
            let state = state.lock().unwrap();
            if let Some(terminal) = state.terminal.clone() {
                break terminal;
            }
        };

        match terminal {
            Terminal::Done { tokens, elapsed_us } => {
                let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
                debug!(req_id, tokens, elapsed_us, latency_ms, "iteration complete");
                latencies_ms.push(latency_ms);
            }
            Terminal::Error(message) => {
                errors += 1;
                eprintln!("server error: {message}");
            }
        }
        if opts.print_chunks {
            println!();
        }
    }

    Ok(RunSummary {
        stats: TimingStats::from_values(&latencies_ms),
        latencies_ms,
        errors,
    })
}
