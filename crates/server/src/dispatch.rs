//! Dispatch loop: transport handler → work queue → worker → backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use inferlink_backend::{Backend, InferRequest};
use inferlink_protocol::{DonePayload, InferRequestPayload, MsgType, Payload};
use inferlink_transport::{
    parse_host_port, IncomingMessage, MessageHandler, Transport, TransportOptions,
};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::queue::{WorkItem, WorkQueue};

/// Progress tick granularity of the main loop.
const PROGRESS_TICK: Duration = Duration::from_millis(50);

/// Byte budget for one request's streamed output.
///
/// A chunk that would push the running total past the limit is dropped
/// whole — never split, never buffered. Later, smaller chunks may
/// still fit.
#[derive(Debug)]
pub struct CreditBudget {
    limit: u64,
    sent: u64,
}

impl CreditBudget {
    pub fn new(limit: u32) -> Self {
        Self {
            limit: u64::from(limit),
            sent: 0,
        }
    }

    /// Admit a chunk of `len` bytes, charging it against the budget.
    pub fn admit(&mut self, len: usize) -> bool {
        let len = len as u64;
        if self.sent + len > self.limit {
            return false;
        }
        self.sent += len;
        true
    }

    pub fn spent(&self) -> u64 {
        self.sent
    }
}

/// Requests the progress loop to exit at the next tick.
#[derive(Clone)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// The server application: one transport, one backend, one worker.
pub struct Server {
    config: ServerConfig,
    transport: Arc<dyn Transport>,
    backend: Option<Box<dyn Backend>>,
    stop: Arc<AtomicBool>,
}

impl Server {
    pub fn new(
        config: ServerConfig,
        transport: Arc<dyn Transport>,
        backend: Box<dyn Backend>,
    ) -> Self {
        Self {
            config,
            transport,
            backend: Some(backend),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.stop))
    }

    /// Run until shutdown is requested or the transport fails.
    ///
    /// Blocks the calling thread driving `progress`; the worker thread
    /// is joined before returning.
    pub fn run(mut self) -> Result<()> {
        let mut backend = self
            .backend
            .take()
            .ok_or_else(|| ServerError::Internal("server already ran".to_string()))?;
        backend.init()?;
        backend.load_model(
            self.config.model.as_deref(),
            self.config.context_size,
            self.config.threads,
        )?;

        let (listen_host, listen_port) = parse_host_port(&self.config.listen)?;
        let opt = TransportOptions {
            listen_host,
            listen_port,
            ..Default::default()
        };

        let queue = Arc::new(WorkQueue::new());
        let handler: MessageHandler = {
            let queue = Arc::clone(&queue);
            let max_tokens_default = self.config.max_tokens_default;
            Arc::new(move |msg| on_message(&queue, max_tokens_default, msg))
        };
        self.transport.start_server(&opt, handler)?;

        info!(
            transport = %self.config.transport,
            backend = %self.config.backend,
            listen = %self.config.listen,
            "server started"
        );

        let worker = {
            let queue = Arc::clone(&queue);
            let transport = Arc::clone(&self.transport);
            let credit_default = self.config.credit_bytes_default;
            thread::Builder::new()
                .name("inferlink-worker".to_string())
                .spawn(move || worker_loop(&queue, transport.as_ref(), backend.as_mut(), credit_default))?
        };

        while !self.stop.load(Ordering::Relaxed) {
            if let Err(e) = self.transport.progress(PROGRESS_TICK) {
                error!(error = %e, "transport error, shutting down");
                break;
            }
        }

        queue.shutdown();
        worker
            .join()
            .map_err(|_| ServerError::Internal("worker thread panicked".to_string()))?;
        Ok(())
    }
}

/// Transport handler: decode a request and hand it to the queue.
/// Runs inline on the progress thread.
fn on_message(queue: &WorkQueue, max_tokens_default: u32, msg: IncomingMessage) {
    if msg.msg_type != MsgType::RequestInfer {
        debug!(req_id = msg.req_id, msg_type = ?msg.msg_type, "ignoring non-request message");
        return;
    }

    let payload = match InferRequestPayload::decode(&msg.payload) {
        Ok(p) => p,
        Err(e) => {
            warn!(req_id = msg.req_id, error = %e, "ignoring malformed infer request");
            return;
        }
    };

    let req = InferRequest {
        req_id: msg.req_id,
        max_tokens: if payload.max_tokens != 0 {
            payload.max_tokens
        } else {
            max_tokens_default
        },
        credit_bytes: payload.credit_bytes,
        prompt: payload.prompt,
    };

    debug!(
        req_id = req.req_id,
        max_tokens = req.max_tokens,
        prompt_len = req.prompt.len(),
        "request enqueued"
    );
    if !queue.push(WorkItem { req }) {
        warn!(req_id = msg.req_id, "queue stopped, dropping request");
    }
}

/// Worker: drain the queue sequentially, one inference at a time.
fn worker_loop(
    queue: &WorkQueue,
    transport: &dyn Transport,
    backend: &mut dyn Backend,
    credit_default: u32,
) {
    while let Some(item) = queue.pop() {
        let req = item.req;
        let req_id = req.req_id;
        let limit = if req.credit_bytes != 0 {
            req.credit_bytes
        } else {
            credit_default
        };
        let mut budget = CreditBudget::new(limit);

        info!(req_id, max_tokens = req.max_tokens, "running inference");

        let result = backend.infer_stream(&req, &mut |chunk: &str| {
            if !budget.admit(chunk.len()) {
                debug!(req_id, chunk_len = chunk.len(), "credit exhausted, dropping chunk");
                return;
            }
            if let Err(e) = transport.send(req_id, MsgType::ResponseChunk, chunk.as_bytes()) {
                debug!(req_id, error = %e, "failed to send chunk");
            }
        });

        match result {
            Ok(res) => {
                let done = DonePayload::new(res.tokens, res.elapsed_us);
                if let Err(e) = transport.send(req_id, MsgType::ResponseDone, &done.encode()) {
                    warn!(req_id, error = %e, "failed to send done");
                }
                info!(
                    req_id,
                    tokens = res.tokens,
                    elapsed_us = res.elapsed_us,
                    sent_bytes = budget.spent(),
                    "inference complete"
                );
            }
            Err(e) => {
                let message = e.to_string();
                warn!(req_id, error = %message, "inference failed");
                if let Err(e) = transport.send(req_id, MsgType::ResponseError, message.as_bytes()) {
                    warn!(req_id, error = %e, "failed to send error");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credit_admits_up_to_limit() {
        let mut budget = CreditBudget::new(10);
        assert!(budget.admit(4));
        assert!(budget.admit(4));
        // Would exceed: dropped whole.
        assert!(!budget.admit(4));
        // A smaller chunk still fits afterwards.
        assert!(budget.admit(2));
        assert_eq!(budget.spent(), 10);
        assert!(!budget.admit(1));
    }

    #[test]
    fn test_credit_exact_fit_allowed() {
        let mut budget = CreditBudget::new(8);
        assert!(budget.admit(8));
        assert_eq!(budget.spent(), 8);
    }

    #[test]
    fn test_zero_length_chunk_always_admitted() {
        let mut budget = CreditBudget::new(0);
        assert!(budget.admit(0));
        assert!(!budget.admit(1));
    }
}
