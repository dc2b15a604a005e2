//! Synthetic workload backend.
//!
//! Stands in for real generation so transport and dispatch behavior
//! can be exercised and benchmarked without a model: every request
//! yields exactly `max_tokens` chunks of a fixed marker token, with an
//! optional per-token delay simulating generation work.

use std::path::Path;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{BackendError, Result};
use crate::{Backend, InferRequest, InferResult};

/// The fixed marker emitted once per generated token.
pub const MARKER_TOKEN: &str = "tok ";

pub struct SyntheticBackend {
    token_delay: Option<Duration>,
    ready: bool,
}

impl SyntheticBackend {
    pub fn new() -> Self {
        Self {
            token_delay: None,
            ready: false,
        }
    }

    /// Simulate per-token generation cost.
    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = Some(delay);
        self
    }
}

impl Default for SyntheticBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for SyntheticBackend {
    fn init(&mut self) -> Result<()> {
        self.ready = true;
        Ok(())
    }

    fn load_model(&mut self, path: Option<&Path>, _context_size: u32, _threads: u32) -> Result<()> {
        // The generator carries no model state.
        if let Some(path) = path {
            debug!(?path, "synthetic backend ignoring model path");
        }
        Ok(())
    }

    fn infer_stream(
        &mut self,
        req: &InferRequest,
        on_chunk: &mut dyn FnMut(&str),
    ) -> Result<InferResult> {
        if !self.ready {
            return Err(BackendError::Setup("backend not initialized".to_string()));
        }

        let start = Instant::now();
        let mut text = String::with_capacity(MARKER_TOKEN.len() * req.max_tokens as usize);
        for _ in 0..req.max_tokens {
            if let Some(delay) = self.token_delay {
                std::thread::sleep(delay);
            }
            on_chunk(MARKER_TOKEN);
            text.push_str(MARKER_TOKEN);
        }

        Ok(InferResult {
            tokens: req.max_tokens,
            elapsed_us: start.elapsed().as_micros() as u64,
            text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(max_tokens: u32) -> InferRequest {
        InferRequest {
            req_id: 1,
            max_tokens,
            credit_bytes: 0,
            prompt: "hello".to_string(),
        }
    }

    #[test]
    fn test_emits_exactly_max_tokens_chunks() {
        let mut backend = SyntheticBackend::new();
        backend.init().unwrap();

        let mut chunks = Vec::new();
        let result = backend
            .infer_stream(&request(10), &mut |c| chunks.push(c.to_string()))
            .unwrap();

        assert_eq!(chunks.len(), 10);
        assert!(chunks.iter().all(|c| c == MARKER_TOKEN));
        assert_eq!(result.tokens, 10);
        assert_eq!(result.text, MARKER_TOKEN.repeat(10));
    }

    #[test]
    fn test_zero_tokens_yields_no_chunks() {
        let mut backend = SyntheticBackend::new();
        backend.init().unwrap();

        let mut calls = 0;
        let result = backend
            .infer_stream(&request(0), &mut |_| calls += 1)
            .unwrap();
        assert_eq!(calls, 0);
        assert_eq!(result.tokens, 0);
        assert!(result.text.is_empty());
    }

    #[test]
    fn test_requires_init() {
        let mut backend = SyntheticBackend::new();
        let err = backend.infer_stream(&request(1), &mut |_| {}).unwrap_err();
        assert!(matches!(err, BackendError::Setup(_)));
    }
}
