//! Inferlink inference backends.
//!
//! A backend turns one [`InferRequest`] into a streamed sequence of
//! text chunks plus a final [`InferResult`]. Two implementations share
//! the [`Backend`] contract: [`SyntheticBackend`] generates a
//! deterministic workload, [`LlamaHttpBackend`] forwards to an
//! external llama-server-compatible completion service.

mod error;
mod llama_http;
mod synthetic;

pub use error::{BackendError, Result};
pub use llama_http::{LlamaHttpBackend, LlamaHttpOptions};
pub use synthetic::SyntheticBackend;

use std::path::Path;
use std::str::FromStr;

/// One inference request, owned by the work queue until the worker
/// consumes it.
#[derive(Debug, Clone)]
pub struct InferRequest {
    /// Correlation id chosen by the client
    pub req_id: u64,
    /// Tokens to generate
    pub max_tokens: u32,
    /// Byte budget capping streamed response traffic
    pub credit_bytes: u32,
    /// Prompt text
    pub prompt: String,
}

/// Final accounting for one inference call.
#[derive(Debug, Clone, Default)]
pub struct InferResult {
    /// Tokens produced (0 when the service reports no count)
    pub tokens: u32,
    /// Wall time of the call in microseconds
    pub elapsed_us: u64,
    /// Full concatenated output text
    pub text: String,
}

/// Inference backend contract.
///
/// `infer_stream` invokes `on_chunk` zero or more times with generated
/// text fragments in generation order, then returns the final result;
/// failures are reported as a [`BackendError`] carrying the
/// description forwarded to the client.
pub trait Backend: Send {
    /// Prepare the backend; fails when a required runtime or service
    /// configuration is unavailable.
    fn init(&mut self) -> Result<()>;

    /// Load or prepare model state. A no-op is permitted (e.g. when an
    /// external service already owns the model).
    fn load_model(&mut self, path: Option<&Path>, context_size: u32, threads: u32) -> Result<()>;

    /// Run one inference, streaming chunks through `on_chunk`.
    fn infer_stream(
        &mut self,
        req: &InferRequest,
        on_chunk: &mut dyn FnMut(&str),
    ) -> Result<InferResult>;
}

/// Backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Synthetic,
    LlamaHttp,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "synthetic" => Ok(BackendKind::Synthetic),
            "llama-http" | "llama_http" => Ok(BackendKind::LlamaHttp),
            other => Err(format!(
                "unknown backend '{other}' (expected 'synthetic' or 'llama-http')"
            )),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Synthetic => write!(f, "synthetic"),
            BackendKind::LlamaHttp => write!(f, "llama-http"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!(
            "synthetic".parse::<BackendKind>().unwrap(),
            BackendKind::Synthetic
        );
        assert_eq!(
            "llama-http".parse::<BackendKind>().unwrap(),
            BackendKind::LlamaHttp
        );
        assert!("toy".parse::<BackendKind>().is_err());
    }
}
