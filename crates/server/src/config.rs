//! Server configuration

use std::path::PathBuf;

use inferlink_backend::{BackendKind, LlamaHttpOptions};
use inferlink_transport::TransportKind;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Transport implementation
    pub transport: TransportKind,

    /// Backend implementation
    pub backend: BackendKind,

    /// Listen address, `HOST:PORT`
    pub listen: String,

    /// Model path handed to the backend (backends may ignore it)
    pub model: Option<PathBuf>,

    /// Model context size handed to the backend
    pub context_size: u32,

    /// Backend thread count
    pub threads: u32,

    /// Token limit applied when a request asks for 0 tokens
    pub max_tokens_default: u32,

    /// Credit budget applied when a request specifies 0 bytes
    pub credit_bytes_default: u32,

    /// HTTP bridge backend options
    pub llama: LlamaHttpOptions,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Tcp,
            backend: BackendKind::Synthetic,
            listen: "0.0.0.0:9199".to_string(),
            model: None,
            context_size: 2048,
            threads: 4,
            max_tokens_default: 128,
            credit_bytes_default: 256 * 1024,
            llama: LlamaHttpOptions::default(),
        }
    }
}
