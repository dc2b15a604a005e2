//! Inferlink server binary.
//!
//! Bridges a binary wire protocol (TCP or tagged messaging) to an
//! inference backend (synthetic generator or an external llama-server
//! over HTTP).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use inferlink_backend::{Backend, BackendKind, LlamaHttpBackend, LlamaHttpOptions, SyntheticBackend};
use inferlink_server::{Server, ServerConfig};
use inferlink_transport::{create_transport, TransportKind};

#[derive(Parser)]
#[command(name = "inferlink-server")]
#[command(version)]
#[command(about = "Inference bridge server: wire protocol in, backend inference out")]
struct Cli {
    /// Transport implementation: tcp | tagged
    #[arg(long, env = "INFERLINK_TRANSPORT", default_value = "tcp")]
    transport: String,

    /// Backend implementation: synthetic | llama-http
    #[arg(long, env = "INFERLINK_BACKEND", default_value = "synthetic")]
    backend: String,

    /// Listen address
    #[arg(long, env = "INFERLINK_LISTEN", default_value = "0.0.0.0:9199")]
    listen: String,

    /// Model path handed to the backend (backends may ignore it)
    #[arg(long, env = "INFERLINK_MODEL")]
    model: Option<PathBuf>,

    /// Model context size
    #[arg(long, default_value_t = 2048)]
    ctx: u32,

    /// Backend thread count
    #[arg(long, default_value_t = 4)]
    threads: u32,

    /// Token limit applied when a request asks for 0 tokens
    #[arg(long, env = "INFERLINK_MAX_TOKENS_DEFAULT", default_value_t = 128)]
    max_tokens_default: u32,

    /// Credit budget (bytes) applied when a request specifies 0
    #[arg(long, env = "INFERLINK_CREDIT_DEFAULT", default_value_t = 256 * 1024)]
    credit_default: u32,

    /// Base URL of the external completion service
    #[arg(long, env = "INFERLINK_LLAMA_URL", default_value = "http://127.0.0.1:8080")]
    llama_url: String,

    /// Primary endpoint path on the completion service
    #[arg(long, env = "INFERLINK_LLAMA_ENDPOINT", default_value = "/completion")]
    llama_endpoint: String,

    /// Simulated per-token delay of the synthetic backend, in
    /// microseconds
    #[arg(long, default_value_t = 0)]
    synthetic_delay_us: u64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inferlink=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let transport_kind: TransportKind = cli.transport.parse().map_err(anyhow::Error::msg)?;
    let backend_kind: BackendKind = cli.backend.parse().map_err(anyhow::Error::msg)?;

    let config = ServerConfig {
        transport: transport_kind,
        backend: backend_kind,
        listen: cli.listen,
        model: cli.model,
        context_size: cli.ctx,
        threads: cli.threads,
        max_tokens_default: cli.max_tokens_default,
        credit_bytes_default: cli.credit_default,
        llama: LlamaHttpOptions {
            base_url: cli.llama_url,
            endpoint: cli.llama_endpoint,
            ..Default::default()
        },
    };

    tracing::info!("Starting inferlink-server v{}", env!("CARGO_PKG_VERSION"));
    if backend_kind == BackendKind::LlamaHttp {
        tracing::info!(
            url = %config.llama.base_url,
            endpoint = %config.llama.endpoint,
            "forwarding to external completion service"
        );
    }

    let backend: Box<dyn Backend> = match backend_kind {
        BackendKind::Synthetic => {
            let mut synthetic = SyntheticBackend::new();
            if cli.synthetic_delay_us > 0 {
                synthetic =
                    synthetic.with_token_delay(Duration::from_micros(cli.synthetic_delay_us));
            }
            Box::new(synthetic)
        }
        BackendKind::LlamaHttp => Box::new(LlamaHttpBackend::new(config.llama.clone())),
    };

    let transport = create_transport(transport_kind);
    Server::new(config, transport, backend)
        .run()
        .context("server terminated with an error")?;
    Ok(())
}
