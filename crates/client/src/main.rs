//! Inferlink client binary.

use clap::Parser;
use console::style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use inferlink_client::{run, ClientOptions};
use inferlink_transport::{create_transport, TransportKind};

#[derive(Parser)]
#[command(name = "inferlink-client")]
#[command(version)]
#[command(about = "Issue inference requests and report latency percentiles")]
struct Cli {
    /// Transport implementation: tcp | tagged
    #[arg(long, env = "INFERLINK_TRANSPORT", default_value = "tcp")]
    transport: String,

    /// Server address
    #[arg(short, long, env = "INFERLINK_SERVER", default_value = "127.0.0.1:9199")]
    server: String,

    /// Prompt text
    #[arg(
        short,
        long,
        default_value = "Hello from the inferlink client. Write one sentence."
    )]
    prompt: String,

    /// Maximum tokens to generate
    #[arg(short = 'k', long, default_value_t = 64)]
    max_tokens: u32,

    /// Number of request iterations
    #[arg(short, long, default_value_t = 10)]
    iters: u32,

    /// Credit budget in bytes sent with every request
    #[arg(long, default_value_t = 256 * 1024)]
    credit: u32,

    /// Print response chunks as they arrive
    #[arg(long, default_value_t = false)]
    print: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inferlink=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let kind: TransportKind = cli.transport.parse().map_err(anyhow::Error::msg)?;

    let opts = ClientOptions {
        server: cli.server,
        prompt: cli.prompt,
        max_tokens: cli.max_tokens,
        credit_bytes: cli.credit,
        iters: cli.iters,
        print_chunks: cli.print,
    };

    let transport = create_transport(kind);
    let summary = run(transport, &opts)?;

    let stats = &summary.stats;
    println!(
        "iters={} mean_ms={:.3} p50_ms={:.3} p95_ms={:.3} p99_ms={:.3}",
        summary.latencies_ms.len(),
        stats.mean_ms,
        stats.p50_ms,
        stats.p95_ms,
        stats.p99_ms
    );

    if summary.errors > 0 {
        eprintln!(
            "{}",
            style(format!("{} iteration(s) failed", summary.errors)).red()
        );
        std::process::exit(2);
    }
    Ok(())
}
