//! Server entrypoint: env layering, tracing, then serve.

use clap::Parser;

#[derive(Parser)]
#[command(name = "tern-serve", about = "Tern RAG engine HTTP server")]
struct Args {
    /// Bind address.
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:8090")]
    addr: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    if let Err(e) = config::load_and_apply(None) {
        eprintln!("config load failed: {}", e);
    }
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    serve::run_serve(Some(&args.addr)).await
}
