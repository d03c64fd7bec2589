//! Runs a Covey server with the local development video provider.

use clap::Parser;
use covey::prelude::*;
use tracing_subscriber::EnvFilter;

/// Multiplayer virtual-town server.
#[derive(Debug, Parser)]
#[command(name = "covey-server", version, about)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8081")]
    bind: String,

    /// Log filter, used when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> Result<(), CoveyError> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let server = CoveyServer::builder()
        .bind(&args.bind)
        .build(LocalVideoProvider)
        .await?;
    if let Ok(addr) = server.local_addr() {
        tracing::info!(%addr, "listening");
    }

    server.run().await
}
