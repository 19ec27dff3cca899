use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::anyhow;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use voicebridge::ServerConfig;
use voicebridge::routes;
use voicebridge::state::AppState;

/// Voicebridge - WebSocket to gRPC bridge for virtual-agent calls
#[derive(Parser, Debug)]
#[command(name = "voicebridge")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Bind host (overrides HOST)
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    /// Bind port (overrides PORT)
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Upstream gRPC endpoint (overrides UPSTREAM_ENDPOINT)
    #[arg(long, value_name = "URL")]
    upstream: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let mut config = ServerConfig::from_env().map_err(|e| anyhow!(e))?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(upstream) = cli.upstream {
        config.upstream_endpoint = upstream;
    }

    let address = config.address();
    let socket_addr: SocketAddr = address
        .parse()
        .map_err(|e| anyhow!("Invalid server address '{}': {}", address, e))?;

    info!(upstream = %config.upstream_endpoint, "default upstream endpoint");

    let app = routes::create_router(Arc::new(AppState::new(config)));

    let listener = TcpListener::bind(socket_addr).await?;
    info!("Listening on {}", socket_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
