// browser-relay server binary: stdio MCP transport.
//
// stdout belongs to the JSON-RPC framing; all logging goes to stderr.

use anyhow::Result;
use rmcp::ServiceExt;
use rmcp::transport::stdio;
use tracing::info;
use tracing_subscriber::EnvFilter;

use browser_relay::{Relay, RelayServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ServerConfig::from_env();
    for dir in [&config.input_dir, &config.output_dir, &config.log_dir] {
        std::fs::create_dir_all(dir)?;
    }

    let relay = Relay::new(config);
    let server = RelayServer::new(relay.clone());

    info!("browser-relay listening on stdio");
    let service = server.serve(stdio()).await?;
    service.waiting().await?;

    info!("transport closed, shutting down");
    relay.shutdown().await;
    Ok(())
}
