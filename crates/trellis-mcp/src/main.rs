//! Trellis MCP server binary.
//!
//! This binary runs the MCP server using stdio transport. Logs go to stderr.

use trellis_mcp::TrellisMcpServer;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "trellis=info,trellis_jsonl=info,trellis_mcp=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("Starting trellis-mcp server");

    let server = TrellisMcpServer::new();
    if let Ok(cwd) = std::env::current_dir() {
        server.discover_workspace(&cwd).await;
    }
    server.run().await?;

    Ok(())
}
