//! Pong Arena Server
//!
//! Standalone entry point: runs the WebSocket match server with the
//! permissive collaborator stub. Embedders wire in their own directory.

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pong_arena::network::external::OpenDirectory;
use pong_arena::network::server::{GameServer, ServerConfig};
use pong_arena::VERSION;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut config = ServerConfig::default();
    if let Ok(addr) = std::env::var("PONG_ARENA_ADDR") {
        config.bind_addr = addr
            .parse()
            .with_context(|| format!("invalid PONG_ARENA_ADDR: {addr}"))?;
    }

    info!("Pong Arena Server v{}", VERSION);

    let server = GameServer::new(config, OpenDirectory);
    server.run().await.context("server stopped with an error")?;
    Ok(())
}
