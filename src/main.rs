mod config;
mod devops;
mod error;
mod model;
mod server;

use std::sync::Arc;

use anyhow::{Context, Result};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use tracing_subscriber::EnvFilter;

use server::DevOpsMcpServer;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Missing or unreadable credentials are fatal; there is nothing useful to
    // serve without them.
    let config = Arc::new(config::load_config()?);
    let mcp_server = DevOpsMcpServer::new(config)?;

    let service = StreamableHttpService::new(
        move || Ok(mcp_server.clone()),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig {
            sse_keep_alive: None,
            // Stateless, matching how clients are expected to call: one
            // request, one response, no session continuity required.
            stateful_mode: false,
        },
    );

    let router = axum::Router::new().nest_service("/mcp", service);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;
    tracing::info!(port, "MCP streamable HTTP server listening");

    axum::serve(listener, router).await.context("Server error")?;
    Ok(())
}
