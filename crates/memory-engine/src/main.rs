use anyhow::Result;
use std::net::SocketAddr;
use tracing::info;

use memory_engine::config::Settings;
use memory_engine::utils::logger::init_logger;
use memory_engine::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logger()?;

    info!("🚀 Starting Memory Engine...");

    // Load configuration
    let settings = Settings::load()?;
    info!("✅ Configuration loaded");

    let state = AppState::from_settings(&settings).await?;
    info!("✅ Backends connected");

    let app = build_router(state);

    // Server address
    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    info!("🎯 Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Memory Engine stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
