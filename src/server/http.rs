use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::server::routes::{create_router, AppState};
use crate::service::CameraService;

pub async fn start_server(
    listen_addr: String,
    download_dir: PathBuf,
    service: CameraService,
) -> Result<()> {
    let addr: SocketAddr = listen_addr
        .parse()
        .context("Failed to parse listen address")?;

    let state = AppState {
        service,
        download_dir,
    };

    let app = create_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    tracing::info!("Starting camscout API on {}", addr);
    tracing::info!("Cameras at: /cameras/{{camera_id}}/{{operation}}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
